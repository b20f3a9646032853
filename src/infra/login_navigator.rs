use crate::domain_port::Navigator;
use tracing::warn;

/// Navigator for shells that delegate navigation to the host UI layer:
/// the redirect intent is surfaced in the log. Embeddings with a real
/// router supply their own `Navigator`.
pub struct LoginRouteNavigator {
    login_route: String,
}

impl LoginRouteNavigator {
    pub fn new(login_route: impl Into<String>) -> Self {
        Self {
            login_route: login_route.into(),
        }
    }
}

#[async_trait::async_trait]
impl Navigator for LoginRouteNavigator {
    async fn redirect_to_login(&self) {
        warn!(route = %self.login_route, "session ended, navigating to login route");
    }
}
