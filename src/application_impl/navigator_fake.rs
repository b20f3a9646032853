use crate::domain_port::Navigator;
use std::sync::atomic::{AtomicU32, Ordering};

/// Records login-route redirects instead of navigating anywhere.
#[derive(Debug, Default)]
pub struct FakeNavigator {
    redirects: AtomicU32,
}

impl FakeNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn redirect_count(&self) -> u32 {
        self.redirects.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Navigator for FakeNavigator {
    async fn redirect_to_login(&self) {
        self.redirects.fetch_add(1, Ordering::SeqCst);
    }
}
