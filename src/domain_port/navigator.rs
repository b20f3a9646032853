/// Host-environment hook invoked on fatal teardown: send the user back to
/// the login entry route. There is no degraded or read-only fallback.
#[async_trait::async_trait]
pub trait Navigator: Send + Sync {
    async fn redirect_to_login(&self);
}
