use crate::domain_model::{AccessToken, TokenPair, UserProfile};
use crate::domain_port::StoreError;
use chrono::{DateTime, Utc};

/// Session lifecycle failures. Clone because a single refresh outcome is
/// fanned out to every queued waiter.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    #[error("malformed access token: {0}")]
    Decode(String),
    #[error("refresh rejected by server")]
    RefreshRejected,
    #[error("transport failure during refresh: {0}")]
    Transport(String),
    #[error("no refresh token available")]
    MissingRefreshToken,
    #[error("store error: {0}")]
    Store(String),
    #[error("session cleared while refresh was pending")]
    SessionCleared,
}

impl From<StoreError> for SessionError {
    fn from(err: StoreError) -> Self {
        SessionError::Store(err.to_string())
    }
}

/// The session lifecycle facade. One constructible instance per process;
/// all singleton state (init guard, armed timer, in-flight refresh) lives
/// on the instance so tests can build fresh ones.
#[async_trait::async_trait]
pub trait SessionService: Send + Sync {
    /// Wire scheduling and cross-context sync if a full token pair is
    /// stored. Guarded to run once; a no-op until `clear_session` resets
    /// the guard. Missing tokens leave the guard unset.
    async fn init(&self);

    /// Entry point for "tokens just became available": `init` if not yet
    /// initialized, otherwise re-arm scheduling for the fresh token.
    async fn setup_session(&self);

    /// Persist a freshly issued pair and profile (the login exchange
    /// itself is an external collaborator's job), then wire scheduling.
    async fn install_session(&self, pair: &TokenPair, user: &UserProfile)
    -> Result<(), SessionError>;

    /// Exchange the refresh token for a new pair. Concurrent calls share a
    /// single network exchange and observe the identical outcome. Any
    /// failure tears the session down.
    async fn refresh(&self) -> Result<AccessToken, SessionError>;

    /// Never errors: `false` for a missing, malformed, or expired token.
    async fn is_authenticated(&self) -> bool;

    /// Decoded expiry of the current access token, if one validly exists.
    async fn token_expiration(&self) -> Option<DateTime<Utc>>;

    /// The stored profile record, if present and well-formed.
    async fn current_user(&self) -> Option<UserProfile>;

    /// Best-effort server-side logout (failure ignored), then an
    /// unconditional `clear_session`.
    async fn logout(&self);

    /// Clear the store, cancel any armed refresh, drop pending waiters,
    /// stop cross-context sync, and reset the init guard.
    async fn clear_session(&self);
}
