use crate::domain_model::{RefreshToken, TokenPair};

#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthGatewayError {
    /// The server definitively rejected the refresh token (revoked,
    /// expired, or unknown).
    #[error("refresh token rejected")]
    Rejected,
    /// Network-level failure reaching the endpoint. Indistinguishable from
    /// a permanent failure at this layer; treated just as fatally.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Thin pass-through to the authentication server's token exchange. The
/// tokens are opaque here; issuance and validation live server-side.
#[async_trait::async_trait]
pub trait AuthGateway: Send + Sync {
    async fn refresh(&self, refresh_token: &RefreshToken) -> Result<TokenPair, AuthGatewayError>;
    /// Invalidate the session server-side. Callers ignore failures.
    async fn logout(&self) -> Result<(), AuthGatewayError>;
}
