use crate::application_port::{AuthGateway, AuthGatewayError};
use crate::domain_model::{AccessToken, RefreshToken, TokenPair, UserId, UserProfile};
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

const FAKE_SIGNING_KEY: &[u8] = b"cadence-fake-gateway-dev-key";

#[derive(Debug, Serialize)]
struct FakeClaims {
    sub: String,
    exp: i64,
    iat: i64,
    jti: String,
}

/// Stand-in for the real token exchange. Mints structurally valid HS256
/// tokens with controllable lifetimes, an injectable response delay, and
/// an injectable failure, and counts every call so tests can assert the
/// single-flight guarantee.
pub struct FakeAuthGateway {
    username: String,
    access_ttl: chrono::Duration,
    refresh_ttl: chrono::Duration,
    response_delay: Mutex<Duration>,
    failure: Mutex<Option<AuthGatewayError>>,
    refresh_calls: AtomicU32,
    logout_calls: AtomicU32,
}

impl FakeAuthGateway {
    pub fn new() -> Self {
        Self {
            username: "demo-user".to_string(),
            access_ttl: chrono::Duration::days(30),
            refresh_ttl: chrono::Duration::days(90),
            response_delay: Mutex::new(Duration::ZERO),
            failure: Mutex::new(None),
            refresh_calls: AtomicU32::new(0),
            logout_calls: AtomicU32::new(0),
        }
    }

    pub fn with_access_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.access_ttl = ttl;
        self
    }

    pub fn with_response_delay(self, delay: Duration) -> Self {
        *lock(&self.response_delay) = delay;
        self
    }

    /// Make every subsequent exchange fail with `err` until `succeed`.
    pub fn fail_with(&self, err: AuthGatewayError) {
        *lock(&self.failure) = Some(err);
    }

    pub fn succeed(&self) {
        *lock(&self.failure) = None;
    }

    pub fn refresh_calls(&self) -> u32 {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn logout_calls(&self) -> u32 {
        self.logout_calls.load(Ordering::SeqCst)
    }

    pub fn user_id(&self) -> UserId {
        UserId(uuid::Uuid::new_v5(
            &uuid::Uuid::NAMESPACE_OID,
            self.username.as_bytes(),
        ))
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.user_id(),
            username: self.username.clone(),
            display_name: None,
        }
    }

    /// Issue a pair the way a login exchange would; also used by demos to
    /// seed an empty store.
    pub fn issue_pair(&self) -> Result<TokenPair, AuthGatewayError> {
        let now = Utc::now();
        let jti = uuid::Uuid::new_v4().to_string();

        let access = self.encode_token(now + self.access_ttl, &jti)?;
        let refresh = self.encode_token(now + self.refresh_ttl, &jti)?;

        Ok(TokenPair {
            access_token: AccessToken(access),
            refresh_token: RefreshToken(refresh),
        })
    }

    fn encode_token(
        &self,
        exp: chrono::DateTime<Utc>,
        jti: &str,
    ) -> Result<String, AuthGatewayError> {
        let claims = FakeClaims {
            sub: self.user_id().to_string(),
            exp: exp.timestamp(),
            iat: Utc::now().timestamp(),
            jti: jti.to_string(),
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(FAKE_SIGNING_KEY),
        )
        .map_err(|e| AuthGatewayError::Transport(e.to_string()))
    }

    async fn simulate_roundtrip(&self) -> Result<(), AuthGatewayError> {
        let delay = *lock(&self.response_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match lock(&self.failure).clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Default for FakeAuthGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl AuthGateway for FakeAuthGateway {
    async fn refresh(&self, refresh_token: &RefreshToken) -> Result<TokenPair, AuthGatewayError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_roundtrip().await?;
        if refresh_token.0.is_empty() {
            return Err(AuthGatewayError::Rejected);
        }
        self.issue_pair()
    }

    async fn logout(&self) -> Result<(), AuthGatewayError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_roundtrip().await
    }
}
