use crate::application_impl::{RefreshCoordinator, RefreshOutcome, RefreshPlan, RefreshRole, RefreshTimer, SchedulePolicy};
use crate::application_port::{AuthGateway, AuthGatewayError, SessionError, SessionService};
use crate::domain_model::{AccessToken, RefreshToken, TokenPair, UserProfile, decode_claims};
use crate::domain_port::{Navigator, SessionChangeNotifier, StoreKey, TokenStore};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// The session lifecycle facade. Holds all process-wide singleton state
/// (init guard, armed timer, in-flight refresh) as instance fields;
/// cloning shares the same engine.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    store: Arc<dyn TokenStore>,
    gateway: Arc<dyn AuthGateway>,
    notifier: Arc<dyn SessionChangeNotifier>,
    navigator: Arc<dyn Navigator>,
    policy: SchedulePolicy,
    timer: RefreshTimer,
    coordinator: RefreshCoordinator,
    initialized: AtomicBool,
    sync_cancel: Mutex<Option<CancellationToken>>,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn TokenStore>,
        gateway: Arc<dyn AuthGateway>,
        notifier: Arc<dyn SessionChangeNotifier>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self::with_policy(store, gateway, notifier, navigator, SchedulePolicy::default())
    }

    pub fn with_policy(
        store: Arc<dyn TokenStore>,
        gateway: Arc<dyn AuthGateway>,
        notifier: Arc<dyn SessionChangeNotifier>,
        navigator: Arc<dyn Navigator>,
        policy: SchedulePolicy,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                store,
                gateway,
                notifier,
                navigator,
                policy,
                timer: RefreshTimer::new(),
                coordinator: RefreshCoordinator::new(),
                initialized: AtomicBool::new(false),
                sync_cancel: Mutex::new(None),
            }),
        }
    }

    /// Delay the currently armed refresh task was given, if one is armed.
    pub fn armed_refresh_delay(&self) -> Option<Duration> {
        self.inner.timer.armed_delay()
    }

    pub fn is_refresh_in_flight(&self) -> bool {
        self.inner.coordinator.is_in_flight()
    }
}

#[async_trait::async_trait]
impl SessionService for SessionManager {
    async fn init(&self) {
        init(&self.inner).await;
    }

    async fn setup_session(&self) {
        if self.inner.initialized.load(Ordering::SeqCst) {
            arm_from_store(&self.inner).await;
        } else {
            init(&self.inner).await;
        }
    }

    async fn install_session(
        &self,
        pair: &TokenPair,
        user: &UserProfile,
    ) -> Result<(), SessionError> {
        let user_json =
            serde_json::to_string(user).map_err(|e| SessionError::Store(e.to_string()))?;

        self.inner
            .store
            .set(StoreKey::AccessToken, &pair.access_token.0)
            .await?;
        self.inner
            .store
            .set(StoreKey::RefreshToken, &pair.refresh_token.0)
            .await?;
        self.inner.store.set(StoreKey::User, &user_json).await?;

        info!(user = %user.id, "session installed");
        self.setup_session().await;
        Ok(())
    }

    async fn refresh(&self) -> Result<AccessToken, SessionError> {
        run_refresh(&self.inner).await
    }

    async fn is_authenticated(&self) -> bool {
        let Some(access) = self.inner.stored_access_token().await else {
            return false;
        };
        match decode_claims(&access) {
            Ok(claims) => claims.expires_at > Utc::now(),
            Err(err) => {
                debug!(%err, "token validation failed");
                false
            }
        }
    }

    async fn token_expiration(&self) -> Option<DateTime<Utc>> {
        let access = self.inner.stored_access_token().await?;
        decode_claims(&access).ok().map(|claims| claims.expires_at)
    }

    async fn current_user(&self) -> Option<UserProfile> {
        let json = match self.inner.store.get(StoreKey::User).await {
            Ok(value) => value?,
            Err(err) => {
                error!(%err, "failed to read stored user profile");
                return None;
            }
        };
        match serde_json::from_str(&json) {
            Ok(user) => Some(user),
            Err(err) => {
                warn!(%err, "stored user profile is malformed");
                None
            }
        }
    }

    async fn logout(&self) {
        if self.inner.stored_access_token().await.is_some() {
            if let Err(err) = self.inner.gateway.logout().await {
                // Server-side logout is best effort; local teardown
                // happens regardless.
                warn!(%err, "logout request failed");
            }
        }
        self.clear_session().await;
    }

    async fn clear_session(&self) {
        let inner = &self.inner;
        if let Err(err) = inner.store.clear_all().await {
            error!(%err, "failed to clear session store");
        }
        inner.timer.cancel();
        inner.coordinator.reset(SessionError::SessionCleared);
        inner.stop_sync_task();
        inner.initialized.store(false, Ordering::SeqCst);
        info!("session cleared");
    }
}

impl SessionInner {
    async fn stored_access_token(&self) -> Option<AccessToken> {
        match self.store.get(StoreKey::AccessToken).await {
            Ok(value) => value.map(AccessToken),
            Err(err) => {
                error!(%err, "failed to read access token from store");
                None
            }
        }
    }

    async fn stored_refresh_token(&self) -> Option<RefreshToken> {
        match self.store.get(StoreKey::RefreshToken).await {
            Ok(value) => value.map(RefreshToken),
            Err(err) => {
                error!(%err, "failed to read refresh token from store");
                None
            }
        }
    }

    /// Full session invalidation: clear credentials, cancel the timer,
    /// reject anyone still waiting, and send the user to the login route.
    async fn teardown(&self, err: &SessionError) {
        warn!(%err, "tearing down session");
        if let Err(store_err) = self.store.clear_all().await {
            error!(%store_err, "failed to clear session store during teardown");
        }
        self.timer.cancel();
        self.coordinator.reset(err.clone());
        self.navigator.redirect_to_login().await;
    }

    fn stop_sync_task(&self) {
        let previous = self
            .sync_cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(cancel) = previous {
            cancel.cancel();
        }
    }

    fn set_sync_task(&self, cancel: CancellationToken) {
        let previous = self
            .sync_cancel
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(cancel);
        if let Some(previous) = previous {
            previous.cancel();
        }
    }
}

async fn init(inner: &Arc<SessionInner>) {
    if inner.initialized.load(Ordering::SeqCst) {
        debug!("session manager already initialized");
        return;
    }

    let access = inner.stored_access_token().await;
    let refresh = inner.stored_refresh_token().await;
    if access.is_none() || refresh.is_none() {
        // Guard stays unset so a later setup_session can initialize once
        // credentials arrive.
        debug!("no stored token pair, skipping session manager initialization");
        return;
    }

    info!("initializing session manager");
    arm_from_store(inner).await;
    spawn_sync_task(inner);
    inner.initialized.store(true, Ordering::SeqCst);
}

/// Re-run scheduling from whatever the store currently holds. Idempotent:
/// the same stored token always produces the same schedule, and re-arming
/// cancels the previous task first.
async fn arm_from_store(inner: &Arc<SessionInner>) {
    let Some(access) = inner.stored_access_token().await else {
        inner.timer.cancel();
        return;
    };

    match decode_claims(&access) {
        Err(err) => {
            warn!(%err, "stored access token failed to decode");
            if inner.stored_refresh_token().await.is_some() {
                schedule_refresh(inner, Duration::ZERO);
            } else {
                inner.teardown(&SessionError::Decode(err.to_string())).await;
            }
        }
        Ok(claims) => match inner.policy.plan(claims.expires_at, Utc::now()) {
            RefreshPlan::Immediate => {
                info!("access token expired, refreshing immediately");
                schedule_refresh(inner, Duration::ZERO);
            }
            RefreshPlan::After(delay) => {
                info!(expires_at = %claims.expires_at, ?delay, "refresh scheduled");
                schedule_refresh(inner, delay);
            }
        },
    }
}

fn schedule_refresh(inner: &Arc<SessionInner>, delay: Duration) {
    // The armed task holds only a weak reference: an abandoned manager
    // must not be kept alive by its own timer.
    let weak = Arc::downgrade(inner);
    inner.timer.arm(delay, async move {
        if let Some(inner) = weak.upgrade() {
            let _ = run_refresh(&inner).await;
        }
    });
}

async fn run_refresh(inner: &Arc<SessionInner>) -> RefreshOutcome {
    match inner.coordinator.begin() {
        RefreshRole::Follower(rx) => rx.await.unwrap_or(Err(SessionError::SessionCleared)),
        RefreshRole::Leader => {
            info!("starting token refresh");
            let outcome = execute_refresh(inner).await;
            inner.coordinator.settle(&outcome);
            match &outcome {
                Ok(_) => {
                    info!("token refreshed");
                    arm_from_store(inner).await;
                }
                Err(err) => {
                    error!(%err, "token refresh failed");
                    inner.teardown(err).await;
                }
            }
            outcome
        }
    }
}

/// The leader's half of a refresh: one network exchange, then persist the
/// full new pair before any waiter observes it.
async fn execute_refresh(inner: &SessionInner) -> RefreshOutcome {
    let Some(refresh_token) = inner.stored_refresh_token().await else {
        return Err(SessionError::MissingRefreshToken);
    };

    let pair = inner
        .gateway
        .refresh(&refresh_token)
        .await
        .map_err(|e| match e {
            AuthGatewayError::Rejected => SessionError::RefreshRejected,
            AuthGatewayError::Transport(msg) => SessionError::Transport(msg),
        })?;

    inner
        .store
        .set(StoreKey::AccessToken, &pair.access_token.0)
        .await?;
    inner
        .store
        .set(StoreKey::RefreshToken, &pair.refresh_token.0)
        .await?;

    Ok(pair.access_token)
}

fn spawn_sync_task(inner: &Arc<SessionInner>) {
    let mut changes = match inner.notifier.subscribe() {
        Ok(rx) => rx,
        Err(err) => {
            // Scheduling still works within this context; only
            // cross-context re-arming is lost.
            error!(%err, "cross-context change subscription unavailable");
            return;
        }
    };

    let cancel = CancellationToken::new();
    inner.set_sync_task(cancel.clone());

    let weak = Arc::downgrade(inner);
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                change = changes.recv() => {
                    let Some(change) = change else { break };
                    if !change.key.is_token_key() {
                        continue;
                    }
                    let Some(inner) = weak.upgrade() else { break };
                    debug!(key = %change.key, "token changed in another context, rescheduling refresh");
                    arm_from_store(&inner).await;
                }
            }
        }
        debug!("session change listener stopped");
    });
}
