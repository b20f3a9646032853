use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// When to attempt the next refresh, relative to now.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RefreshPlan {
    Immediate,
    After(Duration),
}

/// Lead/fallback arithmetic for preemptive refreshes.
#[derive(Debug, Clone)]
pub struct SchedulePolicy {
    /// How far before expiry a refresh is attempted.
    pub refresh_lead: chrono::Duration,
    /// Fixed delay used when the token expires within the lead window.
    pub short_lifetime_fallback: chrono::Duration,
}

impl Default for SchedulePolicy {
    fn default() -> Self {
        Self {
            refresh_lead: chrono::Duration::hours(24),
            short_lifetime_fallback: chrono::Duration::hours(1),
        }
    }
}

impl SchedulePolicy {
    /// Plan the next refresh for a token expiring at `expires_at`.
    ///
    /// Tokens already expired refresh immediately. Otherwise the refresh is
    /// armed `refresh_lead` before expiry; when expiry is inside the lead
    /// window the fixed fallback is used instead. For a remaining lifetime
    /// shorter than the fallback this schedules the refresh after the token
    /// has expired; the expired token then takes the immediate path on the
    /// next pass. Kept as-is to bound refresh frequency for short-lived
    /// tokens.
    pub fn plan(&self, expires_at: DateTime<Utc>, now: DateTime<Utc>) -> RefreshPlan {
        let until_expiry = expires_at - now;
        if until_expiry <= chrono::Duration::zero() {
            return RefreshPlan::Immediate;
        }

        let lead_delay = until_expiry - self.refresh_lead;
        let delay = if lead_delay > chrono::Duration::zero() {
            lead_delay
        } else {
            self.short_lifetime_fallback
        };

        RefreshPlan::After(delay.to_std().unwrap_or(Duration::ZERO))
    }
}

struct ArmedRefresh {
    cancel: CancellationToken,
    delay: Duration,
}

/// The process-wide "next refresh" slot: at most one scheduled task alive
/// at any time. Re-arming cancels the previous task before installing the
/// next, and each task carries a generation number so a wakeup that raced
/// with a re-arm can never fire stale work.
pub struct RefreshTimer {
    generation: Arc<AtomicU64>,
    armed: Mutex<Option<ArmedRefresh>>,
}

impl RefreshTimer {
    pub fn new() -> Self {
        Self {
            generation: Arc::new(AtomicU64::new(0)),
            armed: Mutex::new(None),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<ArmedRefresh>> {
        self.armed.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cancel whatever is armed and schedule `fire` to run after `delay`.
    pub fn arm<F>(&self, delay: Duration, fire: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = CancellationToken::new();

        let previous = self.slot().replace(ArmedRefresh {
            cancel: cancel.clone(),
            delay,
        });
        if let Some(previous) = previous {
            previous.cancel.cancel();
        }

        debug!(?delay, generation, "refresh timer armed");

        let current = self.generation.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    // A re-arm between wakeup and here must win.
                    if current.load(Ordering::SeqCst) == generation && !cancel.is_cancelled() {
                        fire.await;
                    }
                }
            }
        });
    }

    pub fn cancel(&self) {
        if let Some(armed) = self.slot().take() {
            armed.cancel.cancel();
            debug!("refresh timer cancelled");
        }
    }

    pub fn is_armed(&self) -> bool {
        self.slot().is_some()
    }

    /// Delay the currently armed task was given, `None` once cancelled.
    pub fn armed_delay(&self) -> Option<Duration> {
        self.slot().as_ref().map(|armed| armed.delay)
    }
}

impl Default for RefreshTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use std::sync::atomic::AtomicU32;

    const HOUR: Duration = Duration::from_secs(60 * 60);

    #[test]
    fn far_future_expiry_is_armed_lead_before_expiry() {
        let policy = SchedulePolicy::default();
        let now = Utc::now();
        let plan = policy.plan(now + ChronoDuration::days(30), now);
        assert_eq!(plan, RefreshPlan::After(29 * 24 * HOUR));
    }

    #[test]
    fn expiry_inside_lead_window_uses_fixed_fallback() {
        let policy = SchedulePolicy::default();
        let now = Utc::now();

        let plan = policy.plan(now + ChronoDuration::hours(10), now);
        assert_eq!(plan, RefreshPlan::After(HOUR));

        // Even when the remaining lifetime is shorter than the fallback:
        // the delay is the fallback, never negative.
        let plan = policy.plan(now + ChronoDuration::minutes(10), now);
        assert_eq!(plan, RefreshPlan::After(HOUR));
    }

    #[test]
    fn exactly_at_lead_boundary_uses_fallback() {
        let policy = SchedulePolicy::default();
        let now = Utc::now();
        let plan = policy.plan(now + ChronoDuration::hours(24), now);
        assert_eq!(plan, RefreshPlan::After(HOUR));
    }

    #[test]
    fn expired_token_refreshes_immediately() {
        let policy = SchedulePolicy::default();
        let now = Utc::now();
        assert_eq!(policy.plan(now, now), RefreshPlan::Immediate);
        assert_eq!(
            policy.plan(now - ChronoDuration::minutes(5), now),
            RefreshPlan::Immediate
        );
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn armed_task_fires_after_delay() {
        let timer = RefreshTimer::new();
        let fired = Arc::new(AtomicU32::new(0));

        let counter = fired.clone();
        timer.arm(Duration::from_secs(60), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::advance(Duration::from_secs(59)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::advance(Duration::from_secs(2)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_cancels_the_previous_task() {
        let timer = RefreshTimer::new();
        let fired = Arc::new(AtomicU32::new(0));

        let counter = fired.clone();
        timer.arm(Duration::from_secs(10), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let counter = fired.clone();
        timer.arm(Duration::from_secs(100), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        // Past the first deadline: the replaced task must not fire.
        tokio::time::advance(Duration::from_secs(50)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::advance(Duration::from_secs(51)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_task_never_fires() {
        let timer = RefreshTimer::new();
        let fired = Arc::new(AtomicU32::new(0));

        let counter = fired.clone();
        timer.arm(Duration::from_secs(10), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(timer.is_armed());

        timer.cancel();
        assert!(!timer.is_armed());
        assert_eq!(timer.armed_delay(), None);

        tokio::time::advance(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
