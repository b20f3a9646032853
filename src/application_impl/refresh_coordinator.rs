use crate::application_port::SessionError;
use crate::domain_model::AccessToken;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;
use tracing::debug;

pub type RefreshOutcome = Result<AccessToken, SessionError>;

/// What a caller of `refresh` turned out to be: the leader performs the
/// one network exchange, followers await its shared outcome.
pub enum RefreshRole {
    Leader,
    Follower(oneshot::Receiver<RefreshOutcome>),
}

enum State {
    Idle,
    InFlight(Vec<oneshot::Sender<RefreshOutcome>>),
}

/// Concurrency control for the one operation that spans an async boundary.
/// Guarantees at most one in-flight refresh exchange system-wide: the
/// first caller becomes leader, everyone arriving before the exchange
/// settles is queued and receives the identical outcome.
///
/// The mutex is only held across synchronous sections, never across an
/// await.
pub struct RefreshCoordinator {
    state: Mutex<State>,
}

impl RefreshCoordinator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::Idle),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Join the current refresh, or open a new one as leader.
    pub fn begin(&self) -> RefreshRole {
        let mut state = self.state();
        match &mut *state {
            State::Idle => {
                *state = State::InFlight(Vec::new());
                RefreshRole::Leader
            }
            State::InFlight(waiters) => {
                let (tx, rx) = oneshot::channel();
                waiters.push(tx);
                debug!(queued = waiters.len(), "refresh already in flight, caller queued");
                RefreshRole::Follower(rx)
            }
        }
    }

    /// Deliver the leader's outcome to every queued waiter and clear the
    /// in-flight flag. A no-op on the waiter side if the session was reset
    /// while the exchange was outstanding.
    pub fn settle(&self, outcome: &RefreshOutcome) {
        let waiters = {
            let mut state = self.state();
            match std::mem::replace(&mut *state, State::Idle) {
                State::InFlight(waiters) => waiters,
                State::Idle => Vec::new(),
            }
        };
        for waiter in waiters {
            // A follower that gave up waiting just drops its receiver.
            let _ = waiter.send(outcome.clone());
        }
    }

    /// Reject any queued waiters with `err` and return to idle. Used by
    /// session teardown paths.
    pub fn reset(&self, err: SessionError) {
        self.settle(&Err(err));
    }

    pub fn is_in_flight(&self) -> bool {
        matches!(&*self.state(), State::InFlight(_))
    }
}

impl Default for RefreshCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_caller_leads_and_later_callers_follow() {
        let coordinator = RefreshCoordinator::new();

        assert!(matches!(coordinator.begin(), RefreshRole::Leader));
        assert!(coordinator.is_in_flight());

        let follower_a = match coordinator.begin() {
            RefreshRole::Follower(rx) => rx,
            RefreshRole::Leader => panic!("second caller must not lead"),
        };
        let follower_b = match coordinator.begin() {
            RefreshRole::Follower(rx) => rx,
            RefreshRole::Leader => panic!("third caller must not lead"),
        };

        let outcome = Ok(AccessToken("fresh".to_string()));
        coordinator.settle(&outcome);
        assert!(!coordinator.is_in_flight());

        assert_eq!(follower_a.await.unwrap().unwrap().0, "fresh");
        assert_eq!(follower_b.await.unwrap().unwrap().0, "fresh");
    }

    #[tokio::test]
    async fn failure_is_fanned_out_to_all_waiters() {
        let coordinator = RefreshCoordinator::new();

        assert!(matches!(coordinator.begin(), RefreshRole::Leader));
        let followers: Vec<_> = (0..3)
            .map(|_| match coordinator.begin() {
                RefreshRole::Follower(rx) => rx,
                RefreshRole::Leader => panic!("must follow"),
            })
            .collect();

        coordinator.settle(&Err(SessionError::RefreshRejected));

        for follower in followers {
            assert!(matches!(
                follower.await.unwrap(),
                Err(SessionError::RefreshRejected)
            ));
        }
    }

    #[tokio::test]
    async fn reset_rejects_pending_waiters() {
        let coordinator = RefreshCoordinator::new();

        assert!(matches!(coordinator.begin(), RefreshRole::Leader));
        let follower = match coordinator.begin() {
            RefreshRole::Follower(rx) => rx,
            RefreshRole::Leader => panic!("must follow"),
        };

        coordinator.reset(SessionError::SessionCleared);
        assert!(!coordinator.is_in_flight());
        assert!(matches!(
            follower.await.unwrap(),
            Err(SessionError::SessionCleared)
        ));

        // After a reset the next caller opens a fresh exchange.
        assert!(matches!(coordinator.begin(), RefreshRole::Leader));
    }
}
