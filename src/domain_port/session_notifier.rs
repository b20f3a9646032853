use crate::domain_port::StoreKey;
use tokio::sync::mpsc;

/// An out-of-process mutation of the shared store, as reported by the
/// platform's change notification. `new_value` is `None` for removals.
#[derive(Debug, Clone)]
pub struct SessionChange {
    pub key: StoreKey,
    pub new_value: Option<String>,
}

#[derive(Debug, thiserror::Error)]
#[error("session change subscription failed: {0}")]
pub struct NotifyError(pub String);

/// Publish/subscribe seam over the platform's cross-context change
/// mechanism (browser storage events, filesystem watches, ...). Consumers
/// must tolerate duplicate and self-caused notifications: re-arming from a
/// notification is idempotent.
pub trait SessionChangeNotifier: Send + Sync {
    fn subscribe(&self) -> Result<mpsc::Receiver<SessionChange>, NotifyError>;
}
