use crate::domain_port::{
    NotifyError, SessionChange, SessionChangeNotifier, StoreError, StoreKey, TokenStore,
};
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{broadcast, mpsc};
use tracing::warn;

const EVENT_CAPACITY: usize = 64;
const SUBSCRIBER_BUFFER: usize = 16;

#[derive(Debug, Clone)]
struct TabEvent {
    origin: usize,
    change: SessionChange,
}

/// In-process store modelling the platform's shared storage. All handles
/// share one map; `another_tab` produces a handle with a distinct origin,
/// and a handle's subscription only observes writes made through *other*
/// origins, matching the platform rule that change events never fire in
/// the context that caused them.
#[derive(Clone)]
pub struct MemorySessionStore {
    entries: Arc<DashMap<StoreKey, String>>,
    events: broadcast::Sender<TabEvent>,
    next_origin: Arc<AtomicUsize>,
    origin: usize,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            entries: Arc::new(DashMap::new()),
            events,
            next_origin: Arc::new(AtomicUsize::new(1)),
            origin: 0,
        }
    }

    /// The same storage as seen from another execution context.
    pub fn another_tab(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            events: self.events.clone(),
            next_origin: self.next_origin.clone(),
            origin: self.next_origin.fetch_add(1, Ordering::SeqCst),
        }
    }

    fn publish(&self, key: StoreKey, new_value: Option<String>) {
        // No subscribers is fine.
        let _ = self.events.send(TabEvent {
            origin: self.origin,
            change: SessionChange { key, new_value },
        });
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl TokenStore for MemorySessionStore {
    async fn get(&self, key: StoreKey) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(&key).map(|entry| entry.value().clone()))
    }

    async fn set(&self, key: StoreKey, value: &str) -> Result<(), StoreError> {
        self.entries.insert(key, value.to_string());
        self.publish(key, Some(value.to_string()));
        Ok(())
    }

    async fn remove(&self, key: StoreKey) -> Result<(), StoreError> {
        if self.entries.remove(&key).is_some() {
            self.publish(key, None);
        }
        Ok(())
    }

    async fn clear_all(&self) -> Result<(), StoreError> {
        // Key by key, like the platform storage this models.
        for key in StoreKey::ALL {
            self.remove(key).await?;
        }
        Ok(())
    }
}

impl SessionChangeNotifier for MemorySessionStore {
    fn subscribe(&self) -> Result<mpsc::Receiver<SessionChange>, NotifyError> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let mut events = self.events.subscribe();
        let origin = self.origin;

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if event.origin == origin {
                            continue;
                        }
                        if tx.send(event.change).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // Missed changes are safe: the consumer re-reads
                        // the store on every notification anyway.
                        warn!(skipped, "session change stream lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(rx)
    }
}
