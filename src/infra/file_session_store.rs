use crate::domain_port::{
    NotifyError, SessionChange, SessionChangeNotifier, StoreError, StoreKey, TokenStore,
};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;

const SUBSCRIBER_BUFFER: usize = 16;

/// Session storage as a directory with one file per key, shared between
/// processes the way browser profiles share their storage area. Cross-
/// process change notification comes from a filesystem watch.
///
/// `clear_all` deletes the files one by one; there is no multi-file
/// transaction, so a crash mid-clear can leave a partial pair behind.
pub struct FileSessionStore {
    dir: PathBuf,
    // Watchers stop when dropped, so they live as long as the store.
    watchers: Mutex<Vec<RecommendedWatcher>>,
}

impl FileSessionStore {
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(Self {
            dir,
            watchers: Mutex::new(Vec::new()),
        })
    }

    fn path_for(&self, key: StoreKey) -> PathBuf {
        self.dir.join(key.as_str())
    }
}

fn key_for_path(path: &Path) -> Option<StoreKey> {
    path.file_name()
        .and_then(|name| name.to_str())
        .and_then(StoreKey::from_name)
}

#[async_trait::async_trait]
impl TokenStore for FileSessionStore {
    async fn get(&self, key: StoreKey) -> Result<Option<String>, StoreError> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(e.to_string())),
        }
    }

    async fn set(&self, key: StoreKey, value: &str) -> Result<(), StoreError> {
        tokio::fs::write(self.path_for(key), value)
            .await
            .map_err(|e| StoreError::Io(e.to_string()))
    }

    async fn remove(&self, key: StoreKey) -> Result<(), StoreError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io(e.to_string())),
        }
    }

    async fn clear_all(&self) -> Result<(), StoreError> {
        for key in StoreKey::ALL {
            self.remove(key).await?;
        }
        Ok(())
    }
}

impl SessionChangeNotifier for FileSessionStore {
    fn subscribe(&self) -> Result<mpsc::Receiver<SessionChange>, NotifyError> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);

        // Unlike browser storage events this watch also reports writes made
        // by this process; consumers re-arm idempotently, so the extra
        // notifications are harmless.
        let mut watcher =
            notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
                let Ok(event) = result else {
                    return;
                };
                if !matches!(
                    event.kind,
                    EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                ) {
                    return;
                }
                for path in &event.paths {
                    let Some(key) = key_for_path(path) else {
                        continue;
                    };
                    let new_value = std::fs::read_to_string(path).ok();
                    // The handler runs on the watcher's own thread.
                    if tx.blocking_send(SessionChange { key, new_value }).is_err() {
                        return;
                    }
                }
            })
            .map_err(|e| NotifyError(e.to_string()))?;

        watcher
            .watch(&self.dir, RecursiveMode::NonRecursive)
            .map_err(|e| NotifyError(e.to_string()))?;

        self.watchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(watcher);

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn roundtrips_values() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::open(dir.path()).await.unwrap();

        assert_eq!(store.get(StoreKey::AccessToken).await.unwrap(), None);

        store.set(StoreKey::AccessToken, "abc").await.unwrap();
        store.set(StoreKey::RefreshToken, "def").await.unwrap();
        assert_eq!(
            store.get(StoreKey::AccessToken).await.unwrap().as_deref(),
            Some("abc")
        );

        // Overwrite.
        store.set(StoreKey::AccessToken, "xyz").await.unwrap();
        assert_eq!(
            store.get(StoreKey::AccessToken).await.unwrap().as_deref(),
            Some("xyz")
        );
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::open(dir.path()).await.unwrap();

        store.set(StoreKey::User, "{}").await.unwrap();
        store.remove(StoreKey::User).await.unwrap();
        store.remove(StoreKey::User).await.unwrap();
        assert_eq!(store.get(StoreKey::User).await.unwrap(), None);
    }

    #[tokio::test]
    async fn clear_all_removes_every_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::open(dir.path()).await.unwrap();

        for key in StoreKey::ALL {
            store.set(key, "value").await.unwrap();
        }
        store.clear_all().await.unwrap();
        for key in StoreKey::ALL {
            assert_eq!(store.get(key).await.unwrap(), None);
        }
    }

    #[tokio::test]
    async fn two_stores_share_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store_a = FileSessionStore::open(dir.path()).await.unwrap();
        let store_b = FileSessionStore::open(dir.path()).await.unwrap();

        store_a.set(StoreKey::AccessToken, "shared").await.unwrap();
        assert_eq!(
            store_b.get(StoreKey::AccessToken).await.unwrap().as_deref(),
            Some("shared")
        );
    }
}
