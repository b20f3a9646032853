use std::fmt;

/// Keys of the shared session store. The same three slots every execution
/// context reads and writes.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum StoreKey {
    AccessToken,
    RefreshToken,
    User,
}

impl StoreKey {
    pub const ALL: [StoreKey; 3] = [StoreKey::AccessToken, StoreKey::RefreshToken, StoreKey::User];

    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKey::AccessToken => "access_token",
            StoreKey::RefreshToken => "refresh_token",
            StoreKey::User => "user",
        }
    }

    pub fn from_name(s: &str) -> Option<StoreKey> {
        match s {
            "access_token" => Some(StoreKey::AccessToken),
            "refresh_token" => Some(StoreKey::RefreshToken),
            "user" => Some(StoreKey::User),
            _ => None,
        }
    }

    /// Whether a change to this key should re-arm refresh scheduling.
    pub fn is_token_key(&self) -> bool {
        matches!(self, StoreKey::AccessToken | StoreKey::RefreshToken)
    }
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store i/o error: {0}")]
    Io(String),
    #[error("store serialization error: {0}")]
    Serialization(String),
}

/// Durable key/value storage for the session triple, visible to every
/// execution context sharing the same profile. Values are strings; callers
/// serialize and deserialize.
///
/// `clear_all` removes the keys one by one. The backing platforms have no
/// multi-key transaction, so a crash mid-clear can leave a partial pair;
/// initialization requires both tokens, so a lone leftover is ignored.
#[async_trait::async_trait]
pub trait TokenStore: Send + Sync {
    async fn get(&self, key: StoreKey) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: StoreKey, value: &str) -> Result<(), StoreError>;
    async fn remove(&self, key: StoreKey) -> Result<(), StoreError>;
    async fn clear_all(&self) -> Result<(), StoreError>;
}
