//! Durable key/value state
//!
//! The tracker persists exactly three entries: the session id, the session
//! expiration (epoch milliseconds as a decimal string) and the client id.
//! Storage is shared by every tracker that opens the same backend and there is
//! no coordination between them: concurrent writers race and the last write wins.

mod sqlite;

use std::cell::RefCell;
use std::collections::HashMap;

use crate::error::Result;

pub use sqlite::SqliteStore;

/// Key holding the current session id
pub const SESSION_ID_KEY: &str = "pagepulse.session_id";
/// Key holding the current session expiration (epoch ms)
pub const SESSION_EXPIRATION_KEY: &str = "pagepulse.session_expiration";
/// Key holding the durable client id
pub const CLIENT_ID_KEY: &str = "pagepulse.client_id";

/// String key/value persistence.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Write several entries so that either all or none become visible.
    fn set_all(&self, entries: &[(&str, &str)]) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RefCell<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn set_all(&self, entries: &[(&str, &str)]) -> Result<()> {
        let mut map = self.entries.borrow_mut();
        for (key, value) in entries {
            map.insert((*key).to_string(), (*value).to_string());
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.is_empty());
        assert_eq!(store.get(CLIENT_ID_KEY).unwrap(), None);

        store.set(CLIENT_ID_KEY, "client-1").unwrap();
        store
            .set_all(&[(SESSION_ID_KEY, "s-1"), (SESSION_EXPIRATION_KEY, "42")])
            .unwrap();

        assert_eq!(store.len(), 3);
        assert_eq!(store.get(SESSION_ID_KEY).unwrap().as_deref(), Some("s-1"));

        store.remove(SESSION_ID_KEY).unwrap();
        assert_eq!(store.get(SESSION_ID_KEY).unwrap(), None);
    }
}
