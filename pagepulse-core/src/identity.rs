//! Durable anonymous client identity

use serde::{Deserialize, Serialize};

use crate::diagnostics::{report_error, DiagnosticSink};
use crate::storage::{KeyValueStore, CLIENT_ID_KEY};

/// Anonymous identifier that outlives sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientIdentity {
    client_id: String,
}

impl ClientIdentity {
    /// Load the persisted client id, creating and persisting one if absent.
    ///
    /// Storage failures degrade to an id that lives only as long as this page.
    pub fn resolve(store: &dyn KeyValueStore, sink: &dyn DiagnosticSink) -> Self {
        match store.get(CLIENT_ID_KEY) {
            Ok(Some(existing)) if !existing.is_empty() => {
                return Self {
                    client_id: existing,
                }
            }
            Ok(_) => {}
            Err(e) => report_error(sink, "identity.resolve", &e),
        }

        let client_id = uuid::Uuid::new_v4().to_string();
        if let Err(e) = store.set(CLIENT_ID_KEY, &client_id) {
            report_error(sink, "identity.persist", &e);
        } else {
            tracing::debug!(client_id = %client_id, "Created client identity");
        }

        Self { client_id }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{FailureKind, NoopSink, RecordingSink};
    use crate::storage::MemoryStore;

    #[test]
    fn test_client_id_is_created_once() {
        let store = MemoryStore::new();
        let first = ClientIdentity::resolve(&store, &NoopSink);
        let second = ClientIdentity::resolve(&store, &NoopSink);

        assert_eq!(first, second);
        assert_eq!(
            store.get(CLIENT_ID_KEY).unwrap().as_deref(),
            Some(first.client_id())
        );
    }

    struct ReadOnlyStore;

    impl KeyValueStore for ReadOnlyStore {
        fn get(&self, _key: &str) -> crate::Result<Option<String>> {
            Ok(None)
        }
        fn set(&self, _key: &str, _value: &str) -> crate::Result<()> {
            Err(crate::Error::StorageUnavailable("read-only".into()))
        }
        fn set_all(&self, _entries: &[(&str, &str)]) -> crate::Result<()> {
            Err(crate::Error::StorageUnavailable("read-only".into()))
        }
        fn remove(&self, _key: &str) -> crate::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_unwritable_store_keeps_in_memory_id() {
        let sink = RecordingSink::new();
        let identity = ClientIdentity::resolve(&ReadOnlyStore, &sink);

        assert!(!identity.client_id().is_empty());
        assert_eq!(sink.count(FailureKind::StorageUnavailable), 1);
    }
}
