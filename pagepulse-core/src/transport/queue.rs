//! Pre-initialization event buffer
//!
//! Events tracked before the session is ready wait here. The queue is drained
//! exactly once, in insertion order, when the session becomes ready; after that
//! it refuses new entries and the tracker sends directly.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Caller-supplied event body waiting for a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedEvent {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Value>,
}

impl QueuedEvent {
    pub fn new(name: impl Into<String>, properties: Option<Value>) -> Self {
        Self {
            name: name.into(),
            properties,
        }
    }

    /// Event data with the queue tag folded in.
    ///
    /// Object properties gain an `eventTag` field; anything else is wrapped.
    pub fn tagged_data(&self, tag: QueueTag) -> Value {
        let tag_value = Value::String(tag.as_str().to_string());
        match &self.properties {
            Some(Value::Object(map)) => {
                let mut map = map.clone();
                map.insert("eventTag".to_string(), tag_value);
                Value::Object(map)
            }
            Some(other) => {
                let mut map = Map::new();
                map.insert("value".to_string(), other.clone());
                map.insert("eventTag".to_string(), tag_value);
                Value::Object(map)
            }
            None => {
                let mut map = Map::new();
                map.insert("eventTag".to_string(), tag_value);
                Value::Object(map)
            }
        }
    }
}

/// How drained entries are labelled, from the session's origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueTag {
    /// The session was created by this page
    Initial,
    /// The session was resumed from storage
    Custom,
}

impl QueueTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueTag::Initial => "initial",
            QueueTag::Custom => "custom",
        }
    }
}

#[derive(Debug)]
pub struct PendingQueue {
    entries: VecDeque<QueuedEvent>,
    capacity: usize,
    drained: bool,
}

impl PendingQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
            drained: false,
        }
    }

    /// Seed from entries buffered by the host before the tracker existed.
    ///
    /// Entries beyond `capacity` are discarded from the back.
    pub fn with_entries(capacity: usize, entries: impl IntoIterator<Item = QueuedEvent>) -> Self {
        let mut queue = Self::new(capacity);
        queue
            .entries
            .extend(entries.into_iter().take(queue.capacity));
        queue
    }

    /// Parse the host's pre-load buffer: a JSON array of `{name, properties}`.
    pub fn from_json(capacity: usize, json: &str) -> Result<Self> {
        let entries: Vec<QueuedEvent> = serde_json::from_str(json)?;
        Ok(Self::with_entries(capacity, entries))
    }

    pub fn push(&mut self, entry: QueuedEvent) -> Result<()> {
        if self.drained {
            return Err(Error::Transport("pending queue already drained".to_string()));
        }
        if self.entries.len() >= self.capacity {
            return Err(Error::Transport(format!(
                "pending queue full ({} events), dropping {:?}",
                self.capacity, entry.name
            )));
        }
        self.entries.push_back(entry);
        Ok(())
    }

    /// Take every queued entry in insertion order. Only the first call yields.
    pub fn drain(&mut self) -> Vec<QueuedEvent> {
        if self.drained {
            return Vec::new();
        }
        self.drained = true;
        self.entries.drain(..).collect()
    }

    pub fn is_drained(&self) -> bool {
        self.drained
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for PendingQueue {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_drains_once_in_order() {
        let mut queue = PendingQueue::new(10);
        queue.push(QueuedEvent::new("a", None)).unwrap();
        queue.push(QueuedEvent::new("b", None)).unwrap();

        let names: Vec<_> = queue.drain().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(queue.is_drained());
        assert!(queue.drain().is_empty());
        assert!(queue.push(QueuedEvent::new("c", None)).is_err());
    }

    #[test]
    fn test_capacity_bounds_queue() {
        let mut queue = PendingQueue::new(1);
        queue.push(QueuedEvent::new("a", None)).unwrap();
        assert!(queue.push(QueuedEvent::new("b", None)).is_err());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_from_host_buffer() {
        let json = r#"[
            {"name": "hero-visible", "properties": {"variant": "b"}},
            {"name": "newsletter-open"}
        ]"#;
        let mut queue = PendingQueue::from_json(8, json).unwrap();
        assert_eq!(queue.len(), 2);

        let drained = queue.drain();
        assert_eq!(drained[0].properties, Some(json!({"variant": "b"})));
        assert_eq!(drained[1].properties, None);

        assert!(PendingQueue::from_json(8, "{\"name\": 1}").is_err());
    }

    #[test]
    fn test_tagged_data() {
        let object = QueuedEvent::new("a", Some(json!({"k": 1})));
        assert_eq!(
            object.tagged_data(QueueTag::Initial),
            json!({"k": 1, "eventTag": "initial"})
        );

        let scalar = QueuedEvent::new("b", Some(json!(5)));
        assert_eq!(
            scalar.tagged_data(QueueTag::Custom),
            json!({"value": 5, "eventTag": "custom"})
        );

        let empty = QueuedEvent::new("c", None);
        assert_eq!(empty.tagged_data(QueueTag::Custom), json!({"eventTag": "custom"}));
    }
}
