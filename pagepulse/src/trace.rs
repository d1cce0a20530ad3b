//! Recorded host traces
//!
//! A trace is a JSON Lines file; each line is one thing the host page did,
//! tagged by `type`. Blank lines and lines starting with `#` are skipped.
//!
//! ```text
//! {"type": "signal", "kind": "longtask", "entries": [{"entryType": "longtask", "startTime": 10, "duration": 120}]}
//! {"type": "track", "name": "cta-click", "properties": {"id": "hero"}}
//! {"type": "wait", "ms": 5000}
//! {"type": "unload"}
//! ```

use std::cell::Cell;
use std::io::Write;

use anyhow::{Context, Result};
use pagepulse_core::metrics::NavigationTiming;
use pagepulse_core::{Beacon, DeliveryMode, PerformanceEntry, SignalKind};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TraceRecord {
    /// A batch delivered by one performance observer
    Signal {
        kind: SignalKind,
        #[serde(default)]
        entries: Vec<PerformanceEntry>,
    },
    /// The document reached readyState "complete"
    DocumentComplete {
        #[serde(default)]
        navigation: Option<NavigationTiming>,
    },
    /// Client-side navigation to a new URL (absolute or relative)
    Navigate { url: String },
    Visibility { visible: bool },
    /// Caller event through the queued path
    Track {
        name: String,
        #[serde(default)]
        properties: Option<Value>,
    },
    /// Caller event through the waiting path
    TrackEvent {
        name: String,
        #[serde(default)]
        data: Option<Value>,
    },
    /// Let wall-clock time pass
    Wait { ms: i64 },
    Unload,
}

/// Parse a JSONL trace, reporting the offending line on error.
pub fn parse_trace(content: &str) -> Result<Vec<TraceRecord>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(idx, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("invalid trace record on line {}", idx + 1))
        })
        .collect()
}

/// Beacon that prints each payload as one JSON line on stdout.
#[derive(Debug, Default)]
pub struct StdoutBeacon {
    printed: Cell<usize>,
}

impl StdoutBeacon {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn printed(&self) -> usize {
        self.printed.get()
    }
}

impl Beacon for StdoutBeacon {
    fn submit(&self, body: Vec<u8>, _mode: DeliveryMode) -> pagepulse_core::Result<()> {
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(&body)?;
        stdout.write_all(b"\n")?;
        self.printed.set(self.printed.get() + 1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_trace_records() {
        let trace = r#"
# page load
{"type": "signal", "kind": "layout-shift", "entries": [{"entryType": "layout-shift", "startTime": 0, "value": 0.1}]}
{"type": "document_complete", "navigation": {"startTime": 0, "responseStart": 120}}
{"type": "navigate", "url": "/cart"}
{"type": "track", "name": "add-to-cart", "properties": {"sku": "A1"}}
{"type": "track_event", "name": "checkout"}
{"type": "wait", "ms": 900000}
{"type": "visibility", "visible": false}
{"type": "unload"}
"#;
        let records = parse_trace(trace).unwrap();

        assert_eq!(records.len(), 8);
        match &records[0] {
            TraceRecord::Signal { kind, entries } => {
                assert_eq!(*kind, SignalKind::LayoutShift);
                assert_eq!(entries.len(), 1);
            }
            other => panic!("unexpected record: {:?}", other),
        }
        match &records[1] {
            TraceRecord::DocumentComplete { navigation } => {
                assert_eq!(navigation.as_ref().unwrap().response_start, 120.0);
            }
            other => panic!("unexpected record: {:?}", other),
        }
        assert_eq!(
            records[3],
            TraceRecord::Track {
                name: "add-to-cart".to_string(),
                properties: Some(json!({"sku": "A1"})),
            }
        );
        assert_eq!(records[5], TraceRecord::Wait { ms: 900_000 });
        assert_eq!(records[7], TraceRecord::Unload);
    }

    #[test]
    fn test_parse_error_names_line() {
        let trace = "{\"type\": \"unload\"}\n{\"type\": \"teleport\"}\n";
        let err = parse_trace(trace).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
