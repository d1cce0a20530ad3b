//! Performance signal entries as delivered by the host
//!
//! Field names follow the browser's PerformanceEntry JSON shape (camelCase,
//! tagged by `entryType`) so recorded traces can be fed in verbatim.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A performance signal source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SignalKind {
    #[serde(rename = "paint")]
    Paint,
    #[serde(rename = "largest-contentful-paint")]
    LargestContentfulPaint,
    #[serde(rename = "layout-shift")]
    LayoutShift,
    #[serde(rename = "event")]
    Event,
    #[serde(rename = "longtask")]
    LongTask,
    #[serde(rename = "navigation")]
    Navigation,
    #[serde(rename = "resource")]
    Resource,
}

impl SignalKind {
    pub const ALL: [SignalKind; 7] = [
        SignalKind::Paint,
        SignalKind::LargestContentfulPaint,
        SignalKind::LayoutShift,
        SignalKind::Event,
        SignalKind::LongTask,
        SignalKind::Navigation,
        SignalKind::Resource,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Paint => "paint",
            SignalKind::LargestContentfulPaint => "largest-contentful-paint",
            SignalKind::LayoutShift => "layout-shift",
            SignalKind::Event => "event",
            SignalKind::LongTask => "longtask",
            SignalKind::Navigation => "navigation",
            SignalKind::Resource => "resource",
        }
    }
}

impl std::str::FromStr for SignalKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SignalKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown entry type: {}", s))
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signal sources the host can deliver, decided once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    supported: BTreeSet<SignalKind>,
}

impl Capabilities {
    pub fn all() -> Self {
        Self {
            supported: SignalKind::ALL.into_iter().collect(),
        }
    }

    pub fn none() -> Self {
        Self::default()
    }

    /// Build from the host's list of supported entry type names.
    ///
    /// Unknown names are ignored.
    pub fn from_entry_types<S: AsRef<str>>(entry_types: &[S]) -> Self {
        Self {
            supported: entry_types
                .iter()
                .filter_map(|name| name.as_ref().parse().ok())
                .collect(),
        }
    }

    pub fn with(mut self, kind: SignalKind) -> Self {
        self.supported.insert(kind);
        self
    }

    pub fn without(mut self, kind: SignalKind) -> Self {
        self.supported.remove(&kind);
        self
    }

    pub fn supports(&self, kind: SignalKind) -> bool {
        self.supported.contains(&kind)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaintEntry {
    pub name: String,
    pub start_time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LargestContentfulPaintEntry {
    pub start_time: f64,
    #[serde(default)]
    pub size: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutShiftEntry {
    pub start_time: f64,
    pub value: f64,
    #[serde(default)]
    pub had_recent_input: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTimingEntry {
    #[serde(default)]
    pub name: String,
    pub start_time: f64,
    pub duration: f64,
    #[serde(default)]
    pub interaction_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LongTaskEntry {
    pub start_time: f64,
    pub duration: f64,
}

/// The page's navigation timing record; offsets are relative to navigation start.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NavigationTiming {
    pub start_time: f64,
    pub request_start: f64,
    pub response_start: f64,
    pub dom_interactive: f64,
    pub dom_content_loaded_event_end: f64,
    pub load_event_end: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceEntry {
    pub name: String,
    #[serde(default)]
    pub initiator_type: String,
    pub start_time: f64,
    pub duration: f64,
    #[serde(default)]
    pub transfer_size: u64,
    #[serde(default)]
    pub next_hop_protocol: String,
}

/// One observed performance entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entryType")]
pub enum PerformanceEntry {
    #[serde(rename = "paint")]
    Paint(PaintEntry),
    #[serde(rename = "largest-contentful-paint")]
    LargestContentfulPaint(LargestContentfulPaintEntry),
    #[serde(rename = "layout-shift")]
    LayoutShift(LayoutShiftEntry),
    #[serde(rename = "event")]
    Event(EventTimingEntry),
    #[serde(rename = "longtask")]
    LongTask(LongTaskEntry),
    #[serde(rename = "navigation")]
    Navigation(NavigationTiming),
    #[serde(rename = "resource")]
    Resource(ResourceEntry),
}

impl PerformanceEntry {
    pub fn kind(&self) -> SignalKind {
        match self {
            PerformanceEntry::Paint(_) => SignalKind::Paint,
            PerformanceEntry::LargestContentfulPaint(_) => SignalKind::LargestContentfulPaint,
            PerformanceEntry::LayoutShift(_) => SignalKind::LayoutShift,
            PerformanceEntry::Event(_) => SignalKind::Event,
            PerformanceEntry::LongTask(_) => SignalKind::LongTask,
            PerformanceEntry::Navigation(_) => SignalKind::Navigation,
            PerformanceEntry::Resource(_) => SignalKind::Resource,
        }
    }
}

/// JS heap counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryInfo {
    pub used_js_heap_size: u64,
    pub total_js_heap_size: u64,
    pub js_heap_size_limit: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_kind_parse() {
        for kind in SignalKind::ALL {
            assert_eq!(kind.as_str().parse::<SignalKind>().unwrap(), kind);
        }
        assert!("element".parse::<SignalKind>().is_err());
    }

    #[test]
    fn test_capabilities_from_entry_types() {
        let caps = Capabilities::from_entry_types(&["paint", "layout-shift", "element"]);
        assert!(caps.supports(SignalKind::Paint));
        assert!(caps.supports(SignalKind::LayoutShift));
        assert!(!caps.supports(SignalKind::LongTask));

        let caps = Capabilities::all().without(SignalKind::Event);
        assert!(!caps.supports(SignalKind::Event));
        assert!(caps.supports(SignalKind::Resource));
    }

    #[test]
    fn test_parse_browser_shaped_entries() {
        let json = r#"[
            {"entryType": "layout-shift", "startTime": 12.5, "value": 0.02, "hadRecentInput": true},
            {"entryType": "resource", "name": "https://cdn.example.com/app.js",
             "initiatorType": "script", "startTime": 40, "duration": 180,
             "transferSize": 5120, "nextHopProtocol": "h2"},
            {"entryType": "navigation", "responseStart": 120, "loadEventEnd": 900}
        ]"#;
        let entries: Vec<PerformanceEntry> = serde_json::from_str(json).unwrap();

        assert_eq!(entries[0].kind(), SignalKind::LayoutShift);
        match &entries[0] {
            PerformanceEntry::LayoutShift(shift) => assert!(shift.had_recent_input),
            other => panic!("unexpected entry {:?}", other),
        }
        match &entries[1] {
            PerformanceEntry::Resource(resource) => {
                assert_eq!(resource.transfer_size, 5120);
                assert_eq!(resource.next_hop_protocol, "h2");
            }
            other => panic!("unexpected entry {:?}", other),
        }
        match &entries[2] {
            PerformanceEntry::Navigation(nav) => {
                assert_eq!(nav.response_start, 120.0);
                assert_eq!(nav.dom_interactive, 0.0);
            }
            other => panic!("unexpected entry {:?}", other),
        }
    }
}
