//! Page performance aggregation
//!
//! The collector owns one [`SignalHandler`] per [`SignalKind`]. Which handler a
//! kind gets is decided once, from the host's [`Capabilities`]: a missing
//! source is wired to [`NoopHandler`](timing::NoopHandler) so the only effect
//! is that its metric keeps its default value.
//!
//! ```text
//! host observer ──batch──▶ MetricCollector::observe(kind, entries)
//!                                 │
//!                                 ▼
//!                        handlers[kind].handle(entries, &mut snapshot)
//!                                 │
//!                                 ▼
//!                         MetricSnapshot (cloned out for dispatch)
//! ```

pub mod entries;
pub mod interaction;
pub mod layout_shift;
pub mod timing;

use std::collections::BTreeMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::diagnostics::{report, Diagnostic, DiagnosticSink, FailureKind};

pub use entries::{
    Capabilities, EventTimingEntry, LargestContentfulPaintEntry, LayoutShiftEntry, LongTaskEntry,
    MemoryInfo, NavigationTiming, PaintEntry, PerformanceEntry, ResourceEntry, SignalKind,
};

use interaction::InteractionHandler;
use layout_shift::LayoutShiftHandler;
use timing::{
    LargestPaintHandler, LongTaskHandler, NavigationHandler, NoopHandler, PaintHandler,
    ResourceHandler,
};

/// Consumes batches from one signal source.
pub trait SignalHandler {
    fn handle(&mut self, entries: &[PerformanceEntry], snapshot: &mut MetricSnapshot);
}

/// A network resource load worth reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTimingRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub duration: f64,
    pub transfer_size: u64,
    pub start_time: f64,
    pub protocol: String,
}

impl From<&ResourceEntry> for ResourceTimingRecord {
    fn from(entry: &ResourceEntry) -> Self {
        Self {
            name: entry.name.clone(),
            resource_type: entry.initiator_type.clone(),
            duration: entry.duration,
            transfer_size: entry.transfer_size,
            start_time: entry.start_time,
            protocol: entry.next_hop_protocol.clone(),
        }
    }
}

/// Point-in-time view of every aggregated metric.
///
/// Timings are milliseconds relative to navigation start; `cls` is unitless.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSnapshot {
    pub lcp: f64,
    pub cls: f64,
    pub inp: f64,
    pub fcp: f64,
    pub ttfb: f64,
    pub tbt: f64,
    pub dcl: f64,
    pub load: f64,
    pub tti: f64,
    pub resources: Vec<ResourceTimingRecord>,
    /// Every resource entry observed, recorded or not
    pub resource_count: u64,
    pub interaction_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_js_heap_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_js_heap_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub js_heap_size_limit: Option<u64>,
}

/// What the host should observe for one supported source.
#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    pub kind: SignalKind,
    /// Replay entries recorded before the subscription existed
    pub buffered: bool,
    /// Minimum entry duration to deliver (interaction entries only)
    pub duration_threshold_ms: Option<u64>,
}

/// Collector tuning, usually taken from `TrackerConfig`.
#[derive(Debug, Clone)]
pub struct CollectorOptions {
    pub max_resources: usize,
    pub interaction_threshold_ms: u64,
}

impl Default for CollectorOptions {
    fn default() -> Self {
        Self {
            max_resources: 150,
            interaction_threshold_ms: 40,
        }
    }
}

pub struct MetricCollector {
    handlers: BTreeMap<SignalKind, Box<dyn SignalHandler>>,
    capabilities: Capabilities,
    options: CollectorOptions,
    snapshot: MetricSnapshot,
    connected: bool,
}

impl MetricCollector {
    pub fn new(
        capabilities: Capabilities,
        options: CollectorOptions,
        sink: Rc<dyn DiagnosticSink>,
    ) -> Self {
        let mut handlers: BTreeMap<SignalKind, Box<dyn SignalHandler>> = BTreeMap::new();
        for kind in SignalKind::ALL {
            let handler: Box<dyn SignalHandler> = if capabilities.supports(kind) {
                Self::handler_for(kind, &options)
            } else {
                report(
                    sink.as_ref(),
                    Diagnostic::new(
                        FailureKind::SignalUnsupported,
                        "metrics.subscribe",
                        format!("{} entries are not available", kind),
                    ),
                );
                Box::new(NoopHandler)
            };
            handlers.insert(kind, handler);
        }

        Self {
            handlers,
            capabilities,
            options,
            snapshot: MetricSnapshot::default(),
            connected: true,
        }
    }

    fn handler_for(kind: SignalKind, options: &CollectorOptions) -> Box<dyn SignalHandler> {
        match kind {
            SignalKind::Paint => Box::<PaintHandler>::default(),
            SignalKind::LargestContentfulPaint => Box::new(LargestPaintHandler),
            SignalKind::LayoutShift => Box::new(LayoutShiftHandler::new()),
            SignalKind::Event => Box::new(InteractionHandler::new()),
            SignalKind::LongTask => Box::new(LongTaskHandler),
            SignalKind::Navigation => Box::<NavigationHandler>::default(),
            SignalKind::Resource => Box::new(ResourceHandler::new(options.max_resources)),
        }
    }

    /// Sources the host should observe, in a stable order.
    ///
    /// Navigation is read once at document completion rather than observed.
    pub fn subscriptions(&self) -> Vec<Subscription> {
        if !self.connected {
            return Vec::new();
        }
        SignalKind::ALL
            .into_iter()
            .filter(|kind| *kind != SignalKind::Navigation && self.capabilities.supports(*kind))
            .map(|kind| Subscription {
                kind,
                buffered: true,
                duration_threshold_ms: (kind == SignalKind::Event)
                    .then_some(self.options.interaction_threshold_ms),
            })
            .collect()
    }

    /// Feed one batch delivered by the `kind` source.
    pub fn observe(&mut self, kind: SignalKind, entries: &[PerformanceEntry]) {
        if let Some(handler) = self.handlers.get_mut(&kind) {
            handler.handle(entries, &mut self.snapshot);
        }
    }

    /// Record the last heap counters, if the host has them.
    pub fn record_memory(&mut self, memory: Option<MemoryInfo>) {
        if !self.connected {
            return;
        }
        if let Some(memory) = memory {
            self.snapshot.used_js_heap_size = Some(memory.used_js_heap_size);
            self.snapshot.total_js_heap_size = Some(memory.total_js_heap_size);
            self.snapshot.js_heap_size_limit = Some(memory.js_heap_size_limit);
        }
    }

    pub fn snapshot(&self) -> MetricSnapshot {
        self.snapshot.clone()
    }

    /// Stop aggregating: every source now goes to the no-op handler.
    pub fn disconnect(&mut self) {
        for handler in self.handlers.values_mut() {
            *handler = Box::new(NoopHandler);
        }
        self.connected = false;
    }
}
