//! Drive a tracker from a recorded trace
//!
//! The replay plays the part of the host page: it owns the page model and a
//! manual clock, forwards each record to the tracker and tears the page down
//! at the end of the trace.

use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{Context, Result};
use pagepulse_core::metrics::Subscription;
use pagepulse_core::transport::PendingQueue;
use pagepulse_core::{
    Beacon, Clock, Config, Diagnostic, DiagnosticSink, HttpBeacon, ManualClock, PageState,
    PerformanceEntry, SignalKind, SqliteStore, SystemClock, Tracker, TracingSink,
};

use crate::trace::{StdoutBeacon, TraceRecord};

pub struct ReplayOptions {
    pub url: String,
    pub referrer: Option<String>,
    pub user_agent: Option<String>,
    pub dry_run: bool,
    pub pending: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct ReplaySummary {
    pub records: usize,
    pub refreshes: usize,
    /// Payloads printed (dry runs only)
    pub printed: Option<usize>,
    pub faults: usize,
}

/// Logs every fault as it happens and counts them for the summary.
#[derive(Debug, Default)]
struct CountingSink {
    faults: Cell<usize>,
}

impl DiagnosticSink for CountingSink {
    fn report(&self, diagnostic: Diagnostic) {
        self.faults.set(self.faults.get() + 1);
        TracingSink.report(diagnostic);
    }
}

/// Narrow a recorded batch to what a live observer for `kind` would deliver:
/// nothing for an unsubscribed source, and for interaction sources only the
/// entries at or above the subscription's duration threshold.
fn deliverable(
    subscriptions: &[Subscription],
    kind: SignalKind,
    entries: Vec<PerformanceEntry>,
) -> Option<Vec<PerformanceEntry>> {
    let subscription = subscriptions.iter().find(|s| s.kind == kind)?;
    let Some(threshold) = subscription.duration_threshold_ms else {
        return Some(entries);
    };
    Some(
        entries
            .into_iter()
            .filter(|entry| match entry {
                PerformanceEntry::Event(event) => event.duration >= threshold as f64,
                _ => true,
            })
            .collect(),
    )
}

enum Delivery {
    Stdout(Rc<StdoutBeacon>),
    Http(Rc<HttpBeacon>),
}

impl Delivery {
    fn beacon(&self) -> Rc<dyn Beacon> {
        match self {
            Delivery::Stdout(beacon) => beacon.clone() as Rc<dyn Beacon>,
            Delivery::Http(beacon) => beacon.clone() as Rc<dyn Beacon>,
        }
    }
}

/// Replay `records` against the durable state in `config`.
///
/// Must run inside a `LocalSet`: the tracker handle is not `Send`.
pub async fn run(
    config: &Config,
    records: Vec<TraceRecord>,
    options: ReplayOptions,
) -> Result<ReplaySummary> {
    let delivery = if options.dry_run {
        Delivery::Stdout(Rc::new(StdoutBeacon::new()))
    } else {
        let beacon = HttpBeacon::new(&config.tracker)
            .context("a collection endpoint is required unless --dry-run is given")?;
        Delivery::Http(Rc::new(beacon))
    };

    let pending = match &options.pending {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read pending events {}", path.display()))?;
            PendingQueue::from_json(config.tracker.max_pending_events, &json)
                .context("failed to parse pending events")?
        }
        None => PendingQueue::new(config.tracker.max_pending_events),
    };

    let storage_path = config.storage_path();
    if let Some(parent) = storage_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let store = SqliteStore::open(&storage_path).context("failed to open state store")?;

    let mut page = PageState::new(&options.url).context("invalid page url")?;
    if let Some(referrer) = &options.referrer {
        page = page.with_referrer(referrer.clone());
    }
    if let Some(user_agent) = &options.user_agent {
        page = page.with_user_agent(user_agent.clone());
    }
    let page = Rc::new(page);
    let clock = Rc::new(ManualClock::new(SystemClock.now_ms()));
    let sink = Rc::new(CountingSink::default());

    let tracker = Tracker::builder(config.tracker.clone())
        .store(Rc::new(store))
        .beacon(delivery.beacon())
        .page(page.clone())
        .clock(clock.clone())
        .sink(sink.clone())
        .pending(pending)
        .build()
        .context("failed to build tracker")?;

    let origin = tracker.initialize();
    let subscriptions = tracker.subscriptions();
    tracing::info!(
        ?origin,
        records = records.len(),
        sources = subscriptions.len(),
        "Replaying trace"
    );

    let refresh_every = config.tracker.refresh_interval().as_millis() as i64;
    let mut since_refresh = 0i64;
    let mut summary = ReplaySummary {
        records: records.len(),
        ..Default::default()
    };

    for record in records {
        match record {
            TraceRecord::Signal { kind, entries } => {
                match deliverable(&subscriptions, kind, entries) {
                    Some(entries) => tracker.observe(kind, &entries),
                    None => tracing::debug!(%kind, "Skipping batch from unobserved source"),
                }
            }
            TraceRecord::DocumentComplete { navigation } => {
                tracker.on_document_complete(navigation)
            }
            TraceRecord::Navigate { url } => {
                page.navigate(&url)
                    .with_context(|| format!("invalid navigation to {}", url))?;
                tracker.on_pathname_change();
            }
            TraceRecord::Visibility { visible } => {
                page.set_visible(visible);
                tracker.on_visibility_change();
            }
            TraceRecord::Track { name, properties } => {
                tracker.track(&name, properties);
            }
            TraceRecord::TrackEvent { name, data } => {
                tracker.track_event(&name, data).await;
            }
            TraceRecord::Wait { ms } => {
                // Step through every refresh tick the wait spans
                let mut remaining = ms.max(0);
                while remaining > 0 {
                    let step = remaining.min(refresh_every - since_refresh);
                    clock.advance(step);
                    remaining -= step;
                    since_refresh += step;
                    if since_refresh >= refresh_every {
                        since_refresh = 0;
                        if tracker.refresh() {
                            summary.refreshes += 1;
                        }
                    }
                }
            }
            TraceRecord::Unload => tracker.on_unload(),
        }
    }

    tracker.destroy();

    match &delivery {
        Delivery::Stdout(beacon) => summary.printed = Some(beacon.printed()),
        Delivery::Http(beacon) => beacon.settle().await,
    }

    summary.faults = sink.faults.get();
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagepulse_core::metrics::{EventTimingEntry, LongTaskEntry};

    fn interaction(duration: f64) -> PerformanceEntry {
        PerformanceEntry::Event(EventTimingEntry {
            name: "click".to_string(),
            start_time: 0.0,
            duration,
            interaction_id: Some(7),
        })
    }

    fn subscriptions() -> Vec<Subscription> {
        vec![
            Subscription {
                kind: SignalKind::Event,
                buffered: true,
                duration_threshold_ms: Some(40),
            },
            Subscription {
                kind: SignalKind::LongTask,
                buffered: true,
                duration_threshold_ms: None,
            },
        ]
    }

    #[test]
    fn test_interactions_below_threshold_are_not_delivered() {
        let batch = vec![interaction(5.0), interaction(40.0), interaction(100.0)];
        let delivered = deliverable(&subscriptions(), SignalKind::Event, batch).unwrap();
        assert_eq!(delivered, vec![interaction(40.0), interaction(100.0)]);
    }

    #[test]
    fn test_unsubscribed_source_is_skipped() {
        let batch = vec![PerformanceEntry::LongTask(LongTaskEntry {
            start_time: 0.0,
            duration: 120.0,
        })];
        assert!(deliverable(&subscriptions(), SignalKind::LongTask, batch.clone()).is_some());
        assert!(deliverable(&subscriptions(), SignalKind::Paint, batch).is_none());
    }

    #[test]
    fn test_counting_sink_counts_faults() {
        let sink = CountingSink::default();
        sink.report(Diagnostic::new(
            pagepulse_core::FailureKind::TransportFailure,
            "transport.send",
            "offline",
        ));
        assert_eq!(sink.faults.get(), 1);
    }
}
