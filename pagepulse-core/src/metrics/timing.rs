//! Paint, long-task, navigation and resource handlers.

use super::entries::{NavigationTiming, PerformanceEntry, ResourceEntry};
use super::{MetricSnapshot, ResourceTimingRecord, SignalHandler};

/// Paint entry name that marks First Contentful Paint
pub const FIRST_CONTENTFUL_PAINT: &str = "first-contentful-paint";

/// Main-thread time above this counts as blocking
pub const BLOCKING_THRESHOLD_MS: f64 = 50.0;

/// Resources at or under this duration are not recorded
pub const SLOW_RESOURCE_MS: f64 = 100.0;

/// Stand-in for a signal source the host does not have.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandler;

impl SignalHandler for NoopHandler {
    fn handle(&mut self, _entries: &[PerformanceEntry], _snapshot: &mut MetricSnapshot) {}
}

/// First Contentful Paint: the first matching paint entry wins.
#[derive(Debug, Default)]
pub struct PaintHandler {
    seen: bool,
}

impl SignalHandler for PaintHandler {
    fn handle(&mut self, entries: &[PerformanceEntry], snapshot: &mut MetricSnapshot) {
        if self.seen {
            return;
        }
        let fcp = entries.iter().find_map(|entry| match entry {
            PerformanceEntry::Paint(paint) if paint.name == FIRST_CONTENTFUL_PAINT => {
                Some(paint.start_time)
            }
            _ => None,
        });
        if let Some(start_time) = fcp {
            snapshot.fcp = start_time;
            self.seen = true;
        }
    }
}

/// Largest Contentful Paint: max start time, so arrival order is irrelevant.
#[derive(Debug, Default)]
pub struct LargestPaintHandler;

impl SignalHandler for LargestPaintHandler {
    fn handle(&mut self, entries: &[PerformanceEntry], snapshot: &mut MetricSnapshot) {
        for entry in entries {
            if let PerformanceEntry::LargestContentfulPaint(lcp) = entry {
                snapshot.lcp = snapshot.lcp.max(lcp.start_time);
            }
        }
    }
}

/// Total Blocking Time accumulated over every long task.
#[derive(Debug, Default)]
pub struct LongTaskHandler;

impl SignalHandler for LongTaskHandler {
    fn handle(&mut self, entries: &[PerformanceEntry], snapshot: &mut MetricSnapshot) {
        for entry in entries {
            if let PerformanceEntry::LongTask(task) = entry {
                snapshot.tbt += (task.duration - BLOCKING_THRESHOLD_MS).max(0.0);
            }
        }
    }
}

/// Navigation timings, taken from the first navigation record only.
#[derive(Debug, Default)]
pub struct NavigationHandler {
    captured: bool,
}

impl NavigationHandler {
    fn capture(nav: &NavigationTiming, snapshot: &mut MetricSnapshot) {
        snapshot.ttfb = nav.response_start - nav.start_time;
        snapshot.dcl = nav.dom_content_loaded_event_end - nav.start_time;
        snapshot.load = nav.load_event_end - nav.start_time;
        snapshot.tti = nav.dom_interactive - nav.start_time;
    }
}

impl SignalHandler for NavigationHandler {
    fn handle(&mut self, entries: &[PerformanceEntry], snapshot: &mut MetricSnapshot) {
        if self.captured {
            return;
        }
        let nav = entries.iter().find_map(|entry| match entry {
            PerformanceEntry::Navigation(nav) => Some(nav),
            _ => None,
        });
        if let Some(nav) = nav {
            Self::capture(nav, snapshot);
            self.captured = true;
        }
    }
}

/// Records slow, non-cached resource loads up to a fixed cap.
#[derive(Debug)]
pub struct ResourceHandler {
    max_records: usize,
}

impl ResourceHandler {
    pub fn new(max_records: usize) -> Self {
        Self { max_records }
    }

    fn is_recorded(resource: &ResourceEntry) -> bool {
        resource.transfer_size > 0 && resource.duration > SLOW_RESOURCE_MS
    }
}

impl SignalHandler for ResourceHandler {
    fn handle(&mut self, entries: &[PerformanceEntry], snapshot: &mut MetricSnapshot) {
        for entry in entries {
            let PerformanceEntry::Resource(resource) = entry else {
                continue;
            };
            snapshot.resource_count += 1;
            if !Self::is_recorded(resource) {
                continue;
            }
            if snapshot.resources.len() >= self.max_records {
                tracing::trace!(name = %resource.name, "Resource list full, skipping");
                continue;
            }
            snapshot.resources.push(ResourceTimingRecord::from(resource));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::entries::{LargestContentfulPaintEntry, LongTaskEntry, PaintEntry};

    fn paint(name: &str, start_time: f64) -> PerformanceEntry {
        PerformanceEntry::Paint(PaintEntry {
            name: name.to_string(),
            start_time,
        })
    }

    fn long_task(duration: f64) -> PerformanceEntry {
        PerformanceEntry::LongTask(LongTaskEntry {
            start_time: 0.0,
            duration,
        })
    }

    fn resource(name: &str, duration: f64, transfer_size: u64) -> PerformanceEntry {
        PerformanceEntry::Resource(ResourceEntry {
            name: name.to_string(),
            initiator_type: "script".to_string(),
            start_time: 10.0,
            duration,
            transfer_size,
            next_hop_protocol: "h2".to_string(),
        })
    }

    #[test]
    fn test_first_contentful_paint_only_once() {
        let mut handler = PaintHandler::default();
        let mut snapshot = MetricSnapshot::default();

        handler.handle(
            &[paint("first-paint", 80.0), paint(FIRST_CONTENTFUL_PAINT, 120.0)],
            &mut snapshot,
        );
        handler.handle(&[paint(FIRST_CONTENTFUL_PAINT, 400.0)], &mut snapshot);

        assert_eq!(snapshot.fcp, 120.0);
    }

    #[test]
    fn test_largest_paint_is_max_regardless_of_order() {
        let mut handler = LargestPaintHandler;
        let mut snapshot = MetricSnapshot::default();
        let lcp = |start_time| {
            PerformanceEntry::LargestContentfulPaint(LargestContentfulPaintEntry {
                start_time,
                size: 1.0,
            })
        };

        handler.handle(&[lcp(900.0), lcp(300.0)], &mut snapshot);
        handler.handle(&[lcp(600.0)], &mut snapshot);

        assert_eq!(snapshot.lcp, 900.0);
    }

    #[test]
    fn test_total_blocking_time() {
        let mut handler = LongTaskHandler;
        let mut snapshot = MetricSnapshot::default();

        handler.handle(&[long_task(80.0), long_task(30.0)], &mut snapshot);
        assert_eq!(snapshot.tbt, 30.0);

        handler.handle(&[long_task(150.0)], &mut snapshot);
        assert_eq!(snapshot.tbt, 130.0);
    }

    #[test]
    fn test_navigation_captured_once() {
        let mut handler = NavigationHandler::default();
        let mut snapshot = MetricSnapshot::default();
        let nav = NavigationTiming {
            start_time: 0.0,
            request_start: 20.0,
            response_start: 110.0,
            dom_interactive: 400.0,
            dom_content_loaded_event_end: 450.0,
            load_event_end: 900.0,
        };

        handler.handle(&[PerformanceEntry::Navigation(nav.clone())], &mut snapshot);
        handler.handle(
            &[PerformanceEntry::Navigation(NavigationTiming {
                load_event_end: 5000.0,
                ..nav
            })],
            &mut snapshot,
        );

        assert_eq!(snapshot.ttfb, 110.0);
        assert_eq!(snapshot.dcl, 450.0);
        assert_eq!(snapshot.load, 900.0);
        assert_eq!(snapshot.tti, 400.0);
    }

    #[test]
    fn test_resource_filter_and_cap() {
        let mut handler = ResourceHandler::new(2);
        let mut snapshot = MetricSnapshot::default();

        handler.handle(
            &[
                resource("cached.js", 300.0, 0),
                resource("fast.css", 100.0, 2048),
                resource("slow-1.js", 250.0, 4096),
                resource("slow-2.js", 101.0, 1),
                resource("slow-3.js", 500.0, 9000),
            ],
            &mut snapshot,
        );

        let names: Vec<_> = snapshot.resources.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["slow-1.js", "slow-2.js"]);
        assert_eq!(snapshot.resource_count, 5);
        assert_eq!(snapshot.resources[0].resource_type, "script");
        assert_eq!(snapshot.resources[0].protocol, "h2");
    }
}
