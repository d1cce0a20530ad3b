//! Cumulative Layout Shift
//!
//! Shifts are grouped into windows. A window starts with the first shift after
//! a gap of more than [`WINDOW_GAP_MS`] from the current window's first shift.
//! CLS is the largest window sum. Shifts caused by recent input never count.

use super::entries::{LayoutShiftEntry, PerformanceEntry};
use super::{MetricSnapshot, SignalHandler};

/// Maximum distance from a window's first shift that still joins the window
pub const WINDOW_GAP_MS: f64 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Shift {
    start_time: f64,
    value: f64,
}

/// Keeps every counted shift and recomputes the windows from scratch per batch.
#[derive(Debug, Default)]
pub struct LayoutShiftHandler {
    history: Vec<Shift>,
}

impl LayoutShiftHandler {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, entry: &LayoutShiftEntry) {
        if entry.had_recent_input {
            return;
        }
        self.history.push(Shift {
            start_time: entry.start_time,
            value: entry.value,
        });
    }

    /// Largest window sum over the whole history.
    fn max_window_value(&self) -> f64 {
        let mut best = 0.0_f64;
        let mut window_start: Option<f64> = None;
        let mut window_sum = 0.0;

        for shift in &self.history {
            match window_start {
                Some(start) if shift.start_time - start <= WINDOW_GAP_MS => {
                    window_sum += shift.value;
                }
                _ => {
                    window_start = Some(shift.start_time);
                    window_sum = shift.value;
                }
            }
            best = best.max(window_sum);
        }

        best
    }
}

impl SignalHandler for LayoutShiftHandler {
    fn handle(&mut self, entries: &[PerformanceEntry], snapshot: &mut MetricSnapshot) {
        let before = self.history.len();
        for entry in entries {
            if let PerformanceEntry::LayoutShift(shift) = entry {
                self.record(shift);
            }
        }
        if self.history.len() == before {
            return;
        }
        snapshot.cls = snapshot.cls.max(self.max_window_value());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shift(start_time: f64, value: f64, had_recent_input: bool) -> PerformanceEntry {
        PerformanceEntry::LayoutShift(LayoutShiftEntry {
            start_time,
            value,
            had_recent_input,
        })
    }

    #[test]
    fn test_windows_split_on_gap() {
        let mut handler = LayoutShiftHandler::new();
        let mut snapshot = MetricSnapshot::default();

        handler.handle(
            &[shift(0.0, 0.1, false), shift(500.0, 0.2, false)],
            &mut snapshot,
        );
        handler.handle(&[shift(2000.0, 0.05, false)], &mut snapshot);

        assert!((snapshot.cls - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_later_window_can_win() {
        let mut handler = LayoutShiftHandler::new();
        let mut snapshot = MetricSnapshot::default();

        handler.handle(
            &[
                shift(0.0, 0.1, false),
                shift(3000.0, 0.2, false),
                shift(3600.0, 0.25, false),
            ],
            &mut snapshot,
        );

        assert!((snapshot.cls - 0.45).abs() < 1e-9);
    }

    #[test]
    fn test_recent_input_is_excluded() {
        let mut handler = LayoutShiftHandler::new();
        let mut snapshot = MetricSnapshot::default();

        handler.handle(
            &[shift(0.0, 0.5, true), shift(100.0, 0.05, false)],
            &mut snapshot,
        );
        assert!((snapshot.cls - 0.05).abs() < 1e-9);

        handler.handle(&[shift(200.0, 0.9, true)], &mut snapshot);
        assert!((snapshot.cls - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_gap_is_measured_from_window_start() {
        let mut handler = LayoutShiftHandler::new();
        let mut snapshot = MetricSnapshot::default();

        // 900 ms steps stay under the gap between neighbours but the third
        // shift is 1800 ms past the window's first shift.
        handler.handle(
            &[
                shift(0.0, 0.1, false),
                shift(900.0, 0.1, false),
                shift(1800.0, 0.1, false),
            ],
            &mut snapshot,
        );

        assert!((snapshot.cls - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_cls_never_decreases() {
        let mut handler = LayoutShiftHandler::new();
        let mut snapshot = MetricSnapshot::default();

        handler.handle(&[shift(0.0, 0.4, false)], &mut snapshot);
        handler.handle(&[shift(5000.0, 0.01, false)], &mut snapshot);

        assert!((snapshot.cls - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_ignores_other_entries() {
        let mut handler = LayoutShiftHandler::new();
        let mut snapshot = MetricSnapshot::default();

        handler.handle(
            &[PerformanceEntry::LongTask(super::super::entries::LongTaskEntry {
                start_time: 0.0,
                duration: 500.0,
            })],
            &mut snapshot,
        );

        assert_eq!(snapshot.cls, 0.0);
    }
}
