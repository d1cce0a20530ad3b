//! Interaction to Next Paint

use super::entries::PerformanceEntry;
use super::{MetricSnapshot, SignalHandler};

/// Percentile of the duration history reported as INP
pub const INP_PERCENTILE: f64 = 0.75;

/// Keeps every interaction duration; the host only forwards interactions at or
/// above the subscription's duration threshold.
#[derive(Debug, Default)]
pub struct InteractionHandler {
    durations: Vec<f64>,
}

impl InteractionHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value at index `floor(n * 0.75)` of the ascending history.
    fn estimate(&self) -> Option<f64> {
        if self.durations.is_empty() {
            return None;
        }
        let mut sorted = self.durations.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let index = ((sorted.len() as f64) * INP_PERCENTILE).floor() as usize;
        sorted.get(index.min(sorted.len() - 1)).copied()
    }
}

impl SignalHandler for InteractionHandler {
    fn handle(&mut self, entries: &[PerformanceEntry], snapshot: &mut MetricSnapshot) {
        let mut observed: u64 = 0;
        for entry in entries {
            if let PerformanceEntry::Event(event) = entry {
                self.durations.push(event.duration);
                observed += 1;
            }
        }
        if observed == 0 {
            return;
        }
        snapshot.interaction_count += observed;
        if let Some(inp) = self.estimate() {
            snapshot.inp = inp;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::entries::EventTimingEntry;

    fn interaction(duration: f64) -> PerformanceEntry {
        PerformanceEntry::Event(EventTimingEntry {
            name: "click".to_string(),
            start_time: 0.0,
            duration,
            interaction_id: Some(1),
        })
    }

    #[test]
    fn test_seventy_fifth_percentile() {
        let mut handler = InteractionHandler::new();
        let mut snapshot = MetricSnapshot::default();

        handler.handle(
            &[
                interaction(10.0),
                interaction(50.0),
                interaction(100.0),
                interaction(40.0),
            ],
            &mut snapshot,
        );

        assert_eq!(snapshot.inp, 100.0);
        assert_eq!(snapshot.interaction_count, 4);
    }

    #[test]
    fn test_recomputed_over_full_history() {
        let mut handler = InteractionHandler::new();
        let mut snapshot = MetricSnapshot::default();

        handler.handle(&[interaction(200.0)], &mut snapshot);
        assert_eq!(snapshot.inp, 200.0);

        // [16, 24, 32, 200]: index 3
        handler.handle(
            &[interaction(16.0), interaction(24.0), interaction(32.0)],
            &mut snapshot,
        );
        assert_eq!(snapshot.inp, 200.0);

        // [16, 24, 24, 24, 32, 200]: index 4
        handler.handle(&[interaction(24.0), interaction(24.0)], &mut snapshot);
        assert_eq!(snapshot.inp, 32.0);
        assert_eq!(snapshot.interaction_count, 6);
    }

    #[test]
    fn test_empty_batch_keeps_value() {
        let mut handler = InteractionHandler::new();
        let mut snapshot = MetricSnapshot::default();

        handler.handle(&[], &mut snapshot);
        assert_eq!(snapshot.inp, 0.0);
        assert_eq!(snapshot.interaction_count, 0);
    }
}
