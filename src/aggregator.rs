use std::collections::VecDeque;

use log::{debug, warn};

use crate::anchors::AnchorRegistry;
use crate::error::{LocatorError, Result};
use crate::types::{AggregatedObservation, Reading};

/// Default number of raw readings averaged per anchor before emission.
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// Buffer cap as a multiple of the batch size. A fast anchor can get at most
/// this far ahead of a slow one before its oldest readings are shed.
const MAX_BUFFER_BATCHES: usize = 8;

/// Turns a stream of single-anchor range readings into paired, averaged
/// observations.
///
/// One ordered buffer per tracked anchor. Once every buffer holds at least a
/// full batch, the per-anchor means are emitted as one observation and all
/// buffers are cleared. Readings for anchors the registry does not track are
/// dropped (counted, not fatal): a misconfigured tag should not stall the
/// pipeline.
///
/// Buffers are capped at `MAX_BUFFER_BATCHES` batches with a drop-oldest
/// policy, so an anchor reporting much faster than its peer cannot grow
/// memory without bound while it waits for the slow one to fill up.
pub struct ReadingAggregator {
    registry: AnchorRegistry,
    batch_size: usize,
    max_buffer: usize,
    buffers: Vec<VecDeque<f64>>,
    dropped_unknown: u64,
    dropped_overflow: u64,
}

impl ReadingAggregator {
    pub fn new(registry: AnchorRegistry, batch_size: usize) -> Result<Self> {
        if registry.is_empty() {
            return Err(LocatorError::InvalidConfiguration(
                "registry must track at least one anchor".to_string(),
            ));
        }
        if batch_size == 0 {
            return Err(LocatorError::InvalidConfiguration(
                "batch_size must be at least 1".to_string(),
            ));
        }
        let buffers = (0..registry.len()).map(|_| VecDeque::new()).collect();
        Ok(ReadingAggregator {
            batch_size,
            max_buffer: batch_size * MAX_BUFFER_BATCHES,
            registry,
            buffers,
            dropped_unknown: 0,
            dropped_overflow: 0,
        })
    }

    /// Buffer one reading. Returns an observation once every tracked anchor
    /// has a full batch, `None` otherwise.
    pub fn ingest(&mut self, reading: Reading) -> Option<AggregatedObservation> {
        let index = match self.registry.ids().position(|id| id == reading.anchor) {
            Some(index) => index,
            None => {
                self.dropped_unknown += 1;
                debug!(
                    "dropping reading for untracked anchor {} ({} dropped so far)",
                    reading.anchor, self.dropped_unknown
                );
                return None;
            }
        };

        let buffer = &mut self.buffers[index];
        buffer.push_back(reading.distance);
        if buffer.len() > self.max_buffer {
            buffer.pop_front();
            self.dropped_overflow += 1;
            warn!(
                "anchor {} buffer full, shedding oldest reading",
                reading.anchor
            );
        }

        if self.buffers.iter().any(|b| b.len() < self.batch_size) {
            return None;
        }

        let readings = self
            .registry
            .ids()
            .zip(self.buffers.iter())
            .map(|(id, buffer)| Reading {
                anchor: id.to_string(),
                distance: buffer.iter().sum::<f64>() / buffer.len() as f64,
            })
            .collect();
        for buffer in &mut self.buffers {
            buffer.clear();
        }
        Some(AggregatedObservation::new(readings))
    }

    /// Readings dropped because their anchor id was not in the registry.
    pub fn dropped_unknown(&self) -> u64 {
        self.dropped_unknown
    }

    /// Readings shed from the front of an over-full buffer.
    pub fn dropped_overflow(&self) -> u64 {
        self.dropped_overflow
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn reading(anchor: &str, distance: f64) -> Reading {
        Reading {
            anchor: anchor.to_string(),
            distance,
        }
    }

    fn aggregator(batch_size: usize) -> ReadingAggregator {
        ReadingAggregator::new(AnchorRegistry::reference_pair(), batch_size).unwrap()
    }

    #[test]
    fn test_emits_means_once_both_batches_full() {
        let mut agg = aggregator(5);
        for i in 0..5 {
            assert!(agg.ingest(reading("A9CF", 2.0 + i as f64)).is_none());
        }
        for i in 0..4 {
            assert!(agg.ingest(reading("F95B", 1.0 + i as f64)).is_none());
        }
        let observation = agg.ingest(reading("F95B", 5.0)).expect("fifth pair");

        let readings = observation.readings();
        assert_eq!(readings.len(), 2);
        assert_eq!(readings[0].anchor, "A9CF");
        assert_abs_diff_eq!(readings[0].distance, 4.0, epsilon = 1e-12);
        assert_eq!(readings[1].anchor, "F95B");
        assert_abs_diff_eq!(readings[1].distance, 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_buffers_clear_after_emission() {
        let mut agg = aggregator(2);
        for _ in 0..2 {
            agg.ingest(reading("A9CF", 1.0));
            agg.ingest(reading("F95B", 1.0));
        }
        // Previous batch consumed; a fresh pair must fill up from scratch.
        assert!(agg.ingest(reading("A9CF", 9.0)).is_none());
        assert!(agg.ingest(reading("F95B", 9.0)).is_none());
        assert!(agg.ingest(reading("A9CF", 9.0)).is_none());
        assert!(agg.ingest(reading("F95B", 9.0)).is_some());
    }

    #[test]
    fn test_unknown_anchor_is_dropped() {
        let mut agg = aggregator(1);
        assert!(agg.ingest(reading("BEEF", 1.0)).is_none());
        assert_eq!(agg.dropped_unknown(), 1);
        // The drop did not touch any buffer: one reading per real anchor
        // still completes a batch-of-one observation.
        assert!(agg.ingest(reading("A9CF", 1.0)).is_none());
        assert!(agg.ingest(reading("F95B", 1.0)).is_some());
    }

    #[test]
    fn test_fast_anchor_sheds_oldest_reading() {
        let mut agg = aggregator(1);
        let cap = MAX_BUFFER_BATCHES;
        for i in 0..cap + 3 {
            agg.ingest(reading("A9CF", i as f64));
        }
        assert_eq!(agg.dropped_overflow(), 3);

        let observation = agg.ingest(reading("F95B", 0.0)).expect("pair complete");
        // Oldest three readings (0, 1, 2) were shed; mean covers 3..=cap+2.
        let expected = (3..cap + 3).sum::<usize>() as f64 / cap as f64;
        assert_abs_diff_eq!(observation.readings()[0].distance, expected, epsilon = 1e-12);
    }

    #[test]
    fn test_rejects_zero_batch_size() {
        assert!(ReadingAggregator::new(AnchorRegistry::reference_pair(), 0).is_err());
    }
}
