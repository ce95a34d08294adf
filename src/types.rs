use serde::{Deserialize, Serialize};

/// Identifier of a fixed ranging anchor (e.g. "A9CF").
pub type AnchorId = String;

/// A single range measurement reported by one anchor.
///
/// Produced externally (serial driver, log replay, simulation) and fed into
/// the aggregation stage. The wire format is one JSON object per line:
/// `{"anchor": "A9CF", "distance": 2.11}`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Reading {
    pub anchor: AnchorId,
    /// Measured range to the tag in meters. Non-negative.
    pub distance: f64,
}

/// One averaged reading per tracked anchor, in registry order.
///
/// Built by the aggregation stage once every anchor has a full batch, and
/// consumed immediately by the filter.
#[derive(Clone, Debug)]
pub struct AggregatedObservation {
    readings: Vec<Reading>,
}

impl AggregatedObservation {
    pub fn new(readings: Vec<Reading>) -> Self {
        AggregatedObservation { readings }
    }

    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}
