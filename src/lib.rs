//! uwb_locator — particle-filter position estimation from UWB anchor ranges.
//!
//! The core is a two-stage pull pipeline: an aggregation stage that turns a
//! stream of raw per-anchor range readings into paired, averaged
//! observations, and an evaluation stage that scores a particle population
//! against each observation and resamples it into a fresh one, yielding a
//! 2-D position estimate per cycle.
//!
//! Everything in the library is independent of where readings come from and
//! where estimates go: ingestion (file replay, serial driver) and
//! visualization consume the channel ends. The binary in `main.rs` wires a
//! JSON-lines reading file to one end and stdout plus optional particle
//! cloud dumps to the other.

pub mod aggregator;
pub mod anchors;
pub mod error;
pub mod filters;
pub mod pipeline;
pub mod telemetry;
pub mod types;

pub use aggregator::ReadingAggregator;
pub use anchors::AnchorRegistry;
pub use error::LocatorError;
pub use filters::{FilterConfig, Particle, ParticleFilter, StepSnapshot};
pub use types::{AggregatedObservation, AnchorId, Reading};
