/// Position estimation filters
///
/// Currently a single sequential Monte Carlo estimator over 2-D tag
/// position. The filter is a plain owned value: callers serialize update
/// cycles themselves (the pipeline runs it inside one task) and external
/// consumers only ever see owned snapshots.
pub mod particle;

pub use particle::{FilterConfig, Particle, ParticleFilter, StepSnapshot};
