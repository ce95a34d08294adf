use log::warn;
use nalgebra::{distance, Point2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::anchors::AnchorRegistry;
use crate::error::{LocatorError, Result};
use crate::types::AggregatedObservation;

/// Filter construction parameters.
///
/// `measurement_sigma` models sensor noise in the likelihood; it is a
/// separate knob from `diffusion_sigma`, the std-dev of the positional
/// noise added to resampled particles. Defaults match the original tag
/// deployment this was tuned on.
#[derive(Clone, Debug)]
pub struct FilterConfig {
    /// Population size, fixed for the filter's lifetime.
    pub num_samples: usize,
    /// Fraction of the population drawn by weighted resampling, in (0, 1].
    /// The remainder is redrawn uniformly each cycle to keep diversity.
    pub resample_fraction: f64,
    /// Range-sensor noise std-dev used for likelihood scoring.
    pub measurement_sigma: f64,
    /// Std-dev of the noise fuzzing each resampled particle.
    pub diffusion_sigma: f64,
    /// Uniform-prior support: x in [0, x_bound), y in [0, y_bound).
    pub x_bound: f64,
    pub y_bound: f64,
    /// Fixed RNG seed for reproducible runs. `None` seeds from OS entropy.
    pub seed: Option<u64>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            num_samples: 100,
            resample_fraction: 0.9,
            measurement_sigma: 0.5,
            diffusion_sigma: 0.1,
            x_bound: 5.0,
            y_bound: 5.0,
            seed: None,
        }
    }
}

/// One hypothesized tag position with its likelihood weight.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Particle {
    pub x: f64,
    pub y: f64,
    pub weight: f64,
}

/// Read-only result of one filter cycle, safe to hand to uncoordinated
/// consumers: the particle list is an owned copy of the new population.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StepSnapshot {
    pub estimated_x: f64,
    pub estimated_y: f64,
    pub iteration: u64,
    pub particles: Vec<Particle>,
}

/// Particle filter over 2-D tag position, scored against per-anchor range
/// observations.
///
/// Each cycle is `calculate_weights` followed by `resample_and_fuzz`
/// (composed by [`step`](Self::step)): particles are scored with a Gaussian
/// range-noise model, a resampling wheel concentrates the population on
/// high-weight hypotheses, diffusion noise keeps hypotheses distinct, and a
/// slice of fresh uniform particles guards against collapse onto a wrong
/// mode. The population is replaced wholesale every cycle; retained
/// particles are never mutated in place.
pub struct ParticleFilter {
    config: FilterConfig,
    registry: AnchorRegistry,
    particles: Vec<Particle>,
    /// Largest weight from the most recent scoring pass only.
    max_weight: f64,
    num_resample: usize,
    diffusion: Normal<f64>,
    estimated_x: f64,
    estimated_y: f64,
    iteration: u64,
    rng: StdRng,
}

impl ParticleFilter {
    pub fn new(config: FilterConfig, registry: AnchorRegistry) -> Result<Self> {
        if registry.is_empty() {
            return Err(LocatorError::InvalidConfiguration(
                "registry must track at least one anchor".to_string(),
            ));
        }
        if config.num_samples == 0 {
            return Err(LocatorError::InvalidConfiguration(
                "num_samples must be positive".to_string(),
            ));
        }
        if !(config.resample_fraction > 0.0 && config.resample_fraction <= 1.0) {
            return Err(LocatorError::InvalidConfiguration(format!(
                "resample_fraction must be in (0, 1], got {}",
                config.resample_fraction
            )));
        }
        if !(config.measurement_sigma > 0.0) {
            return Err(LocatorError::InvalidConfiguration(
                "measurement_sigma must be positive".to_string(),
            ));
        }
        if !(config.diffusion_sigma > 0.0) {
            return Err(LocatorError::InvalidConfiguration(
                "diffusion_sigma must be positive".to_string(),
            ));
        }
        if !(config.x_bound > 0.0) || !(config.y_bound > 0.0) {
            return Err(LocatorError::InvalidConfiguration(
                "x_bound and y_bound must be positive".to_string(),
            ));
        }
        let num_resample = (config.num_samples as f64 * config.resample_fraction).floor() as usize;
        if num_resample == 0 {
            return Err(LocatorError::InvalidConfiguration(format!(
                "resample_fraction {} of {} particles rounds down to zero",
                config.resample_fraction, config.num_samples
            )));
        }
        let diffusion = Normal::new(0.0, config.diffusion_sigma).map_err(|_| {
            LocatorError::InvalidConfiguration("diffusion_sigma must be finite".to_string())
        })?;

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let particles = (0..config.num_samples)
            .map(|_| uniform_particle(&mut rng, config.x_bound, config.y_bound))
            .collect();

        Ok(ParticleFilter {
            registry,
            particles,
            max_weight: 0.0,
            num_resample,
            diffusion,
            estimated_x: 0.0,
            estimated_y: 0.0,
            iteration: 0,
            rng,
            config,
        })
    }

    /// Score every particle against one observation.
    ///
    /// Per particle: predicted range to each anchor, Gaussian likelihood of
    /// the observed mean range given that prediction, product across
    /// anchors. Likelihoods underflow to zero for particles far from the
    /// tag; that is what starves them out of the next resample.
    pub fn calculate_weights(&mut self, observation: &AggregatedObservation) -> Result<()> {
        let mut targets = Vec::with_capacity(observation.len());
        for reading in observation.readings() {
            targets.push((reading.distance, self.registry.lookup(&reading.anchor)?));
        }

        self.max_weight = 0.0;
        for particle in &mut self.particles {
            let position = Point2::new(particle.x, particle.y);
            let mut weight = 1.0;
            for (observed, anchor) in &targets {
                let predicted = distance(&position, anchor);
                weight *= gaussian_likelihood(*observed, predicted, self.config.measurement_sigma);
            }
            particle.weight = weight;
            if weight > self.max_weight {
                self.max_weight = weight;
            }
        }
        Ok(())
    }

    /// Replace the population with a resampled, fuzzed one and update the
    /// position estimate.
    ///
    /// Draws `floor(num_samples * resample_fraction)` particles with a
    /// resampling wheel (acceptance probability proportional to weight,
    /// exactly one accept per draw), displaces each by diffusion noise, and
    /// tops the population back up to `num_samples` with fresh uniform
    /// particles. The estimate is the mean of the resampled positions.
    pub fn resample_and_fuzz(&mut self) {
        let n = self.particles.len();
        let degenerate = !(self.max_weight > 0.0);
        if degenerate {
            // Every particle scored zero (or weights were never computed):
            // the wheel has nothing to steer by, so fall back to an
            // unweighted draw from the current population.
            warn!(
                "iteration {}: all particle weights are zero, resampling uniformly",
                self.iteration
            );
        }

        let mut next = Vec::with_capacity(n);
        let mut sum_x = 0.0;
        let mut sum_y = 0.0;
        for _ in 0..self.num_resample {
            let index = if degenerate {
                self.rng.gen_range(0..n)
            } else {
                self.spin_wheel()
            };
            let chosen = &self.particles[index];
            let x = chosen.x + self.diffusion.sample(&mut self.rng);
            let y = chosen.y + self.diffusion.sample(&mut self.rng);
            sum_x += x;
            sum_y += y;
            next.push(Particle { x, y, weight: 0.0 });
        }

        self.estimated_x = sum_x / self.num_resample as f64;
        self.estimated_y = sum_y / self.num_resample as f64;

        // Diversity top-up: same distribution as the seed population, so a
        // collapse onto the wrong mode can still recover.
        while next.len() < n {
            next.push(uniform_particle(
                &mut self.rng,
                self.config.x_bound,
                self.config.y_bound,
            ));
        }

        self.particles = next;
        self.iteration += 1;
    }

    /// One spin of the resampling wheel: returns the index of the accepted
    /// particle. Walks the list circularly from a random start, shedding
    /// weight from `beta` until a particle outweighs what remains.
    fn spin_wheel(&mut self) -> usize {
        let n = self.particles.len();
        let mut beta = self.rng.gen_range(0.0..2.0 * self.max_weight);
        let mut index = self.rng.gen_range(0..n);
        while self.particles[index].weight <= beta {
            beta -= self.particles[index].weight;
            index = (index + 1) % n;
        }
        index
    }

    /// One full filter cycle: score, resample, snapshot.
    pub fn step(&mut self, observation: &AggregatedObservation) -> Result<StepSnapshot> {
        self.calculate_weights(observation)?;
        self.resample_and_fuzz();
        Ok(self.snapshot())
    }

    /// Owned copy of the current state for external consumers.
    pub fn snapshot(&self) -> StepSnapshot {
        StepSnapshot {
            estimated_x: self.estimated_x,
            estimated_y: self.estimated_y,
            iteration: self.iteration,
            particles: self.particles.clone(),
        }
    }

    pub fn estimate(&self) -> (f64, f64) {
        (self.estimated_x, self.estimated_y)
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn iteration(&self) -> u64 {
        self.iteration
    }
}

fn uniform_particle(rng: &mut StdRng, x_bound: f64, y_bound: f64) -> Particle {
    Particle {
        x: rng.gen_range(0.0..x_bound),
        y: rng.gen_range(0.0..y_bound),
        weight: 0.0,
    }
}

/// Probability density of `observed` under `Normal(predicted, sigma)`.
fn gaussian_likelihood(observed: f64, predicted: f64, sigma: f64) -> f64 {
    let z = (observed - predicted) / sigma;
    (-0.5 * z * z).exp() / (sigma * (2.0 * std::f64::consts::PI).sqrt())
}
