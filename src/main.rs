use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use log::warn;
use tokio::sync::mpsc;

use uwb_locator::pipeline::{self, READING_CHANNEL_CAPACITY};
use uwb_locator::telemetry::CloudWriter;
use uwb_locator::{AnchorRegistry, FilterConfig, ParticleFilter, Reading, ReadingAggregator};

#[derive(Parser, Debug)]
#[command(name = "uwb_locator")]
#[command(about = "Particle-filter tag locator fed from a JSON-lines reading log", long_about = None)]
struct Args {
    /// Readings file, one JSON object per line: {"anchor": "A9CF", "distance": 2.11}
    #[arg(default_value = "readings.txt")]
    readings: PathBuf,

    /// Particle population size
    #[arg(long, default_value_t = 100)]
    num_samples: usize,

    /// Fraction of the population kept by weighted resampling, in (0, 1]
    #[arg(long, default_value_t = 0.9)]
    resample_fraction: f64,

    /// Range-sensor noise std-dev (meters)
    #[arg(long, default_value_t = 0.5)]
    sigma: f64,

    /// Resample diffusion noise std-dev (meters)
    #[arg(long, default_value_t = 0.1)]
    diffusion_sigma: f64,

    /// Uniform-prior x bound (meters)
    #[arg(long, default_value_t = 5.0)]
    x_bound: f64,

    /// Uniform-prior y bound (meters)
    #[arg(long, default_value_t = 5.0)]
    y_bound: f64,

    /// Raw readings averaged per anchor before each filter cycle
    #[arg(long, default_value_t = uwb_locator::aggregator::DEFAULT_BATCH_SIZE)]
    batch_size: usize,

    /// RNG seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,

    /// Output directory for particle cloud dumps
    #[arg(long, default_value = "locator_sessions")]
    output_dir: String,

    /// Persist the particle cloud of every iteration as JSON
    #[arg(long)]
    dump_clouds: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    println!("[{}] UWB locator starting", ts_now());
    println!("  Readings: {}", args.readings.display());
    println!("  Particles: {} (resample {:.2})", args.num_samples, args.resample_fraction);
    println!("  Sigma: {} / diffusion {}", args.sigma, args.diffusion_sigma);

    let registry = AnchorRegistry::reference_pair();
    let aggregator = ReadingAggregator::new(registry.clone(), args.batch_size)?;
    let filter = ParticleFilter::new(
        FilterConfig {
            num_samples: args.num_samples,
            resample_fraction: args.resample_fraction,
            measurement_sigma: args.sigma,
            diffusion_sigma: args.diffusion_sigma,
            x_bound: args.x_bound,
            y_bound: args.y_bound,
            seed: args.seed,
        },
        registry,
    )?;

    let writer = if args.dump_clouds {
        Some(CloudWriter::new(&args.output_dir)?)
    } else {
        None
    };

    let (reading_tx, reading_rx) = mpsc::channel(READING_CHANNEL_CAPACITY);
    let (mut snapshots, handle) = pipeline::spawn(aggregator, filter, reading_rx);

    let readings_path = args.readings.clone();
    let feeder = tokio::spawn(async move { feed_readings(readings_path, reading_tx).await });

    let mut estimates = 0u64;
    let mut last_estimate = None;
    while let Some(snapshot) = snapshots.recv().await {
        println!(
            "[{}] X: {:.3} Y: {:.3} (iteration {})",
            ts_now(),
            snapshot.estimated_x,
            snapshot.estimated_y,
            snapshot.iteration
        );
        if let Some(writer) = &writer {
            writer.write(&snapshot)?;
        }
        last_estimate = Some((snapshot.estimated_x, snapshot.estimated_y));
        estimates += 1;
    }

    feeder.await??;
    handle.join().await;

    println!("\n=== Final Stats ===");
    println!("Estimates produced: {estimates}");
    if let Some((x, y)) = last_estimate {
        println!("Final position: ({x:.3}, {y:.3})");
    }

    Ok(())
}

/// Replay a JSON-lines reading log into the pipeline. Malformed lines are
/// skipped; a full channel blocks the replay rather than dropping readings.
async fn feed_readings(path: PathBuf, tx: mpsc::Sender<Reading>) -> Result<()> {
    let file = File::open(&path).with_context(|| format!("opening {}", path.display()))?;
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let reading: Reading = match serde_json::from_str(&line) {
            Ok(reading) => reading,
            Err(err) => {
                warn!("skipping malformed reading line: {err}");
                continue;
            }
        };
        if tx.send(reading).await.is_err() {
            break;
        }
    }
    Ok(())
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}
