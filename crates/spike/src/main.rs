use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use ndarray::Array2;
use std::f32::consts::PI;
use std::path::PathBuf;
use std::time::Instant;
use swarm_nn_core::nn::{linspace_column, mean_squared_error, normalize, Mlp, MseObjective};
use swarm_nn_core::{Trainer, TrainerConfig};

/// Fits `cos(pi x) - x` with a small tanh network trained by the particle swarm.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON trainer config; missing fields take their defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    n_iter: Option<usize>,

    #[arg(long)]
    pop_size: Option<usize>,

    #[arg(long)]
    gd_alpha: Option<f32>,

    #[arg(long)]
    seed: Option<u64>,

    #[arg(long)]
    num_threads: Option<usize>,

    /// Evenly spaced training samples over `[x_min, x_max]`.
    #[arg(long, default_value_t = 512)]
    samples: usize,

    /// Write the training summary as JSON to this path.
    #[arg(long)]
    output: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    quiet: bool,
}

fn demo_config() -> TrainerConfig {
    TrainerConfig {
        layer_sizes: vec![1, 5, 5, 5, 1],
        pop_size: 100,
        gd_alpha: 1e-4,
        verbose: true,
        ..TrainerConfig::default()
    }
}

fn load_config(args: &Args) -> Result<TrainerConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            TrainerConfig::from_json(&json)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => demo_config(),
    };
    if let Some(n_iter) = args.n_iter {
        config.n_iter = n_iter;
    }
    if let Some(pop_size) = args.pop_size {
        config.pop_size = pop_size;
    }
    if let Some(gd_alpha) = args.gd_alpha {
        config.gd_alpha = gd_alpha;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if args.num_threads.is_some() {
        config.num_threads = args.num_threads;
    }
    if args.quiet {
        config.verbose = false;
    }
    config.validate()?;
    Ok(config)
}

/// Samples the target curve and maps inputs and targets onto `[-1, 1]`.
fn dataset(x_min: f32, x_max: f32, samples: usize) -> (Array2<f32>, Array2<f32>) {
    let x = linspace_column(x_min, x_max, samples);
    let y = x.mapv(|v| (PI * v).cos() - v);
    let y_min = y.fold(f32::INFINITY, |a, &b| a.min(b));
    let y_max = y.fold(f32::NEG_INFINITY, |a, &b| a.max(b));
    (normalize(&x, x_min, x_max), normalize(&y, y_min, y_max))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    anyhow::ensure!(args.samples >= 2, "--samples must be at least 2");

    let config = load_config(&args)?;
    let (inputs, targets) = dataset(config.x_min, config.x_max, args.samples);
    let objective = MseObjective::new(inputs.clone(), targets.clone())?;

    let mut trainer = Trainer::new(config, objective)?;
    info!(
        "{} training: layers={:?} pop_size={} n_iter={}",
        trainer.name(),
        trainer.config().layer_sizes,
        trainer.config().pop_size,
        trainer.config().n_iter
    );

    let start = Instant::now();
    trainer.train()?;
    let elapsed = start.elapsed();

    let best = trainer.get_best()?;
    let pred = Mlp.forward(&best, inputs.view());
    let l2 = mean_squared_error(pred.view(), targets.view());
    println!("Time elapsed: {:.3}s", elapsed.as_secs_f64());
    println!("L2 error: {l2:.6e}");

    if let Some(path) = &args.output {
        let json = serde_json::to_string_pretty(&trainer.summary())?;
        std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        info!("summary written to {}", path.display());
    }
    Ok(())
}
