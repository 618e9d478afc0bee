pub mod metrics;

pub use metrics::*;

use crate::codec::{CodecError, LayerLayout, NetworkParams};
use crate::config::{ConfigError, TrainerConfig};
use crate::evaluator::{EvaluationError, FitnessEvaluator};
use crate::init;
use crate::objective::Objective;
use crate::swarm::SwarmState;
use crate::velocity::{Coefficients, VelocityUpdateRule};
use log::{debug, info, warn};
use ndarray::{Array2, ArrayView2};
use rand::SeedableRng;
use rand_chacha::ChaCha12Rng;
use rayon::ThreadPoolBuildError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use std::{error::Error, fmt};

#[derive(Debug)]
pub enum TrainError {
    Config(ConfigError),
    ThreadPool(ThreadPoolBuildError),
    Evaluation(EvaluationError),
    Divergence { iteration: usize, particle: usize },
}

impl fmt::Display for TrainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainError::Config(e) => write!(f, "{e}"),
            TrainError::ThreadPool(e) => write!(f, "failed to build evaluation pool: {e}"),
            TrainError::Evaluation(e) => write!(f, "{e}"),
            TrainError::Divergence {
                iteration,
                particle,
            } => write!(
                f,
                "particle {particle} diverged to a non-finite position or velocity at iteration {iteration}"
            ),
        }
    }
}

impl From<ConfigError> for TrainError {
    fn from(err: ConfigError) -> Self {
        TrainError::Config(err)
    }
}

impl From<EvaluationError> for TrainError {
    fn from(err: EvaluationError) -> Self {
        TrainError::Evaluation(err)
    }
}

impl Error for TrainError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TrainError::Config(e) => Some(e),
            TrainError::ThreadPool(e) => Some(e),
            TrainError::Evaluation(e) => Some(e),
            TrainError::Divergence { .. } => None,
        }
    }
}

/// Drives the swarm for `n_iter` steps and records the mean loss of each one.
///
/// A step either completes fully or leaves the swarm and loss history untouched,
/// so the trainer stays inspectable after any error.
pub struct Trainer<O> {
    pub(crate) config: TrainerConfig,
    pub(crate) evaluator: FitnessEvaluator<O>,
    pub(crate) rule: VelocityUpdateRule,
    pub(crate) state: SwarmState,
    pub(crate) rng: ChaCha12Rng,
    pub(crate) loss_history: Vec<f32>,
    pub(crate) iteration: usize,
}

impl<O: Objective> Trainer<O> {
    /// Seeds the random source from `config.seed`.
    pub fn new(config: TrainerConfig, objective: O) -> Result<Self, TrainError> {
        let rng = ChaCha12Rng::seed_from_u64(config.seed);
        Self::with_rng(config, objective, rng)
    }

    /// Samples the initial swarm with `config.init_strategy` from an injected source.
    pub fn with_rng(
        config: TrainerConfig,
        objective: O,
        mut rng: ChaCha12Rng,
    ) -> Result<Self, TrainError> {
        config.validate()?;
        let layout = LayerLayout::new(&config.layer_sizes).map_err(ConfigError::from)?;
        let positions = init::build_swarm(
            config.pop_size,
            &layout,
            config.init_strategy,
            (config.x_min, config.x_max),
            &mut rng,
        )
        .map_err(ConfigError::from)?;
        Self::from_positions(config, objective, positions, rng)
    }

    /// Starts from explicit positions, one particle per row.
    pub fn from_positions(
        config: TrainerConfig,
        objective: O,
        positions: Array2<f32>,
        mut rng: ChaCha12Rng,
    ) -> Result<Self, TrainError> {
        config.validate()?;
        let layout = LayerLayout::new(&config.layer_sizes).map_err(ConfigError::from)?;
        let expected = (config.pop_size, layout.dimensions());
        if positions.dim() != expected {
            return Err(ConfigError::SwarmShape {
                expected,
                actual: positions.dim(),
            }
            .into());
        }

        objective.check_layout(&layout).map_err(ConfigError::from)?;

        let evaluator = FitnessEvaluator::new(objective, layout, config.num_threads)
            .map_err(TrainError::ThreadPool)?;
        let initial = evaluator.evaluate(positions.view())?;
        let velocities = init::initial_velocities(
            expected.0,
            expected.1,
            config.cold_start,
            config.velocity_range.bounds(config.x_min, config.x_max),
            &mut rng,
        )
        .map_err(ConfigError::from)?;
        let state = SwarmState::new(positions, velocities, initial);
        debug!(
            "{} initialized: pop_size={} dim={} best={:.6e}",
            config.optimizer_name(),
            state.pop_size(),
            state.dim(),
            state.global_best_fitness()
        );

        Ok(Self {
            rule: VelocityUpdateRule::from_config(&config),
            config,
            evaluator,
            state,
            rng,
            loss_history: Vec::new(),
            iteration: 0,
        })
    }

    pub fn name(&self) -> &'static str {
        self.config.optimizer_name()
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    pub fn layout(&self) -> &LayerLayout {
        self.evaluator.layout()
    }

    pub fn state(&self) -> &SwarmState {
        &self.state
    }

    /// Completed steps across all `train` calls.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    pub fn loss_history(&self) -> &[f32] {
        &self.loss_history
    }

    /// Current positions of every particle.
    pub fn get_swarm(&self) -> ArrayView2<'_, f32> {
        self.state.positions()
    }

    /// The global best decoded into per-layer weights and biases.
    pub fn get_best(&self) -> Result<NetworkParams, CodecError> {
        self.layout().decode(self.state.global_best())
    }

    /// Runs `n_iter` steps.
    pub fn train(&mut self) -> Result<(), TrainError> {
        self.run(None).map(|_| ())
    }

    /// Like `train`, but checks `stop` before every step. Returns the steps completed.
    pub fn train_interruptible(&mut self, stop: &AtomicBool) -> Result<usize, TrainError> {
        self.run(Some(stop))
    }

    fn run(&mut self, stop: Option<&AtomicBool>) -> Result<usize, TrainError> {
        let n_iter = self.config.n_iter;
        let report_every = progress_interval(n_iter);
        for i in 0..n_iter {
            if stop.is_some_and(|s| s.load(Ordering::Relaxed)) {
                info!("{} interrupted after {i} of {n_iter} steps", self.name());
                return Ok(i);
            }
            self.step()?;
            if self.config.verbose && i % report_every == 0 {
                self.report_progress(i as f32 / n_iter as f32 * 100.0);
            }
        }
        if self.config.verbose {
            self.report_progress(100.0);
        }
        Ok(n_iter)
    }

    /// One iteration with freshly drawn `r1`, `r2`.
    pub fn step(&mut self) -> Result<StepTimings, TrainError> {
        let coeffs = self.rule.sample(self.state.dim(), &mut self.rng);
        self.step_with(&coeffs)
    }

    /// One iteration with the given coefficients. Nothing is committed on error.
    pub fn step_with(&mut self, coeffs: &Coefficients) -> Result<StepTimings, TrainError> {
        let total_start = Instant::now();

        let t0 = Instant::now();
        let (velocities, positions) = self.rule.apply(&self.state.update_inputs(), coeffs);
        if let Some(particle) = first_non_finite_row(&velocities, &positions) {
            warn!(
                "{} diverged at iteration {}, particle {particle}",
                self.name(),
                self.iteration
            );
            return Err(TrainError::Divergence {
                iteration: self.iteration,
                particle,
            });
        }
        let update_us = t0.elapsed().as_micros() as u64;

        let t1 = Instant::now();
        let eval = self.evaluator.evaluate(positions.view()).map_err(|e| {
            warn!("{} aborted at iteration {}: {e}", self.name(), self.iteration);
            e
        })?;
        let evaluation_us = t1.elapsed().as_micros() as u64;

        let mean_loss = eval.mean_fitness();
        self.loss_history.push(mean_loss);
        self.state.advance(velocities, positions, eval);
        self.iteration += 1;
        debug!(
            "iteration {} mean_loss={mean_loss:.6e} best={:.6e}",
            self.iteration,
            self.state.global_best_fitness()
        );

        Ok(StepTimings {
            update_us,
            evaluation_us,
            total_us: total_start.elapsed().as_micros() as u64,
        })
    }

    fn report_progress(&self, percent: f32) {
        let loss = self.loss_history.last().copied().unwrap_or(f32::NAN);
        info!(
            "{} {percent:>5.1}% loss={loss:.6e} best={:.6e}",
            self.name(),
            self.state.global_best_fitness()
        );
    }
}

/// Steps between progress reports: at most ten reports per run.
fn progress_interval(n_iter: usize) -> usize {
    n_iter.div_ceil(10).max(1)
}

fn first_non_finite_row(velocities: &Array2<f32>, positions: &Array2<f32>) -> Option<usize> {
    velocities
        .outer_iter()
        .zip(positions.outer_iter())
        .position(|(v, x)| v.iter().chain(x.iter()).any(|a| !a.is_finite()))
}
