use crate::codec::LayerLayout;
use ndarray::{Array2, ArrayViewMut1};
use rand::distr::uniform::{self, Uniform};
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

/// How initial particle positions are sampled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitStrategy {
    /// Every parameter uniform over `[x_min, x_max)`.
    #[default]
    Uniform,
    /// Truncated normal weights (std `sqrt(2 / (fan_in + fan_out))`), zero biases.
    Xavier,
    /// Log-logistic magnitudes with a random sign, zero biases.
    LogLogistic,
}

/// Sampling range for initial velocities when not cold-starting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VelocityRange {
    /// `[-(x_max - x_min), x_max - x_min)`
    #[default]
    Symmetric,
    /// `[-(x_max + x_min), x_max - x_min)`
    Legacy,
}

impl VelocityRange {
    pub fn bounds(self, x_min: f32, x_max: f32) -> (f32, f32) {
        let span = x_max - x_min;
        match self {
            VelocityRange::Symmetric => (-span, span),
            VelocityRange::Legacy => (-(x_max + x_min), span),
        }
    }
}

const TRUNCATION_STDS: f32 = 2.0;
const LOG_LOGISTIC_SHAPE: f32 = 3.0;

/// Samples the initial `[pop_size, dim]` swarm, one network per row.
///
/// Fails only for the uniform strategy, when `bounds` is empty or too wide to sample.
pub fn build_swarm<R: Rng + ?Sized>(
    pop_size: usize,
    layout: &LayerLayout,
    strategy: InitStrategy,
    bounds: (f32, f32),
    rng: &mut R,
) -> Result<Array2<f32>, uniform::Error> {
    let mut swarm = Array2::zeros((pop_size, layout.dimensions()));
    match strategy {
        InitStrategy::Uniform => {
            let uniform = Uniform::<f32>::new(bounds.0, bounds.1)?;
            swarm.mapv_inplace(|_| rng.sample(&uniform));
        }
        InitStrategy::Xavier => {
            for row in swarm.outer_iter_mut() {
                fill_layers(row, layout, rng, truncated_normal);
            }
        }
        InitStrategy::LogLogistic => {
            for row in swarm.outer_iter_mut() {
                fill_layers(row, layout, rng, log_logistic);
            }
        }
    }
    Ok(swarm)
}

/// Zero on cold start, otherwise uniform over `range`.
pub fn initial_velocities<R: Rng + ?Sized>(
    pop_size: usize,
    dim: usize,
    cold_start: bool,
    range: (f32, f32),
    rng: &mut R,
) -> Result<Array2<f32>, uniform::Error> {
    if cold_start {
        return Ok(Array2::zeros((pop_size, dim)));
    }
    let uniform = Uniform::<f32>::new(range.0, range.1)?;
    Ok(Array2::from_shape_simple_fn((pop_size, dim), || rng.sample(&uniform)))
}

// Weights drawn per layer at scale sqrt(2 / (fan_in + fan_out)); biases stay zero.
fn fill_layers<R: Rng + ?Sized>(
    mut row: ArrayViewMut1<f32>,
    layout: &LayerLayout,
    rng: &mut R,
    sample: fn(&mut R, f32) -> f32,
) {
    let mut offset = 0;
    for (fan_in, fan_out) in layout.layer_shapes() {
        let scale = (2.0 / (fan_in + fan_out) as f32).sqrt();
        for k in 0..fan_in * fan_out {
            row[offset + k] = sample(rng, scale);
        }
        offset += fan_in * fan_out + fan_out;
    }
}

fn truncated_normal<R: Rng + ?Sized>(rng: &mut R, std: f32) -> f32 {
    loop {
        let z: f32 = rng.sample(StandardNormal);
        if z.abs() <= TRUNCATION_STDS {
            return z * std;
        }
    }
}

fn log_logistic<R: Rng + ?Sized>(rng: &mut R, scale: f32) -> f32 {
    let u: f32 = rng.random_range(f32::EPSILON..1.0 - f32::EPSILON);
    let magnitude = scale * (u / (1.0 - u)).powf(1.0 / LOG_LOGISTIC_SHAPE);
    if rng.random::<bool>() {
        magnitude
    } else {
        -magnitude
    }
}
