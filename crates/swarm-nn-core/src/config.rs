use crate::codec::{CodecError, LayerLayout};
use crate::init::{InitStrategy, VelocityRange};
use crate::velocity::CoefficientSampling;
use rand::distr::uniform::{self, Uniform};
use serde::{Deserialize, Serialize};
use std::{error::Error, fmt};

/// Hyperparameters of one training run. Constant for the lifetime of a run.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrainerConfig {
    pub layer_sizes: Vec<usize>,
    pub n_iter: usize,
    pub pop_size: usize,
    /// Inertia `b`.
    pub inertia: f32,
    /// Personal-best coefficient `c1`.
    pub cognitive: f32,
    /// Global-best coefficient `c2`.
    pub social: f32,
    pub x_min: f32,
    pub x_max: f32,
    /// Gradient-descent correction rate. Zero gives plain PSO.
    pub gd_alpha: f32,
    pub cold_start: bool,
    pub init_strategy: InitStrategy,
    pub velocity_range: VelocityRange,
    pub coefficients: CoefficientSampling,
    pub verbose: bool,
    pub seed: u64,
    /// Size of a dedicated evaluation pool; `None` uses rayon's global pool.
    pub num_threads: Option<usize>,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            layer_sizes: vec![1, 5, 5, 5, 1],
            n_iter: 2000,
            pop_size: 30,
            inertia: 0.9,
            cognitive: 0.8,
            social: 0.5,
            x_min: -1.0,
            x_max: 1.0,
            gd_alpha: 0.0,
            cold_start: true,
            init_strategy: InitStrategy::default(),
            velocity_range: VelocityRange::default(),
            coefficients: CoefficientSampling::default(),
            verbose: false,
            seed: 42,
            num_threads: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    InvalidPopSize,
    InvalidIterations,
    InvalidBounds { x_min: f32, x_max: f32 },
    NonFiniteCoefficient { name: &'static str, value: f32 },
    Layout(CodecError),
    EmptyVelocityRange { low: f32, high: f32 },
    NonFiniteVelocityRange { low: f32, high: f32 },
    Sampling(uniform::Error),
    InvalidThreadCount,
    SwarmShape {
        expected: (usize, usize),
        actual: (usize, usize),
    },
    Parse(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPopSize => write!(f, "pop_size must be positive"),
            ConfigError::InvalidIterations => write!(f, "n_iter must be positive"),
            ConfigError::InvalidBounds { x_min, x_max } => {
                write!(f, "x_min ({x_min}) must be less than x_max ({x_max})")
            }
            ConfigError::NonFiniteCoefficient { name, value } => {
                write!(f, "{name} must be finite, got {value}")
            }
            ConfigError::Layout(e) => write!(f, "{e}"),
            ConfigError::EmptyVelocityRange { low, high } => write!(
                f,
                "initial velocity range [{low}, {high}) is empty; use cold_start or the symmetric range"
            ),
            ConfigError::NonFiniteVelocityRange { low, high } => write!(
                f,
                "initial velocity range [{low}, {high}) overflows; narrow x_min and x_max"
            ),
            ConfigError::Sampling(e) => write!(f, "cannot sample initial swarm: {e}"),
            ConfigError::InvalidThreadCount => write!(f, "num_threads must be positive"),
            ConfigError::SwarmShape { expected, actual } => write!(
                f,
                "initial swarm has shape {actual:?}, expected {expected:?}"
            ),
            ConfigError::Parse(msg) => write!(f, "invalid trainer config: {msg}"),
        }
    }
}

impl From<uniform::Error> for ConfigError {
    fn from(err: uniform::Error) -> Self {
        ConfigError::Sampling(err)
    }
}

impl From<CodecError> for ConfigError {
    fn from(err: CodecError) -> Self {
        ConfigError::Layout(err)
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfigError::Layout(e) => Some(e),
            ConfigError::Sampling(e) => Some(e),
            _ => None,
        }
    }
}

impl TrainerConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pop_size == 0 {
            return Err(ConfigError::InvalidPopSize);
        }
        if self.n_iter == 0 {
            return Err(ConfigError::InvalidIterations);
        }
        let coefficients = [
            ("inertia", self.inertia),
            ("cognitive", self.cognitive),
            ("social", self.social),
            ("x_min", self.x_min),
            ("x_max", self.x_max),
            ("gd_alpha", self.gd_alpha),
        ];
        for (name, value) in coefficients {
            if !value.is_finite() {
                return Err(ConfigError::NonFiniteCoefficient { name, value });
            }
        }
        if self.x_min >= self.x_max || !sampleable(self.x_min, self.x_max) {
            return Err(ConfigError::InvalidBounds {
                x_min: self.x_min,
                x_max: self.x_max,
            });
        }
        LayerLayout::new(&self.layer_sizes)?;
        if !self.cold_start {
            let (low, high) = self.velocity_range.bounds(self.x_min, self.x_max);
            if low >= high {
                return Err(ConfigError::EmptyVelocityRange { low, high });
            }
            if !sampleable(low, high) {
                return Err(ConfigError::NonFiniteVelocityRange { low, high });
            }
        }
        if self.num_threads == Some(0) {
            return Err(ConfigError::InvalidThreadCount);
        }
        Ok(())
    }

    /// "PSO" for plain swarm updates, "PSO-GD" when the gradient term is active.
    pub fn optimizer_name(&self) -> &'static str {
        if self.gd_alpha == 0.0 {
            "PSO"
        } else {
            "PSO-GD"
        }
    }
}

// Must accept exactly the ranges `init` can build a `Uniform` over.
fn sampleable(low: f32, high: f32) -> bool {
    Uniform::<f32>::new(low, high).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(TrainerConfig::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_empty_population_and_zero_iterations() {
        let config = TrainerConfig {
            pop_size: 0,
            ..TrainerConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidPopSize));

        let config = TrainerConfig {
            n_iter: 0,
            ..TrainerConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidIterations));
    }

    #[test]
    fn rejects_inverted_bounds() {
        let config = TrainerConfig {
            x_min: 1.0,
            x_max: 1.0,
            ..TrainerConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidBounds {
                x_min: 1.0,
                x_max: 1.0
            })
        );
    }

    #[test]
    fn rejects_bounds_whose_span_overflows() {
        let config = TrainerConfig {
            x_min: -3e38,
            x_max: 3e38,
            ..TrainerConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidBounds {
                x_min: -3e38,
                x_max: 3e38
            })
        );

        // Span fits, but the symmetric velocity range is twice as wide.
        let config = TrainerConfig {
            x_min: -1e38,
            x_max: 1e38,
            cold_start: false,
            ..TrainerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonFiniteVelocityRange { .. })
        ));
        let config = TrainerConfig {
            cold_start: true,
            ..config
        };
        assert_eq!(config.validate(), Ok(()));

        // Legacy lower bound -(x_max + x_min) overflows.
        let config = TrainerConfig {
            x_min: 2e38,
            x_max: 3e38,
            cold_start: false,
            velocity_range: VelocityRange::Legacy,
            ..TrainerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonFiniteVelocityRange { .. })
        ));
    }

    #[test]
    fn rejects_non_finite_coefficients() {
        let config = TrainerConfig {
            gd_alpha: f32::NAN,
            ..TrainerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NonFiniteCoefficient {
                name: "gd_alpha",
                ..
            })
        ));
    }

    #[test]
    fn legacy_velocity_range_needs_positive_upper_bound() {
        let config = TrainerConfig {
            cold_start: false,
            velocity_range: VelocityRange::Legacy,
            x_min: -2.0,
            x_max: -1.0,
            ..TrainerConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::EmptyVelocityRange {
                low: 3.0,
                high: 1.0
            })
        );

        // Cold start never samples velocities.
        let config = TrainerConfig {
            cold_start: true,
            ..config
        };
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn rejects_bad_layers_and_thread_count() {
        let config = TrainerConfig {
            layer_sizes: vec![4],
            ..TrainerConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::Layout(CodecError::InvalidLayerSizes))
        );

        let config = TrainerConfig {
            num_threads: Some(0),
            ..TrainerConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidThreadCount));
    }

    #[test]
    fn json_fills_missing_fields_with_defaults() {
        let config = TrainerConfig::from_json(
            r#"{"pop_size": 8, "gd_alpha": 0.0001, "init_strategy": "xavier"}"#,
        )
        .unwrap();
        assert_eq!(config.pop_size, 8);
        assert_eq!(config.init_strategy, InitStrategy::Xavier);
        assert_eq!(config.n_iter, TrainerConfig::default().n_iter);
        assert_eq!(config.optimizer_name(), "PSO-GD");

        assert!(matches!(
            TrainerConfig::from_json("{\"pop_size\": -1}"),
            Err(ConfigError::Parse(_))
        ));
    }
}
