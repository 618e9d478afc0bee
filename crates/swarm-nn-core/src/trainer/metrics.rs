use super::Trainer;
use crate::objective::Objective;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StepTimings {
    pub update_us: u64,
    pub evaluation_us: u64,
    pub total_us: u64,
}

fn default_schema_version() -> u32 {
    1
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrainingSummary {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub optimizer: String,
    pub iterations: usize,
    pub pop_size: usize,
    pub dim: usize,
    pub layer_sizes: Vec<usize>,
    pub loss_history: Vec<f32>,
    pub best_fitness: f32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub best_position: Vec<f32>,
}

impl<O: Objective> Trainer<O> {
    pub fn summary(&self) -> TrainingSummary {
        TrainingSummary {
            schema_version: default_schema_version(),
            optimizer: self.name().to_string(),
            iterations: self.iteration,
            pop_size: self.state.pop_size(),
            dim: self.state.dim(),
            layer_sizes: self.config.layer_sizes.clone(),
            loss_history: self.loss_history.clone(),
            best_fitness: self.state.global_best_fitness(),
            best_position: self.state.global_best().to_vec(),
        }
    }
}
