pub mod codec;
pub mod config;
pub mod evaluator;
pub mod init;
pub mod nn;
pub mod objective;
pub mod swarm;
pub mod trainer;
pub mod velocity;

pub use codec::{LayerLayout, NetworkParams};
pub use config::TrainerConfig;
pub use objective::Objective;
pub use trainer::{TrainError, Trainer, TrainingSummary};
