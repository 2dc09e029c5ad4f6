pub mod checkpoint;
pub mod config;
pub mod metrics;
pub mod trainer;

pub use checkpoint::{load_checkpoint, parameter_shapes, save_checkpoint, CheckpointError};
pub use config::TrainingConfig;
pub use metrics::{accuracy, EpochSummary, EvalReport};
pub use trainer::{NetworkMode, Prediction, Trainer};
