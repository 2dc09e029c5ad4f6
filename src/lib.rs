pub mod data;
pub mod model;
pub mod training;

// Re-exports for convenience
pub use data::{load_cifar10, train_valid_split, CifarSplit, CIFAR10_CLASSES};
pub use model::{ResNet, ResNetVersion};
pub use training::{CheckpointError, NetworkMode, Trainer, TrainingConfig};
