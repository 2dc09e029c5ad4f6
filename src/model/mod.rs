pub mod blocks;
pub mod resnet;

pub use resnet::{ResNet, ResNetRecord, ResNetVersion, StackLayer};
