pub mod conv;
pub mod standard;
pub mod bottleneck;

pub use conv::{conv2d, BatchNormRelu, Projection};
pub use standard::StandardBlock;
pub use bottleneck::BottleneckBlock;
