use burn::nn::conv::Conv2d;
use burn::nn::{BatchNorm, BatchNormConfig};
use burn::prelude::*;
use burn::tensor::activation;

use crate::model::blocks::{conv2d, BatchNormRelu, Projection};

/// Post-activation residual block (ResNet v1): two 3x3 convolutions, the
/// shortcut is added before the final ReLU.
#[derive(Module, Debug)]
pub struct StandardBlock<B: Backend> {
    conv1: Conv2d<B>,
    bn_relu1: BatchNormRelu<B>,
    conv2: Conv2d<B>,
    bn2: BatchNorm<B>,
    projection: Option<Projection<B>>,
}

impl<B: Backend> StandardBlock<B> {
    pub fn new(
        device: &B::Device,
        in_channels: usize,
        out_channels: usize,
        stride: usize,
    ) -> Self {
        let projection = (stride != 1 || in_channels != out_channels)
            .then(|| Projection::new(device, in_channels, out_channels, stride, true));

        Self {
            conv1: conv2d(device, in_channels, out_channels, 3, stride),
            bn_relu1: BatchNormRelu::new(device, out_channels),
            conv2: conv2d(device, out_channels, out_channels, 3, 1),
            bn2: BatchNormConfig::new(out_channels).init(device),
            projection,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let shortcut = match &self.projection {
            Some(projection) => projection.forward(x.clone()),
            None => x.clone(),
        };

        let out = self.conv1.forward(x);
        let out = self.bn_relu1.forward(out);
        let out = self.conv2.forward(out);
        let out = self.bn2.forward(out);

        activation::relu(out + shortcut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    #[test]
    fn identity_block_keeps_shape() {
        let device = Default::default();
        let block = StandardBlock::<NdArray>::new(&device, 4, 4, 1);
        assert!(block.projection.is_none());
        let out = block.forward(Tensor::ones([1, 4, 8, 8], &device));
        assert_eq!(out.dims(), [1, 4, 8, 8]);
    }

    #[test]
    fn downsampling_block_projects_shortcut() {
        let device = Default::default();
        let block = StandardBlock::<NdArray>::new(&device, 4, 8, 2);
        assert!(block.projection.is_some());
        let out = block.forward(Tensor::ones([1, 4, 8, 8], &device));
        assert_eq!(out.dims(), [1, 8, 4, 4]);
    }
}
