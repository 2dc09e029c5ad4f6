use burn::nn::conv::Conv2d;
use burn::prelude::*;

use crate::model::blocks::{conv2d, BatchNormRelu, Projection};

/// Pre-activation bottleneck block (ResNet v2).
///
/// 1x1 reduce -> 3x3 (carries the stride) -> 1x1 expand, with BN+ReLU in
/// front of every convolution. The inner width is a quarter of the output.
#[derive(Module, Debug)]
pub struct BottleneckBlock<B: Backend> {
    preact: BatchNormRelu<B>,
    conv1: Conv2d<B>,
    bn_relu2: BatchNormRelu<B>,
    conv2: Conv2d<B>,
    bn_relu3: BatchNormRelu<B>,
    conv3: Conv2d<B>,
    projection: Option<Projection<B>>,
}

impl<B: Backend> BottleneckBlock<B> {
    pub fn new(
        device: &B::Device,
        in_channels: usize,
        out_channels: usize,
        stride: usize,
    ) -> Self {
        let hidden = (out_channels / 4).max(1);
        let projection = (stride != 1 || in_channels != out_channels)
            .then(|| Projection::new(device, in_channels, out_channels, stride, false));

        Self {
            preact: BatchNormRelu::new(device, in_channels),
            conv1: conv2d(device, in_channels, hidden, 1, 1),
            bn_relu2: BatchNormRelu::new(device, hidden),
            conv2: conv2d(device, hidden, hidden, 3, stride),
            bn_relu3: BatchNormRelu::new(device, hidden),
            conv3: conv2d(device, hidden, out_channels, 1, 1),
            projection,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let pre = self.preact.forward(x.clone());

        // The projection sees the normalized input, the identity path the raw one.
        let shortcut = match &self.projection {
            Some(projection) => projection.forward(pre.clone()),
            None => x,
        };

        let out = self.conv1.forward(pre);
        let out = self.conv2.forward(self.bn_relu2.forward(out));
        let out = self.conv3.forward(self.bn_relu3.forward(out));

        out + shortcut
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    #[test]
    fn expands_channels_and_downsamples() {
        let device = Default::default();
        let block = BottleneckBlock::<NdArray>::new(&device, 4, 16, 2);
        let out = block.forward(Tensor::ones([2, 4, 8, 8], &device));
        assert_eq!(out.dims(), [2, 16, 4, 4]);
    }

    #[test]
    fn identity_when_shape_is_unchanged() {
        let device = Default::default();
        let block = BottleneckBlock::<NdArray>::new(&device, 16, 16, 1);
        assert!(block.projection.is_none());
        let out = block.forward(Tensor::zeros([1, 16, 4, 4], &device));
        assert_eq!(out.dims(), [1, 16, 4, 4]);
    }
}
