use anyhow::{bail, Result};
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig};
use burn::nn::conv::Conv2d;
use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;

use super::blocks::{conv2d, BatchNormRelu, BottleneckBlock, StandardBlock};

/// Number of stacks; each halves the spatial size except the first.
const NUM_STACKS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResNetVersion {
    /// Post-activation standard blocks.
    V1,
    /// Pre-activation bottleneck blocks.
    V2,
}

impl ResNetVersion {
    pub fn number(self) -> usize {
        match self {
            ResNetVersion::V1 => 1,
            ResNetVersion::V2 => 2,
        }
    }
}

impl TryFrom<usize> for ResNetVersion {
    type Error = anyhow::Error;

    fn try_from(value: usize) -> Result<Self> {
        match value {
            1 => Ok(ResNetVersion::V1),
            2 => Ok(ResNetVersion::V2),
            other => bail!("Unknown resnet version {other}. Use 1 or 2"),
        }
    }
}

/// One stage of residual blocks. Only the list matching the network
/// version is populated.
#[derive(Module, Debug)]
pub struct StackLayer<B: Backend> {
    standard: Vec<StandardBlock<B>>,
    bottleneck: Vec<BottleneckBlock<B>>,
}

impl<B: Backend> StackLayer<B> {
    fn new(
        device: &B::Device,
        version: ResNetVersion,
        num_blocks: usize,
        in_channels: usize,
        out_channels: usize,
        stride: usize,
    ) -> Self {
        let mut standard = Vec::new();
        let mut bottleneck = Vec::new();

        for i in 0..num_blocks {
            let (in_ch, s) = if i == 0 {
                (in_channels, stride)
            } else {
                (out_channels, 1)
            };
            match version {
                ResNetVersion::V1 => {
                    standard.push(StandardBlock::new(device, in_ch, out_channels, s))
                }
                ResNetVersion::V2 => {
                    bottleneck.push(BottleneckBlock::new(device, in_ch, out_channels, s))
                }
            }
        }

        Self {
            standard,
            bottleneck,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.standard.iter().fold(x, |x, block| block.forward(x));
        self.bottleneck.iter().fold(x, |x, block| block.forward(x))
    }
}

/// CIFAR ResNet: 3x3 stem, three residual stacks (strides 1, 2, 2), global
/// average pooling and a fully connected classifier.
#[derive(Module, Debug)]
pub struct ResNet<B: Backend> {
    start: Conv2d<B>,
    start_bn_relu: Option<BatchNormRelu<B>>,
    stacks: Vec<StackLayer<B>>,
    output_bn_relu: Option<BatchNormRelu<B>>,
    pool: AdaptiveAvgPool2d,
    fc: Linear<B>,
}

impl<B: Backend> ResNet<B> {
    /// `size` is the number of blocks per stack. v2 stacks are four times
    /// wider than v1 because of the bottleneck expansion.
    pub fn new(
        device: &B::Device,
        version: ResNetVersion,
        size: usize,
        num_classes: usize,
        first_num_filters: usize,
    ) -> Self {
        let base = match version {
            ResNetVersion::V1 => first_num_filters,
            ResNetVersion::V2 => first_num_filters * 4,
        };

        let mut stacks = Vec::with_capacity(NUM_STACKS);
        let mut in_channels = first_num_filters;
        for i in 0..NUM_STACKS {
            let out_channels = base << i;
            let stride = if i == 0 { 1 } else { 2 };
            stacks.push(StackLayer::new(
                device,
                version,
                size,
                in_channels,
                out_channels,
                stride,
            ));
            in_channels = out_channels;
        }

        let (start_bn_relu, output_bn_relu) = match version {
            ResNetVersion::V1 => (Some(BatchNormRelu::new(device, first_num_filters)), None),
            ResNetVersion::V2 => (None, Some(BatchNormRelu::new(device, in_channels))),
        };

        Self {
            start: conv2d(device, 3, first_num_filters, 3, 1),
            start_bn_relu,
            stacks,
            output_bn_relu,
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc: LinearConfig::new(in_channels, num_classes).init(device),
        }
    }

    /// `[batch, 3, 32, 32]` images to `[batch, num_classes]` scores.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = self.start.forward(images);
        if let Some(bn_relu) = &self.start_bn_relu {
            x = bn_relu.forward(x);
        }

        for stack in &self.stacks {
            x = stack.forward(x);
        }

        if let Some(bn_relu) = &self.output_bn_relu {
            x = bn_relu.forward(x);
        }

        let x = self.pool.forward(x);
        let [batch, channels, _, _] = x.dims();
        self.fc.forward(x.reshape([batch, channels]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn version_from_number() {
        assert_eq!(ResNetVersion::try_from(1).unwrap(), ResNetVersion::V1);
        assert_eq!(ResNetVersion::try_from(2).unwrap(), ResNetVersion::V2);
        assert!(ResNetVersion::try_from(3).is_err());
        assert_eq!(ResNetVersion::V2.number(), 2);
        assert_eq!(ResNetVersion::try_from(1).unwrap().number(), 1);
    }

    #[test]
    fn v1_forward_produces_class_scores() {
        let device = Default::default();
        let model = ResNet::<TestBackend>::new(&device, ResNetVersion::V1, 1, 10, 4);
        let scores = model.forward(Tensor::zeros([2, 3, 32, 32], &device));
        assert_eq!(scores.dims(), [2, 10]);
    }

    #[test]
    fn v2_forward_produces_class_scores() {
        let device = Default::default();
        let model = ResNet::<TestBackend>::new(&device, ResNetVersion::V2, 1, 7, 2);
        let scores = model.forward(Tensor::ones([3, 3, 32, 32], &device));
        assert_eq!(scores.dims(), [3, 7]);
    }

    #[test]
    fn deeper_networks_have_more_parameters() {
        let device = Default::default();
        let small = ResNet::<TestBackend>::new(&device, ResNetVersion::V1, 1, 10, 4);
        let large = ResNet::<TestBackend>::new(&device, ResNetVersion::V1, 2, 10, 4);
        assert!(large.num_params() > small.num_params());
    }
}
