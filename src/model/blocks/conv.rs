use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, PaddingConfig2d};
use burn::prelude::*;
use burn::tensor::activation;

/// Bias-free square convolution. 3x3 kernels are padded so that only the
/// stride changes the spatial size.
pub fn conv2d<B: Backend>(
    device: &B::Device,
    in_channels: usize,
    out_channels: usize,
    kernel_size: usize,
    stride: usize,
) -> Conv2d<B> {
    let padding = kernel_size / 2;

    Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
        .with_stride([stride, stride])
        .with_padding(PaddingConfig2d::Explicit(padding, padding))
        .with_bias(false)
        .init(device)
}

#[derive(Module, Debug)]
pub struct BatchNormRelu<B: Backend> {
    bn: BatchNorm<B>,
}

impl<B: Backend> BatchNormRelu<B> {
    pub fn new(device: &B::Device, channels: usize) -> Self {
        Self {
            bn: BatchNormConfig::new(channels).init(device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        activation::relu(self.bn.forward(x))
    }
}

/// 1x1 shortcut used when a residual block changes shape.
///
/// Post-activation blocks normalize the projected shortcut; pre-activation
/// blocks feed it the already normalized input and skip the extra norm.
#[derive(Module, Debug)]
pub struct Projection<B: Backend> {
    conv: Conv2d<B>,
    bn: Option<BatchNorm<B>>,
}

impl<B: Backend> Projection<B> {
    pub fn new(
        device: &B::Device,
        in_channels: usize,
        out_channels: usize,
        stride: usize,
        normalize: bool,
    ) -> Self {
        Self {
            conv: conv2d(device, in_channels, out_channels, 1, stride),
            bn: normalize.then(|| BatchNormConfig::new(out_channels).init(device)),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        match &self.bn {
            Some(bn) => bn.forward(x),
            None => x,
        }
    }
}
