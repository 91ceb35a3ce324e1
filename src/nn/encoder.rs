//! Convolutional frame-pair encoder.

use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::PaddingConfig2d;
use burn::prelude::*;
use burn::tensor::activation::relu;

use crate::config::ClassifierConfig;
use crate::error::Result;

/// Strided convolutional encoder over channel-concatenated frame pairs.
///
/// Each stage is a 3x3 convolution with stride 2 and padding 1 followed by
/// ReLU, halving the spatial resolution. The input has `2 * input_channels`
/// channels because the two frames of a pair arrive stacked on the channel
/// axis.
#[derive(Module, Debug)]
pub struct ConvEncoder<B: Backend> {
    convs: Vec<Conv2d<B>>,
    out_channels: usize,
}

impl<B: Backend> ConvEncoder<B> {
    /// Build the encoder from a classifier configuration.
    pub fn new(config: &ClassifierConfig, device: &B::Device) -> Result<Self> {
        config.validate()?;

        let mut convs = Vec::with_capacity(config.encoder_channels.len());
        let mut in_channels = 2 * config.input_channels;
        for &out_channels in &config.encoder_channels {
            let conv = Conv2dConfig::new([in_channels, out_channels], [3, 3])
                .with_stride([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device);
            convs.push(conv);
            in_channels = out_channels;
        }

        Ok(Self {
            convs,
            out_channels: in_channels,
        })
    }

    /// Encode a batch of pairs, `[n, 2C, H, W]` -> `[n, out, H', W']`.
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = input;
        for conv in &self.convs {
            x = relu(conv.forward(x));
        }
        x
    }

    /// Channel count of the final feature map.
    pub fn out_channels(&self) -> usize {
        self.out_channels
    }

    pub(crate) fn convs(&self) -> &[Conv2d<B>] {
        &self.convs
    }

    pub(crate) fn convs_mut(&mut self) -> &mut Vec<Conv2d<B>> {
        &mut self.convs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_encoder_output_shape() {
        let device = Default::default();
        let config = ClassifierConfig::new(5).with_encoder_channels(vec![8, 16]);
        let encoder = ConvEncoder::<TestBackend>::new(&config, &device).unwrap();

        let input = Tensor::zeros([2, 6, 16, 16], &device);
        let output = encoder.forward(input);

        // Two stride-2 stages: 16 -> 8 -> 4.
        assert_eq!(output.dims(), [2, 16, 4, 4]);
        assert_eq!(encoder.out_channels(), 16);
    }

    #[test]
    fn test_encoder_odd_spatial_size() {
        let device = Default::default();
        let config = ClassifierConfig::new(5).with_encoder_channels(vec![4]);
        let encoder = ConvEncoder::<TestBackend>::new(&config, &device).unwrap();

        let input = Tensor::zeros([1, 6, 7, 7], &device);
        let output = encoder.forward(input);
        assert_eq!(output.dims(), [1, 4, 4, 4]);
    }
}
