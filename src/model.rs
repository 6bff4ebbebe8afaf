use crate::data::{HEIGHT, NUM_CLASSES, WIDTH};
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::{
    Dropout, DropoutConfig, Initializer, LeakyRelu, LeakyReluConfig, Linear, LinearConfig,
    PaddingConfig2d,
};
use burn::prelude::*;
use burn::tensor::activation::softmax;

/// Configuration for the [`Classifier`].
#[derive(Config, Debug)]
pub struct ClassifierConfig {
    #[config(default = "NUM_CLASSES")]
    pub num_classes: usize,

    /// Filters per convolution layer.
    #[config(default = 4)]
    pub conv_channels: usize,

    /// Width of the dense layer in between the flattened features and the class scores.
    #[config(default = 128)]
    pub hidden_size: usize,

    /// Probability of dropping a hidden activation while training.
    #[config(default = 0.5)]
    pub dropout: f64,

    /// Slope of the leaky ReLU for negative inputs.
    #[config(default = 0.2)]
    pub negative_slope: f64,
}

/// Small convolutional network for single-channel 28x28 images.
///
/// The learnable state is exactly four weight tensors (two convolution kernels
/// and two dense weight matrices); none of the layers carry a bias.
#[derive(Module, Debug)]
pub struct Classifier<B: Backend> {
    pub conv1: Conv2d<B>,
    pub conv2: Conv2d<B>,
    pub pool: MaxPool2d,
    pub activation: LeakyRelu,
    pub dropout: Dropout,
    pub fc1: Linear<B>,
    pub fc2: Linear<B>,
}

impl ClassifierConfig {
    /// Returns the initialized model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Classifier<B> {
        let initializer = Initializer::KaimingNormal {
            gain: 1.0,
            fan_out_only: false,
        };
        // one 2x2 pool halves the feature maps: 28x28 -> 14x14
        let features = self.conv_channels * (HEIGHT / 2) * (WIDTH / 2);

        Classifier {
            conv1: Conv2dConfig::new([1, self.conv_channels], [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .with_bias(false)
                .with_initializer(initializer.clone())
                .init(device),
            conv2: Conv2dConfig::new([self.conv_channels, self.conv_channels], [3, 3])
                .with_padding(PaddingConfig2d::Same)
                .with_bias(false)
                .with_initializer(initializer.clone())
                .init(device),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
            activation: LeakyReluConfig::new()
                .with_negative_slope(self.negative_slope)
                .init(),
            dropout: DropoutConfig::new(self.dropout).init(),
            fc1: LinearConfig::new(features, self.hidden_size)
                .with_bias(false)
                .with_initializer(initializer.clone())
                .init(device),
            fc2: LinearConfig::new(self.hidden_size, self.num_classes)
                .with_bias(false)
                .with_initializer(initializer)
                .init(device),
        }
    }
}

impl<B: Backend> Classifier<B> {
    /// Class probabilities for a batch of images. Each output row is a softmax
    /// distribution over the classes and sums to 1.
    ///
    /// # Shapes
    ///
    /// - images: `[batch_size, HEIGHT, WIDTH]`
    /// - output: `[batch_size, num_classes]`
    pub fn forward(&self, images: Tensor<B, 3>) -> Tensor<B, 2> {
        softmax(self.forward_logits(images), 1)
    }

    /// Raw class scores for a batch of images, before the softmax. This is the
    /// output to feed into the cross-entropy loss, which applies the
    /// log-softmax itself.
    ///
    /// # Shapes
    ///
    /// - images: `[batch_size, HEIGHT, WIDTH]`
    /// - output: `[batch_size, num_classes]`
    pub fn forward_logits(&self, images: Tensor<B, 3>) -> Tensor<B, 2> {
        let [batch_size, height, width] = images.dims();
        debug_assert_eq!([HEIGHT, WIDTH], [height, width]);

        // single channel in NCHW layout
        let x = images.reshape([batch_size, 1, height, width]);

        let x = self.activation.forward(self.conv1.forward(x));
        let x = self.activation.forward(self.conv2.forward(x));
        let x = self.pool.forward(x);

        let [_batch_size, channels, pooled_height, pooled_width] = x.dims();
        assert_eq!([HEIGHT / 2, WIDTH / 2], [pooled_height, pooled_width]);

        // flatten the feature maps, one row per example
        let x = x.reshape([batch_size, channels * pooled_height * pooled_width]);

        let x = self.activation.forward(self.fc1.forward(x));
        let x = self.dropout.forward(x);
        self.fc2.forward(x)
    }
}
