use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig},
        BatchNorm, BatchNormConfig, LeakyRelu, LeakyReluConfig, PaddingConfig2d,
    },
    prelude::*,
    tensor::{activation::tanh, Distribution},
};

use crate::error::GanError;

/// Number of stride-2 blocks between the 4x4 feature map and the last layer for an image size.
fn num_repeats(size: usize) -> usize {
    size.trailing_zeros() as usize - 3
}

fn assert_image_size(size: usize) {
    assert!(
        size.is_power_of_two() && size >= 16,
        "The image size must be a power of two greater or equal to 16, got {size}."
    );
}

/// Transposed convolution, batch norm and leaky relu.
#[derive(Module, Debug)]
pub struct GeneratorBlock<B: Backend> {
    conv: ConvTranspose2d<B>,
    norm: BatchNorm<B, 2>,
    activation: LeakyRelu,
}

impl<B: Backend> GeneratorBlock<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(input);
        let x = self.norm.forward(x);

        self.activation.forward(x)
    }
}

/// DCGAN generator: maps noise vectors to images in `[-1, 1]`.
#[derive(Module, Debug)]
pub struct Generator<B: Backend> {
    input: GeneratorBlock<B>,
    blocks: Vec<GeneratorBlock<B>>,
    output: ConvTranspose2d<B>,
    encoding_dims: usize,
}

impl<B: Backend> Generator<B> {
    /// # Shapes
    ///
    /// - noise: `[batch_size, encoding_dims]`
    /// - output: `[batch_size, out_channels, out_size, out_size]`
    pub fn forward(&self, noise: Tensor<B, 2>) -> Tensor<B, 4> {
        let [batch_size, encoding_dims] = noise.dims();

        let mut x = self
            .input
            .forward(noise.reshape([batch_size, encoding_dims, 1, 1]));
        for block in self.blocks.iter() {
            x = block.forward(x);
        }

        tanh(self.output.forward(x))
    }

    /// Standard normal noise for `batch_size` samples.
    pub fn sample_noise(&self, batch_size: usize, device: &B::Device) -> Tensor<B, 2> {
        Tensor::random(
            [batch_size, self.encoding_dims],
            Distribution::Normal(0.0, 1.0),
            device,
        )
    }

    pub fn encoding_dims(&self) -> usize {
        self.encoding_dims
    }
}

#[derive(Config, Debug)]
pub struct GeneratorConfig {
    /// Size of the noise vector.
    #[config(default = 100)]
    pub encoding_dims: usize,
    #[config(default = 1)]
    pub out_channels: usize,
    /// Channels of the layer before the output; doubled at each earlier layer.
    #[config(default = 32)]
    pub step_channels: usize,
    /// Height and width of the generated images. Must be a power of two, at least 16.
    #[config(default = 32)]
    pub out_size: usize,
    #[config(default = 0.2)]
    pub negative_slope: f64,
}

impl GeneratorConfig {
    /// Initializes a [Generator](Generator).
    ///
    /// # Panics
    ///
    /// Panics if `out_size` is not a power of two greater or equal to 16.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Generator<B> {
        assert_image_size(self.out_size);

        let mut channels = self.step_channels * 2usize.pow(num_repeats(self.out_size) as u32);
        let activation = LeakyReluConfig::new()
            .with_negative_slope(self.negative_slope)
            .init();

        let block = |channels_in: usize, channels_out: usize, stride: usize, padding: usize| {
            GeneratorBlock {
                conv: ConvTranspose2dConfig::new([channels_in, channels_out], [4, 4])
                    .with_stride([stride, stride])
                    .with_padding([padding, padding])
                    .with_bias(false)
                    .init(device),
                norm: BatchNormConfig::new(channels_out).init(device),
                activation: activation.clone(),
            }
        };

        let input = block(self.encoding_dims, channels, 1, 0);
        let mut blocks = Vec::with_capacity(num_repeats(self.out_size));
        for _ in 0..num_repeats(self.out_size) {
            blocks.push(block(channels, channels / 2, 2, 1));
            channels /= 2;
        }
        let output = ConvTranspose2dConfig::new([channels, self.out_channels], [4, 4])
            .with_stride([2, 2])
            .with_padding([1, 1])
            .init(device);

        Generator {
            input,
            blocks,
            output,
            encoding_dims: self.encoding_dims,
        }
    }
}

/// Convolution, batch norm and leaky relu.
#[derive(Module, Debug)]
pub struct DiscriminatorBlock<B: Backend> {
    conv: Conv2d<B>,
    norm: BatchNorm<B, 2>,
    activation: LeakyRelu,
}

impl<B: Backend> DiscriminatorBlock<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(input);
        let x = self.norm.forward(x);

        self.activation.forward(x)
    }
}

/// DCGAN discriminator: maps images to one raw logit per image.
#[derive(Module, Debug)]
pub struct Discriminator<B: Backend> {
    input: Conv2d<B>,
    input_activation: LeakyRelu,
    blocks: Vec<DiscriminatorBlock<B>>,
    output: Conv2d<B>,
    output_activation: Option<LeakyRelu>,
}

impl<B: Backend> Discriminator<B> {
    /// # Shapes
    ///
    /// - images: `[batch_size, in_channels, in_size, in_size]`
    /// - output: `[batch_size]`
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 1> {
        let [batch_size, _, _, _] = images.dims();

        let mut x = self.input_activation.forward(self.input.forward(images));
        for block in self.blocks.iter() {
            x = block.forward(x);
        }
        x = self.output.forward(x);
        if let Some(activation) = &self.output_activation {
            x = activation.forward(x);
        }

        x.reshape([batch_size])
    }
}

#[derive(Config, Debug)]
pub struct DiscriminatorConfig {
    #[config(default = 1)]
    pub in_channels: usize,
    /// Channels of the first layer; doubled at each following layer.
    #[config(default = 32)]
    pub step_channels: usize,
    /// Height and width of the input images. Must be a power of two, at least 16.
    #[config(default = 32)]
    pub in_size: usize,
    #[config(default = 0.2)]
    pub negative_slope: f64,
    /// Apply a leaky relu on the output logits.
    #[config(default = true)]
    pub last_nonlinearity: bool,
}

impl DiscriminatorConfig {
    /// Initializes a [Discriminator](Discriminator).
    ///
    /// # Panics
    ///
    /// Panics if `in_size` is not a power of two greater or equal to 16.
    pub fn init<B: Backend>(&self, device: &B::Device) -> Discriminator<B> {
        assert_image_size(self.in_size);

        let activation = LeakyReluConfig::new()
            .with_negative_slope(self.negative_slope)
            .init();
        let conv = |channels_in: usize, channels_out: usize, stride: usize, padding: usize| {
            Conv2dConfig::new([channels_in, channels_out], [4, 4])
                .with_stride([stride, stride])
                .with_padding(PaddingConfig2d::Explicit(padding, padding))
        };

        let mut channels = self.step_channels;
        let input = conv(self.in_channels, channels, 2, 1).init(device);
        let mut blocks = Vec::with_capacity(num_repeats(self.in_size));
        for _ in 0..num_repeats(self.in_size) {
            blocks.push(DiscriminatorBlock {
                conv: conv(channels, channels * 2, 2, 1)
                    .with_bias(false)
                    .init(device),
                norm: BatchNormConfig::new(channels * 2).init(device),
                activation: activation.clone(),
            });
            channels *= 2;
        }
        let output = conv(channels, 1, 1, 0).init(device);

        Discriminator {
            input,
            input_activation: activation.clone(),
            blocks,
            output,
            output_activation: self.last_nonlinearity.then_some(activation),
        }
    }
}

/// Generator and discriminator pair.
#[derive(Config, Debug)]
pub struct DcganConfig {
    #[config(default = "GeneratorConfig::new()")]
    pub generator: GeneratorConfig,
    #[config(default = "DiscriminatorConfig::new()")]
    pub discriminator: DiscriminatorConfig,
}

impl DcganConfig {
    /// Checks that the discriminator consumes what the generator produces.
    pub fn validate(&self) -> crate::Result<()> {
        if self.generator.out_size != self.discriminator.in_size {
            return Err(GanError::InvalidConfig(format!(
                "Generator output size {} does not match discriminator input size {}",
                self.generator.out_size, self.discriminator.in_size
            )));
        }
        if self.generator.out_channels != self.discriminator.in_channels {
            return Err(GanError::InvalidConfig(format!(
                "Generator output channels {} do not match discriminator input channels {}",
                self.generator.out_channels, self.discriminator.in_channels
            )));
        }
        for size in [self.generator.out_size, self.discriminator.in_size] {
            if !size.is_power_of_two() || size < 16 {
                return Err(GanError::InvalidConfig(format!(
                    "Image size {size} must be a power of two greater or equal to 16"
                )));
            }
        }

        Ok(())
    }

    pub fn image_size(&self) -> usize {
        self.generator.out_size
    }

    pub fn channels(&self) -> usize {
        self.generator.out_channels
    }

    /// Initializes the generator and the discriminator.
    pub fn init<B: Backend>(&self, device: &B::Device) -> (Generator<B>, Discriminator<B>) {
        (
            self.generator.init(device),
            self.discriminator.init(device),
        )
    }
}
