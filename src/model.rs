use burn::{
    module::Param,
    nn::{
        Linear, LinearConfig, PaddingConfig2d, Relu,
        conv::{Conv2d, Conv2dConfig},
        pool::{AvgPool2d, AvgPool2dConfig},
    },
    prelude::*,
};

/// Input geometry of the squashable segment, NCHW without the batch axis:
/// the 5-channel 13x13 activation produced by the first convolution.
pub const SEGMENT_INPUT: [usize; 3] = [5, 13, 13];

/// Flattened segment input dimension (channel-major order).
pub const SEGMENT_INPUT_DIM: usize = SEGMENT_INPUT[0] * SEGMENT_INPUT[1] * SEGMENT_INPUT[2];

/// Segment output dimension, the width of the first fully-connected layer.
pub const SEGMENT_OUTPUT_DIM: usize = 100;

/// Weight shapes as persisted to text files.
pub const CONV1_SHAPE: [usize; 4] = [5, 1, 5, 5];
pub const CONV2_SHAPE: [usize; 4] = [50, 5, 5, 5];
pub const FC1_SHAPE: [usize; 2] = [1250, 100];
pub const FC2_SHAPE: [usize; 2] = [100, 10];

#[derive(Config, Debug)]
pub struct CryptonetsConfig {
    #[config(default = 10)]
    pub num_classes: usize,
}

/// The Cryptonets MNIST network: a strided convolution, a relu, the purely
/// linear middle segment, another relu and the classification head.
///
/// No layer carries a bias; the trained weight matrices are the only
/// parameters, matching the text files the downstream consumer reads.
#[derive(Module, Debug)]
pub struct Cryptonets<B: Backend> {
    pub conv1: Conv2d<B>,
    pub segment: LinearSegment<B>,
    pub fc2: Linear<B>,
    pub activation: Relu,
}

/// The middle of the network between the two activations:
/// avg-pool -> conv -> avg-pool -> flatten -> fully-connected.
///
/// Every stage is linear, so the whole segment is equivalent to a single
/// matrix multiply. That equivalence is what [`crate::squash`] extracts;
/// inserting any nonlinearity here would break it.
#[derive(Module, Debug)]
pub struct LinearSegment<B: Backend> {
    pub pool1: AvgPool2d,
    pub conv2: Conv2d<B>,
    pub pool2: AvgPool2d,
    pub fc1: Linear<B>,
}

impl CryptonetsConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Cryptonets<B> {
        Cryptonets {
            // 28x28 -> 13x13 with symmetric padding at stride 2.
            conv1: Conv2dConfig::new([1, 5], [5, 5])
                .with_stride([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .with_bias(false)
                .init(device),
            segment: LinearSegment::new(device),
            fc2: LinearConfig::new(FC2_SHAPE[0], FC2_SHAPE[1])
                .with_bias(false)
                .init(device),
            activation: Relu::new(),
        }
    }
}

impl<B: Backend> Cryptonets<B> {
    /// # Shapes
    ///
    /// - images: `[batch_size, 1, 28, 28]`
    /// - output: `[batch_size, num_classes]`
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.conv1.forward(images);
        let x = self.activation.forward(x);
        let x = self.segment.forward(x);
        let x = self.activation.forward(x);
        self.fc2.forward(x)
    }
}

/// Size-preserving 3x3 average pooling.
fn avg_pool_same_size() -> AvgPool2d {
    AvgPool2dConfig::new([3, 3])
        .with_strides([1, 1])
        .with_padding(PaddingConfig2d::Explicit(1, 1))
        .init()
}

impl<B: Backend> LinearSegment<B> {
    pub fn new(device: &B::Device) -> Self {
        Self {
            pool1: avg_pool_same_size(),
            // 13x13 -> 5x5, valid padding at stride 2.
            conv2: Conv2dConfig::new([5, 50], [5, 5])
                .with_stride([2, 2])
                .with_padding(PaddingConfig2d::Valid)
                .with_bias(false)
                .init(device),
            pool2: avg_pool_same_size(),
            fc1: LinearConfig::new(FC1_SHAPE[0], FC1_SHAPE[1])
                .with_bias(false)
                .init(device),
        }
    }

    /// Assemble the segment from previously exported weight tensors.
    pub fn from_weights(conv2_weight: Tensor<B, 4>, fc1_weight: Tensor<B, 2>) -> Self {
        let device = conv2_weight.device();
        let mut segment = Self::new(&device);
        segment.conv2.weight = Param::from_tensor(conv2_weight);
        segment.fc1.weight = Param::from_tensor(fc1_weight);
        segment
    }

    /// # Shapes
    ///
    /// - input: `[batch_size, 5, 13, 13]`
    /// - output: `[batch_size, 100]`
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.pool1.forward(input);
        let x = self.conv2.forward(x);
        let x = self.pool2.forward(x);
        let x = x.flatten(1, 3);
        self.fc1.forward(x)
    }

    /// Forward pass over flattened inputs `[batch_size, 845]`, the layout the
    /// squashed matrix multiplies against.
    pub fn forward_flat(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let [batch_size, _] = input.dims();
        let [channels, height, width] = SEGMENT_INPUT;
        self.forward(input.reshape([batch_size, channels, height, width]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    type TestBackend = NdArray;

    #[test]
    fn forward_produces_logits() {
        let device = Default::default();
        let model = CryptonetsConfig::new().init::<TestBackend>(&device);
        let images = Tensor::random([2, 1, 28, 28], Distribution::Default, &device);

        assert_eq!(model.forward(images).dims(), [2, 10]);
    }

    #[test]
    fn segment_shapes() {
        let device = Default::default();
        let segment = LinearSegment::<TestBackend>::new(&device);

        let spatial = Tensor::random([3, 5, 13, 13], Distribution::Default, &device);
        assert_eq!(segment.forward(spatial).dims(), [3, SEGMENT_OUTPUT_DIM]);

        let flat = Tensor::random([3, SEGMENT_INPUT_DIM], Distribution::Default, &device);
        assert_eq!(segment.forward_flat(flat).dims(), [3, SEGMENT_OUTPUT_DIM]);
    }

    #[test]
    fn from_weights_replaces_parameters() {
        let device = Default::default();
        let conv2 = Tensor::<TestBackend, 4>::ones(CONV2_SHAPE, &device);
        let fc1 = Tensor::<TestBackend, 2>::ones(FC1_SHAPE, &device);

        let segment = LinearSegment::from_weights(conv2.clone(), fc1.clone());

        segment
            .conv2
            .weight
            .val()
            .into_data()
            .assert_eq(&conv2.into_data(), true);
        segment
            .fc1
            .weight
            .val()
            .into_data()
            .assert_eq(&fc1.into_data(), true);
    }
}
