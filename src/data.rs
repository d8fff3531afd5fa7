use burn::{
    data::{
        dataloader::batcher::Batcher,
        dataset::{
            transform::PartialDataset,
            vision::{MnistDataset, MnistItem},
            Dataset,
        },
    },
    prelude::*,
    tensor::{
        module::interpolate,
        ops::{InterpolateMode, InterpolateOptions},
    },
};

/// Height and width of the MNIST images.
pub const MNIST_SIZE: usize = 28;

/// Normalization applied after scaling pixels to `[0, 1]`, mapping them to `[-1, 1]`.
const MEAN: f64 = 0.5;
const STD: f64 = 0.5;

#[derive(Clone, Debug)]
pub struct MnistBatcher<B: Backend> {
    device: B::Device,
    image_size: usize,
}

#[derive(Clone, Debug)]
pub struct MnistBatch<B: Backend> {
    /// Normalized images of shape `[batch_size, 1, image_size, image_size]`.
    pub images: Tensor<B, 4>,
}

impl<B: Backend> MnistBatcher<B> {
    pub fn new(device: B::Device, image_size: usize) -> Self {
        Self { device, image_size }
    }
}

impl<B: Backend> Batcher<MnistItem, MnistBatch<B>> for MnistBatcher<B> {
    fn batch(&self, items: Vec<MnistItem>) -> MnistBatch<B> {
        let images = items
            .iter()
            .map(|item| TensorData::from(item.image).convert::<B::FloatElem>())
            .map(|data| Tensor::<B, 2>::from_data(data, &self.device))
            .map(|tensor| tensor.reshape([1, 1, MNIST_SIZE, MNIST_SIZE]))
            .map(|tensor| tensor.div_scalar(255.0))
            .collect();

        let images = resize(Tensor::cat(images, 0), self.image_size);
        let images = images.sub_scalar(MEAN).div_scalar(STD);

        MnistBatch { images }
    }
}

/// Bilinear resize of `[N, C, H, W]` images to `[N, C, size, size]`.
fn resize<B: Backend>(images: Tensor<B, 4>, size: usize) -> Tensor<B, 4> {
    let [_, _, height, width] = images.dims();
    if height == size && width == size {
        return images;
    }

    interpolate(
        images,
        [size, size],
        InterpolateOptions::new(InterpolateMode::Bilinear),
    )
}

/// The MNIST training split, optionally truncated to its first `max_items` items.
///
/// The dataset is downloaded on first use.
pub fn mnist_train(max_items: Option<usize>) -> PartialDataset<MnistDataset, MnistItem> {
    let dataset = MnistDataset::train();
    let len = dataset.len();
    let end = max_items.map_or(len, |max| max.min(len));
    if max_items.is_some_and(|max| max > len) {
        log::warn!("max_items is larger than the {len} MNIST training images");
    }

    log::info!("Using {end} of {len} MNIST training images");
    PartialDataset::new(dataset, 0, end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TestBackend;

    fn item(value: f32) -> MnistItem {
        MnistItem {
            image: [[value; MNIST_SIZE]; MNIST_SIZE],
            label: 0,
        }
    }

    #[test]
    fn batch_shape_with_resize() {
        let batcher = MnistBatcher::<TestBackend>::new(Default::default(), 32);

        let batch = batcher.batch(vec![item(0.0), item(128.0), item(255.0)]);

        assert_eq!(batch.images.dims(), [3, 1, 32, 32]);
    }

    #[test]
    fn batch_shape_without_resize() {
        let batcher = MnistBatcher::<TestBackend>::new(Default::default(), MNIST_SIZE);

        let batch = batcher.batch(vec![item(0.0), item(255.0)]);

        assert_eq!(batch.images.dims(), [2, 1, MNIST_SIZE, MNIST_SIZE]);
    }

    #[test]
    fn batch_normalizes_to_unit_range() {
        let batcher = MnistBatcher::<TestBackend>::new(Default::default(), MNIST_SIZE);

        let batch = batcher.batch(vec![item(0.0), item(255.0)]);
        let [black, white] = [0, 1].map(|index| {
            batch
                .images
                .clone()
                .slice([index..index + 1])
                .mean()
                .into_scalar()
        });

        assert!((black + 1.0).abs() < 1e-6, "Expected -1, got {black}");
        assert!((white - 1.0).abs() < 1e-6, "Expected 1, got {white}");
    }

    #[test]
    fn resize_keeps_constant_images_constant() {
        let batcher = MnistBatcher::<TestBackend>::new(Default::default(), 32);

        let batch = batcher.batch(vec![item(255.0)]);

        let min = batch.images.clone().min().into_scalar();
        let max = batch.images.max().into_scalar();
        assert!((min - 1.0).abs() < 1e-5 && (max - 1.0).abs() < 1e-5);
    }
}
