use burn::prelude::*;
use image::{GrayImage, RgbImage};
use std::fs;
use std::path::Path;

use crate::error::{GanError, Result};

/// Pixels between two images of a grid and around the grid.
pub const GRID_PADDING: usize = 2;

/// Width and height in pixels of a grid of `num_images` images of `height` x `width` pixels,
/// with `nrow` images per row.
pub fn grid_dimensions(
    num_images: usize,
    nrow: usize,
    height: usize,
    width: usize,
) -> (usize, usize) {
    let columns = nrow.clamp(1, num_images.max(1));
    let rows = num_images.div_ceil(columns).max(1);

    (
        columns * (width + GRID_PADDING) + GRID_PADDING,
        rows * (height + GRID_PADDING) + GRID_PADDING,
    )
}

/// Images per row of a square-ish grid.
pub fn grid_columns(num_images: usize) -> usize {
    (num_images as f64).sqrt().ceil() as usize
}

/// Maps a value in `[-1, 1]` to a pixel intensity.
pub fn to_pixel(value: f32) -> u8 {
    (((value + 1.0) / 2.0).clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Save a batch of images of shape `[N, C, H, W]` with values in `[-1, 1]` as one grid image.
///
/// Grayscale when `C = 1`, RGB when `C = 3`.
pub fn save_grid<B: Backend>(images: Tensor<B, 4>, nrow: usize, path: &Path) -> Result<()> {
    let [num_images, channels, height, width] = images.dims();
    if channels != 1 && channels != 3 {
        return Err(GanError::InvalidConfig(format!(
            "Cannot save images with {channels} channels"
        )));
    }

    // Ensure the output directory exists
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let values = images
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|err| GanError::Data(format!("{err:?}")))?;
    let (grid_width, grid_height, pixels) =
        tile(&values, [num_images, channels, height, width], nrow);

    let (grid_width, grid_height) = (grid_width as u32, grid_height as u32);
    let saved = match channels {
        1 => GrayImage::from_raw(grid_width, grid_height, pixels).map(|img| img.save(path)),
        _ => RgbImage::from_raw(grid_width, grid_height, pixels).map(|img| img.save(path)),
    };

    match saved {
        Some(result) => {
            result?;
            log::debug!("Saved {num_images} images to {}", path.display());
            Ok(())
        }
        None => Err(GanError::Data(format!(
            "Pixel buffer does not match a {grid_width}x{grid_height} image"
        ))),
    }
}

/// Lays out `[N, C, H, W]` values into an interleaved `HWC` pixel buffer.
fn tile(values: &[f32], shape: [usize; 4], nrow: usize) -> (usize, usize, Vec<u8>) {
    let [num_images, channels, height, width] = shape;
    let (grid_width, grid_height) = grid_dimensions(num_images, nrow, height, width);
    let columns = nrow.clamp(1, num_images.max(1));
    let mut pixels = vec![0u8; grid_width * grid_height * channels];

    for index in 0..num_images {
        let left = GRID_PADDING + (index % columns) * (width + GRID_PADDING);
        let top = GRID_PADDING + (index / columns) * (height + GRID_PADDING);

        for c in 0..channels {
            for y in 0..height {
                for x in 0..width {
                    let value = values[((index * channels + c) * height + y) * width + x];
                    let offset = ((top + y) * grid_width + left + x) * channels + c;
                    pixels[offset] = to_pixel(value);
                }
            }
        }
    }

    (grid_width, grid_height, pixels)
}
