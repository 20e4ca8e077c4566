//! Tagged input forms accepted by the normalizer.
//!
//! Images and masks arrive as bitmaps, raw integer pixel arrays or tensors
//! that are already in model value conventions. Each form belongs to an
//! [`InputCategory`]; the normalizer resolves the category once and
//! dispatches on it.

use std::fmt;

use image::{DynamicImage, GrayImage, RgbImage};
use ndarray::ArrayD;

/// Broad kind of an image or mask input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputCategory {
    Bitmap,
    RawArray,
    NormalizedTensor,
}

impl InputCategory {
    /// Bitmaps and raw arrays both carry unnormalized pixel values and may be
    /// paired with each other; tensors may only be paired with tensors.
    pub const fn is_normalized(self) -> bool {
        matches!(self, Self::NormalizedTensor)
    }
}

impl fmt::Display for InputCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bitmap => f.write_str("bitmap"),
            Self::RawArray => f.write_str("raw pixel array"),
            Self::NormalizedTensor => f.write_str("normalized tensor"),
        }
    }
}

/// An RGB image in one of the supported forms.
#[derive(Debug, Clone)]
pub enum ImageInput {
    /// Single bitmap, treated as unbatched.
    Bitmap(RgbImage),
    /// Batch of equally sized bitmaps.
    BitmapBatch(Vec<RgbImage>),
    /// Channel-last pixels, `(H, W, 3)` or `(N, H, W, 3)`, in `0..=255`.
    Pixels(ArrayD<u8>),
    /// Channel-first tensor, `(3, H, W)` or `(N, 3, H, W)`, in `[-1, 1]`.
    Tensor(ArrayD<f32>),
}

impl ImageInput {
    pub fn from_dynamic(image: &DynamicImage) -> Self {
        Self::Bitmap(image.to_rgb8())
    }

    pub const fn category(&self) -> InputCategory {
        match self {
            Self::Bitmap(_) | Self::BitmapBatch(_) => InputCategory::Bitmap,
            Self::Pixels(_) => InputCategory::RawArray,
            Self::Tensor(_) => InputCategory::NormalizedTensor,
        }
    }

    /// Shape as supplied, bitmaps reported channel-last.
    pub fn shape(&self) -> Vec<usize> {
        match self {
            Self::Bitmap(image) => {
                let (width, height) = image.dimensions();
                vec![height as usize, width as usize, 3]
            }
            Self::BitmapBatch(images) => {
                let (width, height) = images.first().map_or((0, 0), |i| i.dimensions());
                vec![images.len(), height as usize, width as usize, 3]
            }
            Self::Pixels(pixels) => pixels.shape().to_vec(),
            Self::Tensor(tensor) => tensor.shape().to_vec(),
        }
    }
}

impl From<RgbImage> for ImageInput {
    fn from(image: RgbImage) -> Self {
        Self::Bitmap(image)
    }
}

impl From<Vec<RgbImage>> for ImageInput {
    fn from(images: Vec<RgbImage>) -> Self {
        Self::BitmapBatch(images)
    }
}

impl From<ArrayD<u8>> for ImageInput {
    fn from(pixels: ArrayD<u8>) -> Self {
        Self::Pixels(pixels)
    }
}

impl From<ArrayD<f32>> for ImageInput {
    fn from(tensor: ArrayD<f32>) -> Self {
        Self::Tensor(tensor)
    }
}

/// A single-channel mask in one of the supported forms.
#[derive(Debug, Clone)]
pub enum MaskInput {
    /// Single luminance bitmap, treated as unbatched.
    Bitmap(GrayImage),
    /// Batch of equally sized luminance bitmaps.
    BitmapBatch(Vec<GrayImage>),
    /// `(H, W)`, `(N, H, W)` or `(N, H, W, 1)` in `0..=255`.
    Pixels(ArrayD<u8>),
    /// Same shapes as [`MaskInput::Pixels`], `true` marks masked pixels.
    Binary(ArrayD<bool>),
    /// `(H, W)`, `(1, H, W)`, `(N, H, W)` or `(N, 1, H, W)` in `[0, 1]`.
    Tensor(ArrayD<f32>),
}

impl MaskInput {
    pub fn from_dynamic(mask: &DynamicImage) -> Self {
        Self::Bitmap(mask.to_luma8())
    }

    pub const fn category(&self) -> InputCategory {
        match self {
            Self::Bitmap(_) | Self::BitmapBatch(_) => InputCategory::Bitmap,
            Self::Pixels(_) | Self::Binary(_) => InputCategory::RawArray,
            Self::Tensor(_) => InputCategory::NormalizedTensor,
        }
    }

    pub fn shape(&self) -> Vec<usize> {
        match self {
            Self::Bitmap(mask) => {
                let (width, height) = mask.dimensions();
                vec![height as usize, width as usize]
            }
            Self::BitmapBatch(masks) => {
                let (width, height) = masks.first().map_or((0, 0), |m| m.dimensions());
                vec![masks.len(), height as usize, width as usize]
            }
            Self::Pixels(pixels) => pixels.shape().to_vec(),
            Self::Binary(bits) => bits.shape().to_vec(),
            Self::Tensor(tensor) => tensor.shape().to_vec(),
        }
    }
}

impl From<GrayImage> for MaskInput {
    fn from(mask: GrayImage) -> Self {
        Self::Bitmap(mask)
    }
}

impl From<Vec<GrayImage>> for MaskInput {
    fn from(masks: Vec<GrayImage>) -> Self {
        Self::BitmapBatch(masks)
    }
}

impl From<ArrayD<u8>> for MaskInput {
    fn from(pixels: ArrayD<u8>) -> Self {
        Self::Pixels(pixels)
    }
}

impl From<ArrayD<bool>> for MaskInput {
    fn from(bits: ArrayD<bool>) -> Self {
        Self::Binary(bits)
    }
}

impl From<ArrayD<f32>> for MaskInput {
    fn from(tensor: ArrayD<f32>) -> Self {
        Self::Tensor(tensor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};
    use ndarray::IxDyn;

    #[test]
    fn test_categories() {
        let bitmap = ImageInput::Bitmap(RgbImage::new(4, 4));
        let pixels = ImageInput::Pixels(ArrayD::zeros(IxDyn(&[4, 4, 3])));
        let tensor = ImageInput::Tensor(ArrayD::zeros(IxDyn(&[3, 4, 4])));

        assert_eq!(bitmap.category(), InputCategory::Bitmap);
        assert_eq!(pixels.category(), InputCategory::RawArray);
        assert_eq!(tensor.category(), InputCategory::NormalizedTensor);

        let binary = MaskInput::Binary(ArrayD::from_elem(IxDyn(&[4, 4]), false));
        assert_eq!(binary.category(), InputCategory::RawArray);
        assert!(!binary.category().is_normalized());
    }

    #[test]
    fn test_bitmap_shapes_are_channel_last() {
        let image = ImageInput::from_dynamic(&DynamicImage::ImageRgb8(RgbImage::from_pixel(
            5,
            7,
            Rgb([1, 2, 3]),
        )));
        assert_eq!(image.shape(), vec![7, 5, 3]);

        let masks = MaskInput::BitmapBatch(vec![GrayImage::from_pixel(5, 7, Luma([0])); 2]);
        assert_eq!(masks.shape(), vec![2, 7, 5]);
    }
}
