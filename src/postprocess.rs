use image::{GrayImage, ImageBuffer, RgbImage};
use ndarray::prelude::*;

use crate::errors::{InpaintPrepError, Result};

/// `(N, 3, H, W)` in `[-1, 1]` to `(N, H, W, 3)` in `[0, 1]`.
pub fn to_channels_last(tensor: ArrayView4<f32>) -> Array4<f32> {
    tensor
        .permuted_axes([0, 2, 3, 1])
        .mapv(|v| (v / 2.0 + 0.5).clamp(0.0, 1.0))
        .as_standard_layout()
        .into_owned()
}

pub fn to_rgb_images(tensor: ArrayView4<f32>) -> Result<Vec<RgbImage>> {
    ensure_channels(tensor, 3, "image tensor")?;
    let images = to_channels_last(tensor);
    let (_, height, width, _) = images.dim();

    images
        .outer_iter()
        .map(|image| {
            let pixels = image.iter().map(|&v| to_u8(v)).collect();
            ImageBuffer::from_raw(width as u32, height as u32, pixels)
                .ok_or_else(|| buffer_error("image tensor", width, height))
        })
        .collect()
}

/// `(N, 1, H, W)` in `[0, 1]` to luminance bitmaps.
pub fn mask_to_gray_images(mask: ArrayView4<f32>) -> Result<Vec<GrayImage>> {
    ensure_channels(mask, 1, "mask tensor")?;
    let (_, _, height, width) = mask.dim();

    mask.outer_iter()
        .map(|mask| {
            let pixels = mask.iter().map(|&v| to_u8(v.clamp(0.0, 1.0))).collect();
            ImageBuffer::from_raw(width as u32, height as u32, pixels)
                .ok_or_else(|| buffer_error("mask tensor", width, height))
        })
        .collect()
}

fn to_u8(v: f32) -> u8 {
    (v * 255.0).round() as u8
}

fn ensure_channels(tensor: ArrayView4<f32>, channels: usize, field: &str) -> Result<()> {
    if tensor.len_of(Axis(1)) != channels {
        return Err(InpaintPrepError::Validation {
            field: field.to_string(),
            reason: format!(
                "must have {channels} channel(s), got shape {:?}",
                tensor.shape()
            ),
        });
    }
    Ok(())
}

fn buffer_error(field: &str, width: usize, height: usize) -> InpaintPrepError {
    InpaintPrepError::Validation {
        field: field.to_string(),
        reason: format!("does not fit a {width}x{height} image buffer"),
    }
}
