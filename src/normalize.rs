//! Canonicalization of image/mask pairs for inpainting models.
//!
//! [`prepare_mask_and_masked_image`] accepts any supported [`ImageInput`] /
//! [`MaskInput`] combination and returns a [`MaskedImage`] whose `mask` is
//! `(N, 1, H, W)` with values in `{0, 1}` and whose `masked_image` is
//! `(N, 3, H, W)` with values in `[-1, 1]` and masked pixels zeroed.

use image::{GrayImage, RgbImage};
use ndarray::{prelude::*, stack};
use nshare::AsNdarray3;
use tracing::debug;

use crate::errors::{InpaintPrepError, Operand, Result};
use crate::input::{ImageInput, MaskInput};

/// Accepted value range of a normalized image tensor.
pub const IMAGE_RANGE: (f32, f32) = (-1.0, 1.0);
/// Accepted value range of a normalized mask tensor.
pub const MASK_RANGE: (f32, f32) = (0.0, 1.0);
/// Mask values at or above this are masked.
pub const MASK_THRESHOLD: f32 = 0.5;

/// Canonical model inputs produced by the normalizer.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskedImage {
    /// `(N, 1, H, W)`, binarized.
    pub mask: Array4<f32>,
    /// `(N, 3, H, W)`, zero wherever `mask` is 1.
    pub masked_image: Array4<f32>,
}

impl MaskedImage {
    pub fn batch_size(&self) -> usize {
        self.mask.len_of(Axis(0))
    }

    /// `(height, width)` shared by both tensors.
    pub fn spatial_size(&self) -> (usize, usize) {
        (self.mask.len_of(Axis(2)), self.mask.len_of(Axis(3)))
    }

    pub fn into_parts(self) -> (Array4<f32>, Array4<f32>) {
        (self.mask, self.masked_image)
    }
}

/// Position of the color axis in an image array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelLayout {
    First,
    Last,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageRule {
    /// Unbatched image, a batch axis of size 1 is prepended.
    PromoteBatch,
    /// Already batched.
    Keep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskRule {
    /// `(H, W)` becomes `(1, 1, H, W)`.
    PromoteBatchAndChannel,
    /// `(1, H, W)` is a single mask with a channel axis, `(N, H, W)` a batch.
    SingleOrBatch,
    /// `(N, 1, H, W)` as is.
    Keep,
    /// `(N, H, W, 1)` becomes `(N, 1, H, W)`.
    ChannelLast,
}

/// One accepted `(image rank, mask rank)` combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankRule {
    pub image_rank: usize,
    pub mask_rank: usize,
    pub image_layout: ChannelLayout,
    pub image: ImageRule,
    pub mask: MaskRule,
}

const fn rule(
    image_rank: usize,
    mask_rank: usize,
    image_layout: ChannelLayout,
    image: ImageRule,
    mask: MaskRule,
) -> RankRule {
    RankRule {
        image_rank,
        mask_rank,
        image_layout,
        image,
        mask,
    }
}

/// Rank combinations accepted for normalized tensors. Anything else is a
/// shape error.
#[rustfmt::skip]
pub const TENSOR_RANK_TABLE: [RankRule; 6] = [
    rule(3, 2, ChannelLayout::First, ImageRule::PromoteBatch, MaskRule::PromoteBatchAndChannel),
    rule(3, 3, ChannelLayout::First, ImageRule::PromoteBatch, MaskRule::SingleOrBatch),
    rule(3, 4, ChannelLayout::First, ImageRule::PromoteBatch, MaskRule::Keep),
    rule(4, 2, ChannelLayout::First, ImageRule::Keep, MaskRule::PromoteBatchAndChannel),
    rule(4, 3, ChannelLayout::First, ImageRule::Keep, MaskRule::SingleOrBatch),
    rule(4, 4, ChannelLayout::First, ImageRule::Keep, MaskRule::Keep),
];

/// Rank combinations accepted for raw pixel arrays and bitmaps.
#[rustfmt::skip]
pub const PIXEL_RANK_TABLE: [RankRule; 6] = [
    rule(3, 2, ChannelLayout::Last, ImageRule::PromoteBatch, MaskRule::PromoteBatchAndChannel),
    rule(3, 3, ChannelLayout::Last, ImageRule::PromoteBatch, MaskRule::SingleOrBatch),
    rule(3, 4, ChannelLayout::Last, ImageRule::PromoteBatch, MaskRule::ChannelLast),
    rule(4, 2, ChannelLayout::Last, ImageRule::Keep, MaskRule::PromoteBatchAndChannel),
    rule(4, 3, ChannelLayout::Last, ImageRule::Keep, MaskRule::SingleOrBatch),
    rule(4, 4, ChannelLayout::Last, ImageRule::Keep, MaskRule::ChannelLast),
];

pub fn lookup_rank_rule(table: &[RankRule], image_rank: usize, mask_rank: usize) -> Option<RankRule> {
    table
        .iter()
        .copied()
        .find(|rule| rule.image_rank == image_rank && rule.mask_rank == mask_rank)
}

/// Original shapes of the pair, attached to every shape error.
struct ShapeContext {
    image: Vec<usize>,
    mask: Vec<usize>,
}

impl ShapeContext {
    fn error(&self, reason: impl Into<String>) -> InpaintPrepError {
        InpaintPrepError::Shape {
            reason: reason.into(),
            image: self.image.clone(),
            mask: self.mask.clone(),
        }
    }
}

/// A 4D tensor plus whether the caller supplied a batch axis.
struct Canonical {
    tensor: Array4<f32>,
    batched: bool,
}

/// Validate an image/mask pair and build the canonical model inputs.
///
/// Raw pixels (bitmaps and `u8` arrays) and normalized `f32` tensors may not
/// be mixed. Shape problems are reported before value range problems.
pub fn prepare_mask_and_masked_image(
    image: impl Into<ImageInput>,
    mask: impl Into<MaskInput>,
) -> Result<MaskedImage> {
    let (image, mask) = (image.into(), mask.into());
    let (image_category, mask_category) = (image.category(), mask.category());
    if image_category.is_normalized() != mask_category.is_normalized() {
        return Err(InpaintPrepError::TypeMismatch {
            image: image_category,
            mask: mask_category,
        });
    }

    let context = ShapeContext {
        image: image.shape(),
        mask: mask.shape(),
    };

    let (image, mask, table) = match (image, mask) {
        (ImageInput::Tensor(image), MaskInput::Tensor(mask)) => (image, mask, &TENSOR_RANK_TABLE),
        (image, mask) => (
            pixel_image(image, &context)?,
            pixel_mask(mask, &context)?,
            &PIXEL_RANK_TABLE,
        ),
    };

    let rule = lookup_rank_rule(table, image.ndim(), mask.ndim()).ok_or_else(|| {
        context.error(format!(
            "unsupported rank combination: image rank {}, mask rank {}",
            image.ndim(),
            mask.ndim()
        ))
    })?;

    let image = canonical_image(rule, image, &context)?;
    let mask = canonical_mask(rule, mask, &context)?;
    let prepared = finish(image, mask, &context)?;

    debug!(
        batch = prepared.batch_size(),
        height = prepared.spatial_size().0,
        width = prepared.spatial_size().1,
        category = %image_category,
        "prepared mask and masked image"
    );
    Ok(prepared)
}

fn pixel_image(image: ImageInput, context: &ShapeContext) -> Result<ArrayD<f32>> {
    let pixels = match image {
        ImageInput::Bitmap(image) => bitmap_pixels(&image).to_owned().into_dyn(),
        ImageInput::BitmapBatch(images) => {
            ensure_uniform(images.iter().map(|i| i.dimensions()), context)?;
            let views: Vec<_> = images.iter().map(bitmap_pixels).collect();
            stack(Axis(0), &views)?.into_dyn()
        }
        ImageInput::Pixels(pixels) => pixels,
        ImageInput::Tensor(tensor) => {
            return Err(context.error(format!(
                "normalized tensor of shape {:?} cannot be read as raw pixels",
                tensor.shape()
            )))
        }
    };
    Ok(pixels.mapv(|v| f32::from(v) / 127.5 - 1.0))
}

fn pixel_mask(mask: MaskInput, context: &ShapeContext) -> Result<ArrayD<f32>> {
    let pixels = match mask {
        MaskInput::Bitmap(mask) => bitmap_mask(&mask).to_owned().into_dyn(),
        MaskInput::BitmapBatch(masks) => {
            ensure_uniform(masks.iter().map(|m| m.dimensions()), context)?;
            let views: Vec<_> = masks.iter().map(bitmap_mask).collect();
            stack(Axis(0), &views)?.into_dyn()
        }
        MaskInput::Pixels(pixels) => pixels,
        MaskInput::Binary(bits) => return Ok(bits.mapv(|bit| if bit { 1.0 } else { 0.0 })),
        MaskInput::Tensor(tensor) => {
            return Err(context.error(format!(
                "normalized tensor of shape {:?} cannot be read as raw pixels",
                tensor.shape()
            )))
        }
    };
    Ok(pixels.mapv(|v| f32::from(v) / 255.0))
}

/// `(H, W, 3)` view of an RGB bitmap.
fn bitmap_pixels(image: &RgbImage) -> ArrayView3<'_, u8> {
    image.as_ndarray3().permuted_axes([1, 2, 0])
}

/// `(H, W)` view of a luminance bitmap.
fn bitmap_mask(mask: &GrayImage) -> ArrayView2<'_, u8> {
    mask.as_ndarray3().index_axis_move(Axis(0), 0)
}

fn ensure_uniform(
    mut dimensions: impl Iterator<Item = (u32, u32)>,
    context: &ShapeContext,
) -> Result<()> {
    let first = dimensions
        .next()
        .ok_or_else(|| context.error("bitmap batch is empty"))?;
    match dimensions.find(|d| *d != first) {
        Some((width, height)) => Err(context.error(format!(
            "bitmaps in a batch must share one size, got {}x{} and {}x{}",
            first.0, first.1, width, height
        ))),
        None => Ok(()),
    }
}

fn canonical_image(rule: RankRule, image: ArrayD<f32>, context: &ShapeContext) -> Result<Canonical> {
    let (image, batched) = match rule.image {
        ImageRule::PromoteBatch => (image.insert_axis(Axis(0)), false),
        ImageRule::Keep => (image, true),
    };
    let image = image.into_dimensionality::<Ix4>()?;
    let image = match rule.image_layout {
        ChannelLayout::First => image,
        ChannelLayout::Last => image.permuted_axes([0, 3, 1, 2]),
    };

    if image.len_of(Axis(1)) != 3 {
        let expected = match (rule.image_layout, batched) {
            (ChannelLayout::First, false) => "(3, H, W)",
            (ChannelLayout::First, true) => "(N, 3, H, W)",
            (ChannelLayout::Last, false) => "(H, W, 3)",
            (ChannelLayout::Last, true) => "(N, H, W, 3)",
        };
        return Err(context.error(format!("image should be of shape {expected}")));
    }

    Ok(Canonical {
        tensor: image,
        batched,
    })
}

fn canonical_mask(rule: RankRule, mask: ArrayD<f32>, context: &ShapeContext) -> Result<Canonical> {
    let (mask, batched) = match rule.mask {
        MaskRule::PromoteBatchAndChannel => (mask.insert_axis(Axis(0)).insert_axis(Axis(0)), false),
        MaskRule::SingleOrBatch if mask.len_of(Axis(0)) == 1 => (mask.insert_axis(Axis(0)), false),
        MaskRule::SingleOrBatch => (mask.insert_axis(Axis(1)), true),
        MaskRule::Keep => (mask, true),
        MaskRule::ChannelLast => {
            let mask = mask.into_dimensionality::<Ix4>()?.permuted_axes([0, 3, 1, 2]);
            (mask.into_dyn(), true)
        }
    };
    let mask = mask.into_dimensionality::<Ix4>()?;

    if mask.len_of(Axis(1)) != 1 {
        let expected = match rule.mask {
            MaskRule::ChannelLast => "(N, H, W, 1)",
            _ => "(N, 1, H, W)",
        };
        return Err(context.error(format!("mask should be of shape {expected}")));
    }

    Ok(Canonical {
        tensor: mask,
        batched,
    })
}

fn finish(image: Canonical, mask: Canonical, context: &ShapeContext) -> Result<MaskedImage> {
    if image.tensor.shape()[2..] != mask.tensor.shape()[2..] {
        return Err(context.error("image and mask must have the same spatial dimensions"));
    }
    let batch = common_batch(&image, &mask, context)?;

    check_range(Operand::Image, image.tensor.view(), IMAGE_RANGE)?;
    check_range(Operand::Mask, mask.tensor.view(), MASK_RANGE)?;

    let image = broadcast_batch(image.tensor, batch, context)?;
    let mask = broadcast_batch(mask.tensor, batch, context)?
        .mapv_into(|v| if v >= MASK_THRESHOLD { 1.0 } else { 0.0 });
    let keep = mask.mapv(|v| 1.0 - v);
    let masked_image = &image * &keep;

    Ok(MaskedImage { mask, masked_image })
}

/// Batch size of the pair. A side without a caller-supplied batch axis
/// follows the other side.
fn common_batch(image: &Canonical, mask: &Canonical, context: &ShapeContext) -> Result<usize> {
    let (image_batch, mask_batch) = (image.tensor.len_of(Axis(0)), mask.tensor.len_of(Axis(0)));
    match (image.batched, mask.batched) {
        _ if image_batch == mask_batch => Ok(image_batch),
        (true, false) => Ok(image_batch),
        (false, true) => Ok(mask_batch),
        _ => Err(context.error(format!(
            "image and mask must have the same batch size, got {image_batch} and {mask_batch}"
        ))),
    }
}

fn broadcast_batch(tensor: Array4<f32>, batch: usize, context: &ShapeContext) -> Result<Array4<f32>> {
    if tensor.len_of(Axis(0)) == batch {
        return Ok(tensor);
    }
    let (_, channels, height, width) = tensor.dim();
    tensor
        .broadcast((batch, channels, height, width))
        .map(|view| view.to_owned())
        .ok_or_else(|| context.error(format!("cannot broadcast batch to {batch}")))
}

fn check_range(operand: Operand, tensor: ArrayView4<f32>, (lower, upper): (f32, f32)) -> Result<()> {
    let (min, max, has_nan) = tensor.fold(
        (f32::INFINITY, f32::NEG_INFINITY, false),
        |(min, max, has_nan), &v| (min.min(v), max.max(v), has_nan || v.is_nan()),
    );
    if has_nan || min < lower || max > upper {
        return Err(InpaintPrepError::ValueRange {
            operand,
            min,
            max,
            lower,
            upper,
        });
    }
    Ok(())
}
