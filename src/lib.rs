//! Input preparation for Stable Diffusion style inpainting.
//!
//! The core is [`prepare_mask_and_masked_image`], which normalizes an image
//! and a mask supplied as bitmaps, raw pixel arrays or tensors into the
//! canonical `(mask, masked_image)` pair an inpainting model consumes.
//! [`InpaintPipeline`] drives an [`InpaintModel`] with that pair and
//! [`ImageProcessor`] applies the pipeline to whole directories.

pub mod config;
pub mod errors;
pub mod image_processor;
pub mod input;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod postprocess;
pub mod traits;

pub mod mocks;

pub use config::Config;
pub use errors::{InpaintPrepError, Operand, Result};
pub use image_processor::ImageProcessor;
pub use input::{ImageInput, InputCategory, MaskInput};
pub use model::MaskedPreview;
#[cfg(feature = "onnx")]
pub use model::OnnxInpaintModel;
pub use normalize::{prepare_mask_and_masked_image, MaskedImage};
pub use pipeline::{Images, InpaintOutput, InpaintParams, InpaintPipeline, InpaintRequest, OutputType};
pub use traits::{InpaintModel, ParamSupport};
