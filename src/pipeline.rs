use image::RgbImage;
use ndarray::{prelude::*, stack};
use tracing::debug;

use crate::errors::{InpaintPrepError, Result};
use crate::input::{ImageInput, MaskInput};
use crate::normalize::prepare_mask_and_masked_image;
use crate::postprocess::{to_channels_last, to_rgb_images};
use crate::traits::{InpaintModel, ParamSupport};

/// Generation settings forwarded untouched to the model.
///
/// Fields the model does not support must stay at their defaults, see
/// [`InpaintParams::check_supported`].
#[derive(Debug, Clone, PartialEq)]
pub struct InpaintParams {
    pub prompt: String,
    pub negative_prompt: Option<String>,
    /// Seed for the model's noise generator; `None` lets the model choose.
    pub seed: Option<u64>,
    pub num_inference_steps: usize,
    pub guidance_scale: f32,
}

impl InpaintParams {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub const fn with_num_inference_steps(mut self, steps: usize) -> Self {
        self.num_inference_steps = steps;
        self
    }

    pub const fn with_guidance_scale(mut self, guidance_scale: f32) -> Self {
        self.guidance_scale = guidance_scale;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_inference_steps == 0 {
            return Err(InpaintPrepError::Validation {
                field: "num_inference_steps".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if !self.guidance_scale.is_finite() {
            return Err(InpaintPrepError::Validation {
                field: "guidance_scale".to_string(),
                reason: format!("must be finite, got {}", self.guidance_scale),
            });
        }
        Ok(())
    }

    /// Reject settings that differ from the defaults but would be ignored by
    /// a model with the given `support`.
    pub fn check_supported(&self, support: ParamSupport, model: &str) -> Result<()> {
        let defaults = Self::default();
        let ignored = [
            ("prompt", !support.prompt && self.prompt != defaults.prompt),
            (
                "negative_prompt",
                !support.negative_prompt && self.negative_prompt != defaults.negative_prompt,
            ),
            ("seed", !support.seed && self.seed != defaults.seed),
            (
                "num_inference_steps",
                !support.num_inference_steps
                    && self.num_inference_steps != defaults.num_inference_steps,
            ),
            (
                "guidance_scale",
                !support.guidance_scale && self.guidance_scale != defaults.guidance_scale,
            ),
        ];
        match ignored.iter().find(|(_, ignored)| *ignored) {
            Some((field, _)) => Err(InpaintPrepError::Validation {
                field: (*field).to_string(),
                reason: format!("is not used by the {model} model, leave it at its default"),
            }),
            None => Ok(()),
        }
    }
}

impl Default for InpaintParams {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            negative_prompt: None,
            seed: None,
            num_inference_steps: 50,
            guidance_scale: 7.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputType {
    /// RGB bitmaps.
    #[default]
    Pil,
    /// `(N, H, W, 3)` array in `[0, 1]`.
    Np,
}

#[derive(Debug, Clone)]
pub struct InpaintRequest {
    pub image: ImageInput,
    pub mask_image: MaskInput,
    pub params: InpaintParams,
    pub num_images_per_prompt: usize,
    pub output_type: OutputType,
}

impl InpaintRequest {
    pub fn new(image: impl Into<ImageInput>, mask_image: impl Into<MaskInput>) -> Self {
        Self {
            image: image.into(),
            mask_image: mask_image.into(),
            params: InpaintParams::default(),
            num_images_per_prompt: 1,
            output_type: OutputType::default(),
        }
    }

    pub fn with_params(mut self, params: InpaintParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_num_images_per_prompt(mut self, count: usize) -> Self {
        self.num_images_per_prompt = count;
        self
    }

    pub fn with_output_type(mut self, output_type: OutputType) -> Self {
        self.output_type = output_type;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_images_per_prompt == 0 {
            return Err(InpaintPrepError::Validation {
                field: "num_images_per_prompt".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        self.params.validate()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Images {
    Pil(Vec<RgbImage>),
    Np(Array4<f32>),
}

impl Images {
    pub fn len(&self) -> usize {
        match self {
            Self::Pil(images) => images.len(),
            Self::Np(array) => array.len_of(Axis(0)),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone)]
pub struct InpaintOutput {
    pub images: Images,
    /// Binarized mask the model was given, `(N, 1, H, W)`.
    pub mask: Array4<f32>,
}

/// Normalizes requests and hands them to an [`InpaintModel`].
pub struct InpaintPipeline<M: InpaintModel> {
    model: M,
}

impl<M: InpaintModel> InpaintPipeline<M> {
    pub const fn new(model: M) -> Self {
        Self { model }
    }

    pub const fn model(&self) -> &M {
        &self.model
    }

    pub fn call(&self, request: InpaintRequest) -> Result<InpaintOutput> {
        request.validate()?;
        request
            .params
            .check_supported(self.model.param_support(), self.model.name())?;
        let InpaintRequest {
            image,
            mask_image,
            params,
            num_images_per_prompt,
            output_type,
        } = request;

        let (mask, masked_image) = prepare_mask_and_masked_image(image, mask_image)?.into_parts();
        let mask = repeat_items(mask, num_images_per_prompt)?;
        let masked_image = repeat_items(masked_image, num_images_per_prompt)?;
        let (batch, _, height, width) = masked_image.dim();

        debug!(
            model = self.model.name(),
            batch,
            steps = params.num_inference_steps,
            "running inpaint model"
        );
        let images = self
            .model
            .inpaint(mask.view(), masked_image.view(), &params)?;

        if images.dim() != (batch, 3, height, width) {
            return Err(InpaintPrepError::Validation {
                field: "model output".to_string(),
                reason: format!(
                    "of {} should have shape {:?}, got {:?}",
                    self.model.name(),
                    [batch, 3, height, width],
                    images.shape()
                ),
            });
        }

        let images = match output_type {
            OutputType::Pil => Images::Pil(to_rgb_images(images.view())?),
            OutputType::Np => Images::Np(to_channels_last(images.view())),
        };
        Ok(InpaintOutput { images, mask })
    }
}

/// Repeat each batch item `times` times in place, keeping item order.
fn repeat_items(tensor: Array4<f32>, times: usize) -> Result<Array4<f32>> {
    if times == 1 {
        return Ok(tensor);
    }
    let views: Vec<_> = tensor
        .outer_iter()
        .flat_map(|item| std::iter::repeat(item).take(times))
        .collect();
    Ok(stack(Axis(0), &views)?)
}
