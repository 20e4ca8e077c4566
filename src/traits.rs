use crate::errors::Result;
use crate::pipeline::InpaintParams;
use ndarray::prelude::*;

/// Generation settings a model acts on. Anything not listed must be left at
/// its default in a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParamSupport {
    pub prompt: bool,
    pub negative_prompt: bool,
    pub seed: bool,
    pub num_inference_steps: bool,
    pub guidance_scale: bool,
}

impl ParamSupport {
    pub const NONE: Self = Self {
        prompt: false,
        negative_prompt: false,
        seed: false,
        num_inference_steps: false,
        guidance_scale: false,
    };

    pub const ALL: Self = Self {
        prompt: true,
        negative_prompt: true,
        seed: true,
        num_inference_steps: true,
        guidance_scale: true,
    };
}

/// Generative inpainting model driven by [`crate::InpaintPipeline`].
///
/// Implementations receive the canonical pair produced by
/// [`crate::prepare_mask_and_masked_image`] and return `(N, 3, H, W)` images
/// in `[-1, 1]`, one per batch item.
pub trait InpaintModel: Send + Sync {
    fn inpaint(
        &self,
        mask: ArrayView4<f32>,
        masked_image: ArrayView4<f32>,
        params: &InpaintParams,
    ) -> Result<Array4<f32>>;

    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Which [`InpaintParams`] fields `inpaint` reads.
    fn param_support(&self) -> ParamSupport {
        ParamSupport::NONE
    }
}

impl<M: InpaintModel + ?Sized> InpaintModel for Box<M> {
    fn inpaint(
        &self,
        mask: ArrayView4<f32>,
        masked_image: ArrayView4<f32>,
        params: &InpaintParams,
    ) -> Result<Array4<f32>> {
        (**self).inpaint(mask, masked_image, params)
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn param_support(&self) -> ParamSupport {
        (**self).param_support()
    }
}
