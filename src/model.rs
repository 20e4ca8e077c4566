use ndarray::prelude::*;

use crate::errors::Result;
use crate::pipeline::InpaintParams;
use crate::traits::InpaintModel;

/// Performs no generation and returns the masked image as the model sees it.
///
/// Used for dry runs of the CLI to inspect what a real model would receive.
#[derive(Debug, Clone, Copy, Default)]
pub struct MaskedPreview;

impl InpaintModel for MaskedPreview {
    fn inpaint(
        &self,
        _mask: ArrayView4<f32>,
        masked_image: ArrayView4<f32>,
        _params: &InpaintParams,
    ) -> Result<Array4<f32>> {
        Ok(masked_image.to_owned())
    }

    fn name(&self) -> &str {
        "masked-preview"
    }
}

#[cfg(feature = "onnx")]
pub use onnx::OnnxInpaintModel;

#[cfg(feature = "onnx")]
mod onnx {
    use std::path::Path;

    use ndarray::{arr1, prelude::*};
    use ort::value::{Tensor, TensorRef};
    use ort::{
        execution_providers::{CUDAExecutionProvider, TensorRTExecutionProvider},
        session::{builder::SessionBuilder, Session},
    };
    use parking_lot::Mutex;
    use tracing::info;

    use crate::errors::{InpaintPrepError, Result};
    use crate::pipeline::InpaintParams;
    use crate::traits::{InpaintModel, ParamSupport};

    /// One-shot inpainting network exported to ONNX.
    ///
    /// The graph takes `mask` `(N, 1, H, W)` and `masked_image` `(N, 3, H, W)`
    /// and produces `image` `(N, 3, H, W)` in `[-1, 1]`. Graphs may also
    /// declare scalar `seed` / `num_inference_steps` (int64) and
    /// `guidance_scale` (float) inputs of shape `[1]`; those are fed from the
    /// request and all other settings are rejected.
    pub struct OnnxInpaintModel {
        session: Mutex<Session>,
        support: ParamSupport,
    }

    impl OnnxInpaintModel {
        pub fn new(model_path: &Path, device_id: i32) -> Result<Self> {
            let session = SessionBuilder::new()
                .map_err(|e| InpaintPrepError::Model {
                    operation: "session builder initialization".to_string(),
                    source: Box::new(e),
                })?
                .with_execution_providers([
                    TensorRTExecutionProvider::default()
                        .with_device_id(device_id)
                        .build(),
                    CUDAExecutionProvider::default()
                        .with_device_id(device_id)
                        .build(),
                ])
                .map_err(|e| InpaintPrepError::Model {
                    operation: "execution provider setup".to_string(),
                    source: Box::new(e),
                })?
                .with_memory_pattern(true)
                .map_err(|e| InpaintPrepError::Model {
                    operation: "memory pattern setup".to_string(),
                    source: Box::new(e),
                })?
                .commit_from_file(model_path)
                .map_err(|e| InpaintPrepError::Model {
                    operation: format!("model file load: {}", model_path.display()),
                    source: Box::new(e),
                })?;

            let declares = |name: &str| session.inputs.iter().any(|input| input.name == name);
            let support = ParamSupport {
                seed: declares("seed"),
                num_inference_steps: declares("num_inference_steps"),
                guidance_scale: declares("guidance_scale"),
                ..ParamSupport::NONE
            };

            info!(
                path = %model_path.display(),
                device_id,
                ?support,
                "loaded ONNX inpaint model"
            );
            Ok(Self {
                session: Mutex::new(session),
                support,
            })
        }
    }

    impl InpaintModel for OnnxInpaintModel {
        fn inpaint(
            &self,
            mask: ArrayView4<f32>,
            masked_image: ArrayView4<f32>,
            params: &InpaintParams,
        ) -> Result<Array4<f32>> {
            let mask = mask.as_standard_layout();
            let masked_image = masked_image.as_standard_layout();
            let mut inputs = ort::inputs![
                "mask" => TensorRef::from_array_view(&mask)?,
                "masked_image" => TensorRef::from_array_view(&masked_image)?,
            ];
            if self.support.seed {
                // graphs with a seed input get 0 when the caller leaves it open
                let seed = params.seed.unwrap_or(0) as i64;
                inputs.push(("seed".into(), Tensor::from_array(arr1(&[seed]))?.into()));
            }
            if self.support.num_inference_steps {
                let steps = params.num_inference_steps as i64;
                inputs.push((
                    "num_inference_steps".into(),
                    Tensor::from_array(arr1(&[steps]))?.into(),
                ));
            }
            if self.support.guidance_scale {
                inputs.push((
                    "guidance_scale".into(),
                    Tensor::from_array(arr1(&[params.guidance_scale]))?.into(),
                ));
            }

            let mut session = self.session.lock();
            let outputs = session.run(inputs)?;
            Ok(outputs["image"]
                .try_extract_array::<f32>()?
                .into_dimensionality::<Ix4>()?
                .to_owned())
        }

        fn name(&self) -> &str {
            "onnx"
        }

        fn param_support(&self) -> ParamSupport {
            self.support
        }
    }
}
