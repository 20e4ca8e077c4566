use crate::errors::Result;
use crate::pipeline::InpaintParams;
use crate::traits::{InpaintModel, ParamSupport};
use ndarray::prelude::*;

/// Test model that paints every masked pixel with one value.
#[derive(Debug, Clone)]
pub struct MockInpaintModel {
    pub fill: f32,
}

impl MockInpaintModel {
    pub const fn new(fill: f32) -> Self {
        Self { fill }
    }
}

impl InpaintModel for MockInpaintModel {
    fn inpaint(
        &self,
        mask: ArrayView4<f32>,
        masked_image: ArrayView4<f32>,
        _params: &InpaintParams,
    ) -> Result<Array4<f32>> {
        Ok(&masked_image + &(&mask * self.fill))
    }

    fn name(&self) -> &str {
        "mock"
    }

    fn param_support(&self) -> ParamSupport {
        ParamSupport::ALL
    }
}

/// Test model that returns a tensor of the wrong shape.
#[derive(Debug, Clone, Default)]
pub struct MisshapenModel;

impl InpaintModel for MisshapenModel {
    fn inpaint(
        &self,
        mask: ArrayView4<f32>,
        _masked_image: ArrayView4<f32>,
        _params: &InpaintParams,
    ) -> Result<Array4<f32>> {
        Ok(mask.to_owned())
    }

    fn name(&self) -> &str {
        "misshapen"
    }
}

pub const fn create_mock_model() -> MockInpaintModel {
    MockInpaintModel::new(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_model_fills_masked_pixels() -> Result<()> {
        let mock = create_mock_model();
        let mut mask = Array4::<f32>::zeros((1, 1, 2, 2));
        mask[[0, 0, 1, 1]] = 1.0;
        let masked_image = Array4::<f32>::from_elem((1, 3, 2, 2), -0.5);

        let result = mock.inpaint(mask.view(), masked_image.view(), &InpaintParams::default())?;
        assert_eq!(result.shape(), &[1, 3, 2, 2]);
        assert_eq!(result[[0, 1, 0, 0]], -0.5);
        assert_eq!(result[[0, 1, 1, 1]], 0.5);
        Ok(())
    }
}
