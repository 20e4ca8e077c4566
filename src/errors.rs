use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::input::InputCategory;

/// Which side of an image/mask pair a value check refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Image,
    Mask,
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image => f.write_str("image"),
            Self::Mask => f.write_str("mask"),
        }
    }
}

/// Structured error types for mask preparation and the inpainting pipeline.
///
/// # Why structured errors
///
/// The three normalization failures (shape, type mismatch, value range) are
/// separate variants so callers can react to each one without parsing
/// messages. The remaining variants carry the file or operation that failed
/// for the pipeline and CLI layers.
#[derive(Error, Debug)]
pub enum InpaintPrepError {
    #[error("Shape error: {reason} (image shape {image:?}, mask shape {mask:?})")]
    Shape {
        reason: String,
        image: Vec<usize>,
        mask: Vec<usize>,
    },

    #[error("Type mismatch: image is a {image} but mask is a {mask}")]
    TypeMismatch {
        image: InputCategory,
        mask: InputCategory,
    },

    #[error("Value range error: {operand} values span [{min}, {max}], expected [{lower}, {upper}]")]
    ValueRange {
        operand: Operand,
        min: f32,
        max: f32,
        lower: f32,
        upper: f32,
    },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Filesystem error: {operation} failed for {path:?}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Image processing error: {operation} failed (file: {path})")]
    ImageProcessing {
        path: String,
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Model error: {operation} failed")]
    Model {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Validation error: {field} {reason}")]
    Validation { field: String, reason: String },
}

pub type Result<T> = std::result::Result<T, InpaintPrepError>;

impl InpaintPrepError {
    pub fn is_shape(&self) -> bool {
        matches!(self, Self::Shape { .. })
    }

    pub fn is_type_mismatch(&self) -> bool {
        matches!(self, Self::TypeMismatch { .. })
    }

    pub fn is_value_range(&self) -> bool {
        matches!(self, Self::ValueRange { .. })
    }
}

/// Convert anyhow errors to configuration errors.
impl From<anyhow::Error> for InpaintPrepError {
    fn from(err: anyhow::Error) -> Self {
        Self::Configuration {
            message: err.to_string(),
        }
    }
}

/// Convert I/O errors to filesystem errors.
///
/// Code that knows the path and operation should construct
/// `InpaintPrepError::FileSystem` directly; this is the fallback.
impl From<std::io::Error> for InpaintPrepError {
    fn from(err: std::io::Error) -> Self {
        Self::FileSystem {
            path: PathBuf::from("unknown"),
            operation: "unknown".to_string(),
            source: err,
        }
    }
}

impl From<image::ImageError> for InpaintPrepError {
    fn from(err: image::ImageError) -> Self {
        Self::ImageProcessing {
            path: "unknown".to_string(),
            operation: "image processing".to_string(),
            source: Box::new(err),
        }
    }
}

/// Shape errors from ndarray only surface while reshaping image or mask
/// tensors, so they share the normalizer's shape category.
impl From<ndarray::ShapeError> for InpaintPrepError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::Shape {
            reason: err.to_string(),
            image: Vec::new(),
            mask: Vec::new(),
        }
    }
}

#[cfg(feature = "onnx")]
impl From<ort::Error> for InpaintPrepError {
    fn from(err: ort::Error) -> Self {
        Self::Model {
            operation: "ort operation".to_string(),
            source: Box::new(err),
        }
    }
}
