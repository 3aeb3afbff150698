use std::path::PathBuf;

use crate::core::{ConfigError, MaskError};
use crate::reproject::CalibrationError;

/// Errors produced by the pipeline and its file helpers.
///
/// Segmentation failures are not errors; they are reported through
/// [`crate::Outcome`].
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Mask(#[from] MaskError),

    #[error(transparent)]
    Calibration(#[from] CalibrationError),

    #[error("reverse projection needs `calibration_path` or `pix4d_project`")]
    NoCalibrationSource,

    #[error("invalid RGB buffer length (expected {expected} bytes, got {got})")]
    InvalidRgbBuffer { expected: usize, got: usize },

    #[error("field mask is {mask_width}x{mask_height} but the image is {width}x{height}")]
    FieldSizeMismatch {
        mask_width: usize,
        mask_height: usize,
        width: usize,
        height: usize,
    },

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[cfg(feature = "image")]
    #[error(transparent)]
    Image(#[from] image::ImageError),
}

impl PipelineError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| PipelineError::Io { path, source }
    }
}
