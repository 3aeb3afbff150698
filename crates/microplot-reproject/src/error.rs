use std::path::PathBuf;

/// Failures while reading photogrammetry calibration files.
#[derive(thiserror::Error, Debug)]
pub enum CalibrationError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}:{line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },
    #[error("no file matching *{suffix} in {dir}")]
    MissingFile { dir: PathBuf, suffix: &'static str },
}

/// Fatal reverse projection errors.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionError {
    #[error("plot polygons are in pixel space; reverse projection needs a georeferenced orthomosaic")]
    GeoreferenceUnavailable,
}

/// Why a raw image was not used for a plot. Diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    /// The loader has no calibration for the image.
    CalibrationMissing,
    /// At least one corner is at or behind the camera.
    NegativeDepth,
    /// At least one corner falls outside the image.
    OutOfBounds,
}
