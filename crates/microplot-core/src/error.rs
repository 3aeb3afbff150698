/// Invalid parameters. Fatal for a run; the caller must fix the input.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("rows per plot must be at least 1")]
    ZeroRowsPerPlot,
    #[error("columns per plot must be at least 1")]
    ZeroColumnsPerPlot,
    #[error("noise size must be at least 1 pixel")]
    ZeroNoise,
    #[error("segment minimum run override must be at least 1 pixel")]
    ZeroMinRun,
    #[error("smoothing window must be at least 1 sample")]
    ZeroSmoothingWindow,
    #[error("density floor must lie in [0, 1), got {0}")]
    InvalidDensityFloor(f32),
    #[error("unknown plot orientation {0:?} (expected horizontal or vertical)")]
    InvalidOrientation(String),
}

/// Problems with a mask or the polygon used to build it.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MaskError {
    #[error("mask has no occupied pixels")]
    Empty,
    #[error("invalid mask dimensions (width={width}, height={height})")]
    InvalidDimensions { width: usize, height: usize },
    #[error("invalid mask buffer length (expected {expected} bytes, got {got})")]
    InvalidBuffer { expected: usize, got: usize },
    #[error("field polygon needs at least 3 vertices, got {0}")]
    DegeneratePolygon(usize),
}

/// Recoverable segmentation failures.
///
/// These are not crashes: the caller is expected to re-tune the noise size
/// or the plot layout and try again.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridError {
    #[error("no range detected (found {found} range segments, need {needed} per plot)")]
    NoRangesDetected { found: usize, needed: usize },
    #[error("no row detected (found {found} row segments, need {needed} per plot)")]
    NoRowsDetected { found: usize, needed: usize },
}
