//! End-to-end plot extraction on an in-memory mask.

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::core::{
    export_world_polygons, grid_from_mask, BinaryMask, ConfigError, CropOffset, Georeference,
    GridError, MaskError, PlotGrid, PlotLayout, SegmentParams, WorldPolygon,
};
use crate::error::PipelineError;
use crate::reproject::{
    reprojection_table, CameraModelLoader, PlotProjection, ProjectorParams, ReprojectionRecord,
    ReverseProjector,
};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Parameters of one extraction run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExtractionParams {
    pub plot: PlotLayout,
    /// Connected components below this size are noise; also the default
    /// minimum plant and gap run of the segment detector.
    pub noise_pixels: usize,
    #[serde(default)]
    pub segments: SegmentParams,
}

impl Default for ExtractionParams {
    fn default() -> Self {
        Self {
            plot: PlotLayout::default(),
            noise_pixels: 200,
            segments: SegmentParams::default(),
        }
    }
}

impl ExtractionParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.plot.validate()?;
        if self.noise_pixels == 0 {
            return Err(ConfigError::ZeroNoise);
        }
        self.segments.validate()
    }
}

/// Status of an extraction, mirroring what the user has to do next.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Plots extracted in world coordinates.
    Ok,
    /// Too few range segments; re-tune noise or layout.
    NoRangesDetected,
    /// Too few row segments; re-tune noise or layout.
    NoRowsDetected,
    /// Plots extracted, but only in pixel coordinates.
    GeoreferenceUnavailable,
}

impl Outcome {
    /// Whether plot polygons were produced.
    pub fn has_plots(self) -> bool {
        matches!(self, Outcome::Ok | Outcome::GeoreferenceUnavailable)
    }
}

impl From<GridError> for Outcome {
    fn from(err: GridError) -> Self {
        match err {
            GridError::NoRangesDetected { .. } => Outcome::NoRangesDetected,
            GridError::NoRowsDetected { .. } => Outcome::NoRowsDetected,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    pub outcome: Outcome,
    /// Present when segmentation succeeded.
    pub grid: Option<PlotGrid>,
    /// One polygon per plot; empty unless [`Outcome::has_plots`].
    pub polygons: Vec<WorldPolygon>,
    pub offset: CropOffset,
}

/// Segment `mask` into plots and export their polygons.
///
/// `mask` is the cropped field mask and `offset` its position in the full
/// orthomosaic. Segmentation failures are reported through
/// [`Extraction::outcome`]. Invalid parameters and a mask without any
/// vegetation pixel are errors.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(mask, georef, params), fields(width = mask.width, height = mask.height))
)]
pub fn extract_plots(
    mask: &BinaryMask,
    offset: CropOffset,
    georef: Option<&Georeference>,
    params: &ExtractionParams,
) -> Result<Extraction, PipelineError> {
    params.validate()?;
    if mask.width == 0 || mask.height == 0 {
        return Err(MaskError::InvalidDimensions {
            width: mask.width,
            height: mask.height,
        }
        .into());
    }
    if mask.is_empty() {
        return Err(MaskError::Empty.into());
    }

    let grid = match grid_from_mask(mask, params.noise_pixels, &params.segments, &params.plot) {
        Ok(grid) => grid,
        Err(err) => {
            warn!("plot extraction stopped: {err}");
            return Ok(Extraction {
                outcome: err.into(),
                grid: None,
                polygons: Vec::new(),
                offset,
            });
        }
    };

    let polygons = export_world_polygons(&grid, offset, georef);
    let outcome = if georef.is_some() {
        Outcome::Ok
    } else {
        warn!("orthomosaic is not georeferenced; plot polygons stay in pixel coordinates");
        Outcome::GeoreferenceUnavailable
    };
    info!(
        "extracted {} plots ({} ranges x {} rows)",
        grid.len(),
        grid.range_count,
        grid.row_count
    );

    Ok(Extraction {
        outcome,
        grid: Some(grid),
        polygons,
        offset,
    })
}

/// Reverse projection step of the pipeline.
///
/// Only an [`Outcome::Ok`] extraction is projected; for any other outcome the
/// table is empty.
pub fn reverse_project<L: CameraModelLoader + ?Sized>(
    extraction: &Extraction,
    loader: &L,
    params: ProjectorParams,
) -> Vec<PlotProjection> {
    if extraction.outcome != Outcome::Ok {
        return Vec::new();
    }
    match ReverseProjector::new(loader, params).project(&extraction.polygons) {
        Ok(projections) => projections,
        Err(err) => {
            warn!("{err}");
            Vec::new()
        }
    }
}

/// Table rows of [`reverse_project`].
pub fn reverse_projection_table<L: CameraModelLoader + ?Sized>(
    extraction: &Extraction,
    loader: &L,
    params: ProjectorParams,
) -> Vec<ReprojectionRecord> {
    reprojection_table(&reverse_project(extraction, loader, params))
}
