//! Core geometry for micro-plot extraction.
//!
//! Everything in this crate is pure and works on in-memory values: a binary
//! vegetation mask goes in, a grid of plot rectangles and their world polygons
//! come out. Image decoding, file formats and the reverse projection into raw
//! photos live in the `microplot-reproject` and `microplot` crates.
//!
//! The stages, leaf first:
//!
//! 1. [`axis_profile`] collapses a [`BinaryMask`] onto one image axis.
//! 2. [`detect_segments`] splits a profile into plant and gap runs.
//! 3. [`build_plot_grid`] groups the range and row segments into plots.
//! 4. [`export_world_polygons`] maps plot corners through the crop offset and
//!    the raster [`AffineTransform`].
//!
//! [`CameraCalibration`] holds the per-image camera model used for reverse
//! projection.

mod camera;
mod error;
mod georef;
mod grid;
mod logger;
mod mask;
mod profile;
mod segments;

pub use camera::{
    CameraCalibration, CameraIntrinsics, CameraPose, PointProjection, RadialTangentialDistortion,
};
pub use error::{ConfigError, GridError, MaskError};
pub use georef::{export_world_polygons, AffineTransform, Georeference, WorldPolygon};
pub use grid::{build_plot_grid, grid_from_mask, Orientation, PlotCell, PlotGrid, PlotLayout};
pub use mask::{draw_mask, polygon_mask, BinaryMask, CropOffset, PixelBounds};
pub use profile::{axis_profile, Axis, AxisProfile};
pub use segments::{
    detect_segments, plant_segments, smooth_profile, Segment, SegmentLabel, SegmentParams,
};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::init_with_level;
