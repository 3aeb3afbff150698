//! High-level facade for the `microplot-*` workspace.
//!
//! This crate provides:
//! - re-exports of the geometry core and the reverse projection crate
//! - the extraction pipeline with its [`Outcome`] codes
//! - Excess Green binarization of RGB orthomosaics
//! - JSON run configuration plus GeoJSON/CSV writers
//! - (feature `image`) a file-driven [`run::run`] used by the `microplot` CLI
//!
//! ## Quickstart
//!
//! ```no_run
//! use microplot::core::{BinaryMask, CropOffset, Orientation, PlotLayout, SegmentParams};
//! use microplot::{extract_plots, ExtractionParams};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // 12 ranges of plants (25 px tall) crossed by 9 rows (70 px wide)
//! let mask = BinaryMask::from_fn(1000, 500, |x, y| {
//!     let in_range = y >= 4 && (y - 4) / 41 < 12 && (y - 4) % 41 < 25;
//!     let in_row = x >= 20 && (x - 20) / 110 < 9 && (x - 20) % 110 < 70;
//!     in_range && in_row
//! });
//! let params = ExtractionParams {
//!     plot: PlotLayout::new(2, 3, Orientation::Horizontal),
//!     noise_pixels: 50,
//!     // gaps between ranges are narrower than the noise size
//!     segments: SegmentParams { min_run: Some(10), ..SegmentParams::default() },
//! };
//! let extraction = extract_plots(&mask, CropOffset::default(), None, &params)?;
//! println!("{:?}: {} plots", extraction.outcome, extraction.polygons.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `microplot::core`: masks, profiles, segments, plot grids, georeferencing, camera model.
//! - `microplot::reproject`: camera model loaders, Pix4D reader, reverse projector.
//! - `microplot::vegetation`: ExG index and Otsu thresholding.
//! - `microplot::io`: run config, report and output writers.
//! - `microplot::run` (feature `image`): load inputs from disk and run everything.

pub use microplot_core as core;
pub use microplot_reproject as reproject;

mod error;
pub mod io;
mod pipeline;
pub mod vegetation;

#[cfg(feature = "image")]
pub mod run;

pub use error::PipelineError;
pub use pipeline::{
    extract_plots, reverse_project, reverse_projection_table, Extraction, ExtractionParams,
    Outcome,
};

pub use microplot_core::{init_with_level, PlotGrid, PlotLayout, WorldPolygon};

#[cfg(feature = "tracing")]
pub use microplot_core::init_tracing;
