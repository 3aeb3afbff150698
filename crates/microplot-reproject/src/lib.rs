//! Reverse projection of micro-plots into raw aerial images.
//!
//! Plot polygons exported by `microplot-core` are in the orthomosaic's world
//! frame. Given the photogrammetric calibration of every raw photo, the
//! [`ReverseProjector`] finds the photos that show each plot entirely and the
//! pixel corners of the plot in them.
//!
//! Calibrations come through the [`CameraModelLoader`] trait. Two providers
//! ship with the crate: [`InMemoryCameraModels`] and the [`Pix4dProject`]
//! reader for Pix4D `*_calibrated_camera_parameters.txt` exports.
//!
//! ```no_run
//! use std::path::Path;
//! use microplot_reproject::{Pix4dProject, ProjectorParams, ReverseProjector};
//!
//! # fn run(polygons: &[microplot_core::WorldPolygon]) -> Result<(), Box<dyn std::error::Error>> {
//! let project = Pix4dProject::discover(Path::new("field_project"), Some(Path::new("raw")))?;
//! let projector = ReverseProjector::new(&project, ProjectorParams::default());
//! for plot in projector.project(polygons)? {
//!     println!("plot {}: {} images", plot.plot_id, plot.accepted.len());
//! }
//! # Ok(())
//! # }
//! ```

mod error;
mod loader;
mod pix4d;
mod projector;

pub use error::{CalibrationError, ProjectionError, Rejection};
pub use loader::{CameraModelLoader, InMemoryCameraModels};
pub use pix4d::{list_raw_images, parse_calibrated_camera_parameters, parse_offset, Pix4dProject};
pub use projector::{
    project_polygon, reprojection_table, ImageProjection, PlotProjection, ProjectorParams,
    ReprojectionRecord, ReverseProjector,
};
