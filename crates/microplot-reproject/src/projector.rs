//! Reverse projection of plot polygons into raw images.
//!
//! Every `(plot, image)` pair is independent, so the pair space is processed
//! with rayon. Results are collected in pair order, which keeps the output
//! deterministic regardless of scheduling.

use std::collections::BTreeMap;

use log::{debug, info, warn};
use microplot_core::{CameraCalibration, PointProjection, WorldPolygon};
use nalgebra::{Point2, Vector3};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{ProjectionError, Rejection};
use crate::loader::CameraModelLoader;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Parameters for lifting 2-D plot corners into 3-D.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectorParams {
    /// Height assigned to every plot corner, in the orthomosaic's vertical
    /// datum.
    pub ground_elevation: f64,
}

impl Default for ProjectorParams {
    fn default() -> Self {
        Self {
            ground_elevation: 0.0,
        }
    }
}

/// A plot seen in one raw image.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageProjection {
    pub image_id: String,
    /// Pixel corners, same order as the world polygon.
    pub corners: [Point2<f64>; 4],
}

/// Everything the projector found out about one plot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlotProjection {
    pub plot_id: usize,
    pub range_index: usize,
    pub row_index: usize,
    /// Images containing the whole plot, in candidate order.
    pub accepted: Vec<ImageProjection>,
    /// Candidates that were not used, with the reason.
    pub rejected: Vec<(String, Rejection)>,
}

impl PlotProjection {
    /// At least one image shows the entire plot.
    pub fn is_resolved(&self) -> bool {
        !self.accepted.is_empty()
    }

    /// Table rows for this plot: one per accepted image, or a single
    /// invalid marker when no image qualified.
    pub fn records(&self) -> Vec<ReprojectionRecord> {
        if self.accepted.is_empty() {
            return vec![ReprojectionRecord::unresolved(self.plot_id)];
        }
        self.accepted
            .iter()
            .map(|img| ReprojectionRecord {
                plot_id: self.plot_id,
                image_id: Some(img.image_id.clone()),
                corners: Some(img.corners.map(|p| [p.x, p.y])),
                valid: true,
            })
            .collect()
    }
}

/// One row of the reverse projection table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReprojectionRecord {
    pub plot_id: usize,
    pub image_id: Option<String>,
    pub corners: Option<[[f64; 2]; 4]>,
    pub valid: bool,
}

impl ReprojectionRecord {
    pub fn unresolved(plot_id: usize) -> Self {
        Self {
            plot_id,
            image_id: None,
            corners: None,
            valid: false,
        }
    }
}

/// Flatten projections into table rows, plot order first.
pub fn reprojection_table(projections: &[PlotProjection]) -> Vec<ReprojectionRecord> {
    projections.iter().flat_map(PlotProjection::records).collect()
}

/// Project the four world corners of a polygon through one camera.
///
/// The polygon is accepted only if every corner is in front of the camera and
/// inside the image.
pub fn project_polygon(
    camera: &CameraCalibration,
    polygon: &WorldPolygon,
    ground_elevation: f64,
) -> Result<[Point2<f64>; 4], Rejection> {
    let mut out = [Point2::origin(); 4];
    let mut outside = false;
    for (slot, corner) in out.iter_mut().zip(polygon.corners.iter()) {
        match camera.project(Vector3::new(corner.x, corner.y, ground_elevation)) {
            PointProjection::Behind { .. } => return Err(Rejection::NegativeDepth),
            PointProjection::Pixel(px) => {
                outside |= !camera.contains(px);
                *slot = px;
            }
        }
    }
    if outside {
        return Err(Rejection::OutOfBounds);
    }
    Ok(out)
}

pub struct ReverseProjector<'a, L: CameraModelLoader + ?Sized> {
    loader: &'a L,
    params: ProjectorParams,
}

impl<'a, L: CameraModelLoader + ?Sized> ReverseProjector<'a, L> {
    pub fn new(loader: &'a L, params: ProjectorParams) -> Self {
        Self { loader, params }
    }

    pub fn params(&self) -> &ProjectorParams {
        &self.params
    }

    /// Find, for every plot, the raw images that contain it entirely.
    ///
    /// Fails only when the polygons are not georeferenced; unresolved plots
    /// are part of the result.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip(self, polygons), fields(plots = polygons.len()))
    )]
    pub fn project(&self, polygons: &[WorldPolygon]) -> Result<Vec<PlotProjection>, ProjectionError> {
        if let Some(p) = polygons.iter().find(|p| !p.is_georeferenced()) {
            warn!(
                "plot {} has no coordinate reference; skipping reverse projection",
                p.plot_id
            );
            return Err(ProjectionError::GeoreferenceUnavailable);
        }

        // one lookup per image, shared by all plots
        let cameras: Vec<(String, Option<CameraCalibration>)> = self
            .loader
            .list_candidate_images()
            .into_iter()
            .map(|id| {
                let cal = self.loader.calibration(&id);
                if cal.is_none() {
                    warn!("no calibration for raw image {id}; excluded from reverse projection");
                }
                (id, cal)
            })
            .collect();
        if cameras.is_empty() {
            warn!("no candidate raw images");
        }

        let n_images = cameras.len();
        let elevation = self.params.ground_elevation;
        let outcomes: Vec<Result<[Point2<f64>; 4], Rejection>> = (0..polygons.len() * n_images)
            .into_par_iter()
            .map(|k| {
                let polygon = &polygons[k / n_images];
                match &cameras[k % n_images].1 {
                    Some(camera) => project_polygon(camera, polygon, elevation),
                    None => Err(Rejection::CalibrationMissing),
                }
            })
            .collect();

        let mut rejection_counts: BTreeMap<String, usize> = BTreeMap::new();
        let mut projections = Vec::with_capacity(polygons.len());
        for (i, polygon) in polygons.iter().enumerate() {
            let mut accepted = Vec::new();
            let mut rejected = Vec::new();
            let row = &outcomes[i * n_images..(i + 1) * n_images];
            for ((image_id, _), outcome) in cameras.iter().zip(row) {
                match outcome {
                    Ok(corners) => accepted.push(ImageProjection {
                        image_id: image_id.clone(),
                        corners: *corners,
                    }),
                    Err(reason) => {
                        *rejection_counts.entry(format!("{reason:?}")).or_default() += 1;
                        rejected.push((image_id.clone(), *reason));
                    }
                }
            }
            if accepted.is_empty() {
                debug!("plot {} is not fully visible in any raw image", polygon.plot_id);
            }
            projections.push(PlotProjection {
                plot_id: polygon.plot_id,
                range_index: polygon.range_index,
                row_index: polygon.row_index,
                accepted,
                rejected,
            });
        }

        let resolved = projections.iter().filter(|p| p.is_resolved()).count();
        info!(
            "reverse projection: {} of {} plots resolved over {} images, rejections {:?}",
            resolved,
            projections.len(),
            n_images,
            rejection_counts
        );
        Ok(projections)
    }
}
