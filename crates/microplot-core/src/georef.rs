//! Pixel to world conversion of plot rectangles.

use log::debug;
use nalgebra::{Matrix3, Point2};
use serde::{Deserialize, Serialize};

use crate::grid::PlotGrid;
use crate::mask::CropOffset;

/// North-up or rotated raster georeferencing.
///
/// Coefficients follow the rasterio/affine ordering:
/// `x = a*col + b*row + c`, `y = d*col + e*row + f`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 6]", into = "[f64; 6]")]
pub struct AffineTransform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl AffineTransform {
    pub fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    /// From a GDAL geotransform `[c, a, b, f, d, e]`.
    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self::new(gt[1], gt[2], gt[0], gt[4], gt[5], gt[3])
    }

    pub fn to_gdal(&self) -> [f64; 6] {
        [self.c, self.a, self.b, self.f, self.d, self.e]
    }

    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(self.a, self.b, self.c, self.d, self.e, self.f, 0.0, 0.0, 1.0)
    }

    #[inline]
    pub fn apply(&self, p: Point2<f64>) -> Point2<f64> {
        Point2::new(
            self.a * p.x + self.b * p.y + self.c,
            self.d * p.x + self.e * p.y + self.f,
        )
    }

    /// World to pixel transform, `None` for a singular linear part.
    pub fn inverse(&self) -> Option<Self> {
        let inv = self.matrix().try_inverse()?;
        Some(Self::new(
            inv[(0, 0)],
            inv[(0, 1)],
            inv[(0, 2)],
            inv[(1, 0)],
            inv[(1, 1)],
            inv[(1, 2)],
        ))
    }
}

impl From<[f64; 6]> for AffineTransform {
    fn from(v: [f64; 6]) -> Self {
        Self::new(v[0], v[1], v[2], v[3], v[4], v[5])
    }
}

impl From<AffineTransform> for [f64; 6] {
    fn from(t: AffineTransform) -> Self {
        [t.a, t.b, t.c, t.d, t.e, t.f]
    }
}

/// Affine transform plus the coordinate reference it maps into.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Georeference {
    pub transform: AffineTransform,
    /// CRS identifier as given by the raster, e.g. `EPSG:32654`.
    pub crs: String,
}

impl Georeference {
    pub fn new(transform: AffineTransform, crs: impl Into<String>) -> Self {
        Self {
            transform,
            crs: crs.into(),
        }
    }
}

/// A plot's corners in world coordinates (or full-image pixels when the
/// raster carries no georeference).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorldPolygon {
    pub plot_id: usize,
    pub range_index: usize,
    pub row_index: usize,
    /// Top-left, top-right, bottom-right, bottom-left.
    pub corners: [Point2<f64>; 4],
    pub crs: Option<String>,
}

impl WorldPolygon {
    pub fn is_georeferenced(&self) -> bool {
        self.crs.is_some()
    }

    /// Closed ring, first corner repeated at the end.
    pub fn ring(&self) -> [[f64; 2]; 5] {
        let c = &self.corners;
        [
            [c[0].x, c[0].y],
            [c[1].x, c[1].y],
            [c[2].x, c[2].y],
            [c[3].x, c[3].y],
            [c[0].x, c[0].y],
        ]
    }
}

/// Map every grid cell through the crop offset and, if present, the raster
/// georeference.
pub fn export_world_polygons(
    grid: &PlotGrid,
    offset: CropOffset,
    georef: Option<&Georeference>,
) -> Vec<WorldPolygon> {
    let polygons: Vec<WorldPolygon> = grid
        .cells
        .iter()
        .map(|cell| {
            let corners = cell.corners().map(|(px, py)| {
                let full = Point2::new((px + offset.x0) as f64, (py + offset.y0) as f64);
                match georef {
                    Some(g) => g.transform.apply(full),
                    None => full,
                }
            });
            WorldPolygon {
                plot_id: cell.plot_id,
                range_index: cell.range_index,
                row_index: cell.row_index,
                corners,
                crs: georef.map(|g| g.crs.clone()),
            }
        })
        .collect();

    debug!(
        "exported {} plot polygons ({})",
        polygons.len(),
        georef.map_or("pixel space", |g| g.crs.as_str())
    );
    polygons
}
