//! Binary occupancy masks.
//!
//! A mask is the only raster the segmentation stages consume. Besides the
//! container itself this module holds the two raster operations that prepare
//! a mask: rasterising the field polygon (with the crop offset that comes out
//! of it) and removing connected components below the noise size.

use std::collections::VecDeque;

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::error::MaskError;

/// Offset of a cropped mask inside the full field image, in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropOffset {
    pub y0: usize,
    pub x0: usize,
}

impl CropOffset {
    pub fn new(y0: usize, x0: usize) -> Self {
        Self { y0, x0 }
    }
}

/// Inclusive-exclusive pixel rectangle `[x0, x1) x [y0, y1)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelBounds {
    pub x0: usize,
    pub y0: usize,
    pub x1: usize,
    pub y1: usize,
}

impl PixelBounds {
    pub fn width(&self) -> usize {
        self.x1 - self.x0
    }

    pub fn height(&self) -> usize {
        self.y1 - self.y0
    }
}

/// Row-major occupancy grid, origin top-left. Non-zero bytes are occupied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BinaryMask {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl BinaryMask {
    /// All-background mask.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; width * height],
        }
    }

    /// Wrap an existing buffer, checking its length.
    pub fn from_raw(width: usize, height: usize, data: Vec<u8>) -> Result<Self, MaskError> {
        if width == 0 || height == 0 {
            return Err(MaskError::InvalidDimensions { width, height });
        }
        let Some(expected) = width.checked_mul(height) else {
            return Err(MaskError::InvalidDimensions { width, height });
        };
        if data.len() != expected {
            return Err(MaskError::InvalidBuffer {
                expected,
                got: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> bool) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(if f(x, y) { 255 } else { 0 });
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> bool {
        self.data[y * self.width + x] != 0
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, occupied: bool) {
        self.data[y * self.width + x] = if occupied { 255 } else { 0 };
    }

    pub fn row(&self, y: usize) -> &[u8] {
        &self.data[y * self.width..(y + 1) * self.width]
    }

    pub fn occupied_count(&self) -> usize {
        self.data.iter().filter(|&&v| v != 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.data.iter().all(|&v| v == 0)
    }

    /// Tight bounding box of the occupied pixels.
    pub fn content_bounds(&self) -> Option<PixelBounds> {
        let mut bounds: Option<PixelBounds> = None;
        for y in 0..self.height {
            let row = self.row(y);
            let Some(first) = row.iter().position(|&v| v != 0) else {
                continue;
            };
            let last = row.iter().rposition(|&v| v != 0).unwrap_or(first);
            bounds = Some(match bounds {
                None => PixelBounds {
                    x0: first,
                    y0: y,
                    x1: last + 1,
                    y1: y + 1,
                },
                Some(b) => PixelBounds {
                    x0: b.x0.min(first),
                    y0: b.y0,
                    x1: b.x1.max(last + 1),
                    y1: y + 1,
                },
            });
        }
        bounds
    }

    /// Copy out a sub-rectangle. `bounds` must lie inside the mask.
    pub fn crop(&self, bounds: PixelBounds) -> BinaryMask {
        let mut data = Vec::with_capacity(bounds.width() * bounds.height());
        for y in bounds.y0..bounds.y1 {
            data.extend_from_slice(&self.row(y)[bounds.x0..bounds.x1]);
        }
        BinaryMask {
            width: bounds.width(),
            height: bounds.height(),
            data,
        }
    }

    /// Drop the empty border and report where the remaining block sat.
    pub fn crop_to_content(&self) -> Result<(BinaryMask, CropOffset), MaskError> {
        let bounds = self.content_bounds().ok_or(MaskError::Empty)?;
        Ok((self.crop(bounds), CropOffset::new(bounds.y0, bounds.x0)))
    }

    /// Clear every 4-connected component with fewer than `min_size` pixels.
    pub fn remove_small_objects(&self, min_size: usize) -> BinaryMask {
        let mut out = self.clone();
        if min_size <= 1 {
            return out;
        }

        let (w, h) = (self.width, self.height);
        let mut visited = vec![false; w * h];
        let mut queue = VecDeque::new();
        let mut component = Vec::new();

        for start in 0..w * h {
            if visited[start] || self.data[start] == 0 {
                continue;
            }
            visited[start] = true;
            queue.push_back(start);
            component.clear();

            while let Some(idx) = queue.pop_front() {
                component.push(idx);
                let (x, y) = (idx % w, idx / w);
                let mut visit = |n: usize| {
                    if !visited[n] && self.data[n] != 0 {
                        visited[n] = true;
                        queue.push_back(n);
                    }
                };
                if x > 0 {
                    visit(idx - 1);
                }
                if x + 1 < w {
                    visit(idx + 1);
                }
                if y > 0 {
                    visit(idx - w);
                }
                if y + 1 < h {
                    visit(idx + w);
                }
            }

            if component.len() < min_size {
                for &idx in &component {
                    out.data[idx] = 0;
                }
            }
        }

        out
    }
}

/// Rasterise a closed polygon into a `width x height` mask.
///
/// A pixel is inside when its centre is inside the polygon (even-odd rule).
/// Vertices are in full-image pixel coordinates and need not close the ring.
pub fn polygon_mask(
    width: usize,
    height: usize,
    vertices: &[Point2<f64>],
) -> Result<BinaryMask, MaskError> {
    if vertices.len() < 3 {
        return Err(MaskError::DegeneratePolygon(vertices.len()));
    }
    if width == 0 || height == 0 {
        return Err(MaskError::InvalidDimensions { width, height });
    }

    let mut mask = BinaryMask::new(width, height);
    let mut crossings: Vec<f64> = Vec::with_capacity(vertices.len());
    let n = vertices.len();

    for y in 0..height {
        let yc = y as f64 + 0.5;
        crossings.clear();
        for i in 0..n {
            let a = vertices[i];
            let b = vertices[(i + 1) % n];
            // half-open rule so shared vertices are counted once
            if (a.y <= yc && b.y > yc) || (b.y <= yc && a.y > yc) {
                let t = (yc - a.y) / (b.y - a.y);
                crossings.push(a.x + t * (b.x - a.x));
            }
        }
        crossings.sort_by(|l, r| l.partial_cmp(r).unwrap_or(std::cmp::Ordering::Equal));

        for pair in crossings.chunks_exact(2) {
            // pixel x is inside when pair[0] <= x + 0.5 < pair[1]
            let start = (pair[0] - 0.5).ceil().max(0.0) as usize;
            let end = ((pair[1] - 0.5).ceil().max(0.0) as usize).min(width);
            for x in start..end {
                mask.set(x, y, true);
            }
        }
    }

    Ok(mask)
}

/// The pure field-drawing step: rasterise the field outline and crop to it.
///
/// Returns the polygon mask restricted to its bounding box together with the
/// offset of that box in the full image. Callers apply the mask to whatever
/// raster they hold (RGB orthomosaic or pre-binarized map).
pub fn draw_mask(
    width: usize,
    height: usize,
    vertices: &[Point2<f64>],
) -> Result<(BinaryMask, CropOffset), MaskError> {
    polygon_mask(width, height, vertices)?.crop_to_content()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_raw_checks_buffer_length() {
        let err = BinaryMask::from_raw(3, 2, vec![0; 5]).unwrap_err();
        assert_eq!(
            err,
            MaskError::InvalidBuffer {
                expected: 6,
                got: 5
            }
        );
        assert!(BinaryMask::from_raw(0, 2, Vec::new()).is_err());
    }

    #[test]
    fn crop_to_content_reports_offset() {
        let mask = BinaryMask::from_fn(20, 10, |x, y| (4..9).contains(&x) && (2..7).contains(&y));
        let (cropped, offset) = mask.crop_to_content().expect("non-empty");
        assert_eq!(offset, CropOffset::new(2, 4));
        assert_eq!((cropped.width, cropped.height), (5, 5));
        assert_eq!(cropped.occupied_count(), 25);
    }

    #[test]
    fn crop_to_content_rejects_empty_mask() {
        let mask = BinaryMask::new(8, 8);
        assert_eq!(mask.crop_to_content().unwrap_err(), MaskError::Empty);
    }

    #[test]
    fn small_components_are_removed() {
        // 3x3 blob (9 px), single pixel, diagonal pair (two 1 px components)
        let mask = BinaryMask::from_fn(12, 12, |x, y| {
            (1..4).contains(&x) && (1..4).contains(&y)
                || (x == 8 && y == 8)
                || (x == 10 && y == 1)
                || (x == 11 && y == 2)
        });
        let cleaned = mask.remove_small_objects(2);
        assert_eq!(cleaned.occupied_count(), 9);
        assert!(cleaned.get(2, 2));
        assert!(!cleaned.get(8, 8));
        assert!(!cleaned.get(10, 1));

        let strict = mask.remove_small_objects(10);
        assert!(strict.is_empty());
    }

    #[test]
    fn polygon_mask_fills_axis_aligned_square() {
        let square = [
            Point2::new(2.0, 3.0),
            Point2::new(7.0, 3.0),
            Point2::new(7.0, 8.0),
            Point2::new(2.0, 8.0),
        ];
        let mask = polygon_mask(10, 10, &square).expect("valid polygon");
        assert_eq!(mask.occupied_count(), 25);
        assert!(mask.get(2, 3));
        assert!(mask.get(6, 7));
        assert!(!mask.get(7, 7));
        assert!(!mask.get(1, 5));
    }

    #[test]
    fn draw_mask_crops_triangle() {
        let tri = [
            Point2::new(10.0, 10.0),
            Point2::new(30.0, 10.0),
            Point2::new(10.0, 30.0),
        ];
        let (mask, offset) = draw_mask(50, 40, &tri).expect("valid polygon");
        assert_eq!(offset, CropOffset::new(10, 10));
        // pixel centres on the hypotenuse are outside
        assert_eq!(mask.width, 19);
        assert_eq!(mask.height, 19);
        assert!(mask.get(0, 0));
        assert!(mask.get(18, 0));
        assert!(!mask.get(18, 18));
    }

    #[test]
    fn polygon_mask_needs_three_vertices() {
        let line = [Point2::new(0.0, 0.0), Point2::new(5.0, 5.0)];
        assert_eq!(
            polygon_mask(10, 10, &line).unwrap_err(),
            MaskError::DegeneratePolygon(2)
        );
    }
}
