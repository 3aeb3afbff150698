//! Calibrated frame camera: pinhole intrinsics, Brown-Conrady distortion and
//! a world pose.
//!
//! World points are mapped with `x_cam = R (X - C)`, divided by depth,
//! distorted in normalized coordinates and finally scaled to pixels. The
//! camera looks along `+z` of its own frame; `x` points right and `y` down in
//! the image.

use nalgebra::{Matrix3, Point2, Vector3};
use serde::{Deserialize, Serialize};

/// Pinhole camera intrinsics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CameraIntrinsics {
    /// Focal length in x (pixels).
    pub fx: f64,
    /// Focal length in y (pixels).
    pub fy: f64,
    /// Principal point x (pixels).
    pub cx: f64,
    /// Principal point y (pixels).
    pub cy: f64,
}

impl CameraIntrinsics {
    pub fn is_valid(self) -> bool {
        [self.fx, self.fy, self.cx, self.cy]
            .iter()
            .all(|v| v.is_finite())
            && self.fx.abs() > 1e-12
            && self.fy.abs() > 1e-12
    }

    pub fn normalized_to_pixel(self, xy: [f64; 2]) -> Point2<f64> {
        Point2::new(self.fx * xy[0] + self.cx, self.fy * xy[1] + self.cy)
    }
}

/// Brown-Conrady radial-tangential distortion coefficients.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct RadialTangentialDistortion {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64,
}

impl RadialTangentialDistortion {
    pub fn is_zero(self) -> bool {
        [self.k1, self.k2, self.p1, self.p2, self.k3]
            .iter()
            .all(|&v| v == 0.0)
    }

    /// Forward distortion of normalized coordinates.
    pub fn distort_normalized(self, xy: [f64; 2]) -> [f64; 2] {
        let (x, y) = (xy[0], xy[1]);
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;
        let radial = 1.0 + self.k1 * r2 + self.k2 * r4 + self.k3 * r6;
        let x_tan = 2.0 * self.p1 * x * y + self.p2 * (r2 + 2.0 * x * x);
        let y_tan = self.p1 * (r2 + 2.0 * y * y) + 2.0 * self.p2 * x * y;
        [x * radial + x_tan, y * radial + y_tan]
    }
}

/// Camera orientation and centre in the world frame of the orthomosaic.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CameraPose {
    /// World to camera rotation.
    pub rotation: Matrix3<f64>,
    /// Camera centre in world coordinates.
    pub position: Vector3<f64>,
}

impl CameraPose {
    pub fn new(rotation: Matrix3<f64>, position: Vector3<f64>) -> Self {
        Self { rotation, position }
    }

    /// Straight-down camera at `position`: image `x` along world `+x`,
    /// image `y` along world `-y`, optical axis along world `-z`.
    pub fn nadir(position: Vector3<f64>) -> Self {
        Self::new(
            Matrix3::new(1.0, 0.0, 0.0, 0.0, -1.0, 0.0, 0.0, 0.0, -1.0),
            position,
        )
    }

    pub fn world_to_camera(&self, world: Vector3<f64>) -> Vector3<f64> {
        self.rotation * (world - self.position)
    }
}

/// Result of projecting one world point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointProjection {
    /// In front of the camera; pixel may still be outside the sensor.
    Pixel(Point2<f64>),
    /// Depth `<= 0`.
    Behind { depth: f64 },
}

/// Everything needed to project a world point into one raw image.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CameraCalibration {
    pub intrinsics: CameraIntrinsics,
    pub distortion: RadialTangentialDistortion,
    pub pose: CameraPose,
    /// Image size in pixels.
    pub width: u32,
    pub height: u32,
}

impl CameraCalibration {
    pub fn project(&self, world: Vector3<f64>) -> PointProjection {
        let p = self.pose.world_to_camera(world);
        if !p.z.is_finite() || p.z <= 0.0 {
            return PointProjection::Behind { depth: p.z };
        }
        let xd = self.distortion.distort_normalized([p.x / p.z, p.y / p.z]);
        PointProjection::Pixel(self.intrinsics.normalized_to_pixel(xd))
    }

    /// `0 <= u < width` and `0 <= v < height`.
    pub fn contains(&self, px: Point2<f64>) -> bool {
        px.x >= 0.0 && px.y >= 0.0 && px.x < f64::from(self.width) && px.y < f64::from(self.height)
    }
}
