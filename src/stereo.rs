use crate::sync::FrameTuple;
use crate::utils::bbox::Rect;
use image::{ImageBuffer, Luma};
use log::debug;
use nalgebra::{Matrix3x4, Point3};
use serde::{Deserialize, Serialize};

/// Maximal vertical offset, in pixels, between the left and right box centers
pub const DEFAULT_MAX_VERTICAL_OFFSET: f32 = 10.0;

/// Minimal left/right box width ratio
pub const DEFAULT_MIN_WIDTH_RATIO: f32 = 0.5;

/// Maximal left/right box width ratio
pub const DEFAULT_MAX_WIDTH_RATIO: f32 = 1.5;

/// Set of 3D points in the left camera frame
pub type PointCloud = Vec<Point3<f32>>;

/// Single channel floating point disparity map
pub type DisparityMap = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Calibration of one camera of the rig
///
#[derive(Clone, Debug, PartialEq)]
pub struct CameraInfo {
    pub width: u32,
    pub height: u32,
    /// row-major 3x4 projection matrix
    pub projection: [f64; 12],
}

impl CameraInfo {
    pub fn new(width: u32, height: u32, projection: [f64; 12]) -> Self {
        Self {
            width,
            height,
            projection,
        }
    }

    /// Camera without skew and translation
    ///
    pub fn from_intrinsics(width: u32, height: u32, fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self::new(
            width,
            height,
            [fx, 0.0, cx, 0.0, 0.0, fy, cy, 0.0, 0.0, 0.0, 1.0, 0.0],
        )
    }

    pub fn projection_matrix(&self) -> Matrix3x4<f64> {
        Matrix3x4::from_row_slice(&self.projection)
    }

    pub fn fx(&self) -> f64 {
        self.projection[0]
    }

    pub fn fy(&self) -> f64 {
        self.projection[5]
    }

    pub fn cx(&self) -> f64 {
        self.projection[2]
    }

    pub fn cy(&self) -> f64 {
        self.projection[6]
    }
}

/// Disparity map with the stereo parameters needed to turn it into depth
///
#[derive(Clone, Debug)]
pub struct DisparityImage {
    pub image: DisparityMap,
    /// focal length, pixels
    pub focal_length: f32,
    /// baseline, meters
    pub baseline: f32,
    pub min_disparity: f32,
    pub max_disparity: f32,
}

impl DisparityImage {
    pub fn new(
        image: DisparityMap,
        focal_length: f32,
        baseline: f32,
        min_disparity: f32,
        max_disparity: f32,
    ) -> Self {
        Self {
            image,
            focal_length,
            baseline,
            min_disparity,
            max_disparity,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Disparity at the pixel if it is usable for triangulation: inside the map, finite, within
    /// the declared range and non-zero
    ///
    pub fn value(&self, u: i32, v: i32) -> Option<f32> {
        if u < 0 || v < 0 || u as u32 >= self.width() || v as u32 >= self.height() {
            return None;
        }
        let d = self.image.get_pixel(u as u32, v as u32)[0];
        if !d.is_finite() || d < self.min_disparity || d > self.max_disparity || d == 0.0 {
            return None;
        }
        Some(d)
    }
}

/// Pinhole triangulation of the pixel `(u, v)` with the given disparity. `None` for zero disparity.
///
pub fn project_to_3d(
    u: f32,
    v: f32,
    disparity: f32,
    disparity_image: &DisparityImage,
    camera: &CameraInfo,
) -> Option<Point3<f32>> {
    if disparity == 0.0 {
        return None;
    }
    let z = disparity_image.focal_length * disparity_image.baseline / disparity;
    let x = (u - camera.cx() as f32) / camera.fx() as f32 * z;
    let y = (v - camera.cy() as f32) / camera.fy() as f32 * z;
    Some(Point3::new(x, y, z))
}

/// Left/right correspondence check of the tracked boxes
///
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StereoGate {
    pub max_vertical_offset: f32,
    pub min_width_ratio: f32,
    pub max_width_ratio: f32,
}

impl Default for StereoGate {
    fn default() -> Self {
        Self {
            max_vertical_offset: DEFAULT_MAX_VERTICAL_OFFSET,
            min_width_ratio: DEFAULT_MIN_WIDTH_RATIO,
            max_width_ratio: DEFAULT_MAX_WIDTH_RATIO,
        }
    }
}

impl StereoGate {
    pub fn accepts(&self, left: &Rect, right: &Rect) -> bool {
        let diff_y = right.center().y - left.center().y;
        if diff_y.abs() > self.max_vertical_offset {
            debug!(
                "Left and right boxes are not aligned: offset={}, left={:?}, right={:?}",
                diff_y, left, right
            );
            return false;
        }
        if right.width <= 0 {
            return false;
        }
        let ratio = left.width as f32 / right.width as f32;
        if ratio > self.max_width_ratio || ratio < self.min_width_ratio {
            debug!(
                "Left and right boxes are too different in size: ratio={}, left={:?}, right={:?}",
                ratio, left, right
            );
            return false;
        }
        true
    }
}

/// Output of the stereo reconstruction of one object
///
#[derive(Clone, Debug, Default)]
pub struct Reconstruction {
    /// all valid points of the left box
    pub cloud: PointCloud,
    /// triangulation of the left box origin with the box center disparity; the origin when
    /// the boxes don't correspond to each other
    pub point_estimate: Point3<f32>,
    /// the left and right boxes passed the gate
    pub consistent: bool,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct StereoReconstructor {
    gate: StereoGate,
}

impl StereoReconstructor {
    pub fn new(gate: StereoGate) -> Self {
        Self { gate }
    }

    pub fn gate(&self) -> &StereoGate {
        &self.gate
    }

    pub fn reconstruct(&self, tuple: &FrameTuple, left: &Rect, right: &Rect) -> Reconstruction {
        self.reconstruct_with(&tuple.disparity, &tuple.left_camera_info, left, right)
    }

    pub fn reconstruct_with(
        &self,
        disparity: &DisparityImage,
        camera: &CameraInfo,
        left: &Rect,
        right: &Rect,
    ) -> Reconstruction {
        let consistent = self.gate.accepts(left, right);
        let point_estimate = if consistent {
            let d = left.center().x - right.center().x;
            project_to_3d(left.x as f32, left.y as f32, d, disparity, camera)
                .unwrap_or_else(Point3::origin)
        } else {
            Point3::origin()
        };

        Reconstruction {
            cloud: dense_cloud(disparity, camera, left, |_, _| true),
            point_estimate,
            consistent,
        }
    }
}

/// Triangulates every pixel of `rect` that has a valid disparity and is accepted by `select`
///
pub fn dense_cloud<F>(
    disparity: &DisparityImage,
    camera: &CameraInfo,
    rect: &Rect,
    select: F,
) -> PointCloud
where
    F: Fn(i32, i32) -> bool,
{
    let mut cloud = PointCloud::default();
    for v in rect.y..rect.bottom() {
        for u in rect.x..rect.right() {
            if !select(u, v) {
                continue;
            }
            let Some(d) = disparity.value(u, v) else {
                continue;
            };
            if let Some(p) = project_to_3d(u as f32, v as f32, d, disparity, camera) {
                cloud.push(p);
            }
        }
    }
    cloud
}

#[cfg(test)]
mod tests {
    use crate::stereo::{
        dense_cloud, project_to_3d, CameraInfo, DisparityImage, DisparityMap, StereoGate,
        StereoReconstructor,
    };
    use crate::utils::bbox::Rect;
    use image::Luma;
    use nalgebra::Point3;

    fn camera() -> CameraInfo {
        CameraInfo::from_intrinsics(64, 48, 100.0, 100.0, 32.0, 24.0)
    }

    fn disparity(value: f32) -> DisparityImage {
        DisparityImage::new(DisparityMap::from_pixel(64, 48, Luma([value])), 100.0, 0.2, 0.0, 64.0)
    }

    #[test]
    fn camera_parameters() {
        let c = camera();
        assert_eq!(c.fx(), 100.0);
        assert_eq!(c.fy(), 100.0);
        assert_eq!(c.cx(), 32.0);
        assert_eq!(c.cy(), 24.0);
        assert_eq!(c.projection_matrix()[(1, 2)], 24.0);
    }

    #[test]
    fn invalid_disparities() {
        let mut d = disparity(10.0);
        d.image.put_pixel(0, 0, Luma([f32::NAN]));
        d.image.put_pixel(1, 0, Luma([f32::INFINITY]));
        d.image.put_pixel(2, 0, Luma([100.0]));
        d.image.put_pixel(3, 0, Luma([0.0]));
        d.image.put_pixel(4, 0, Luma([-1.0]));
        for u in 0..5 {
            assert!(d.value(u, 0).is_none());
        }
        assert_eq!(d.value(5, 0), Some(10.0));
        assert!(d.value(-1, 3).is_none());
        assert!(d.value(64, 3).is_none());
        assert!(d.value(3, 48).is_none());
    }

    #[test]
    fn pinhole_projection() {
        let d = disparity(10.0);
        let p = project_to_3d(42.0, 14.0, 10.0, &d, &camera()).unwrap();
        assert!((p - Point3::new(0.2, -0.2, 2.0)).norm() < 1e-5);
        assert!(project_to_3d(42.0, 14.0, 0.0, &d, &camera()).is_none());
    }

    #[test]
    fn gate_vertical_offset() {
        let gate = StereoGate::default();
        let left = Rect::new(100, 90, 20, 20);
        assert!(!gate.accepts(&left, &Rect::new(80, 101, 20, 20)));
        assert!(gate.accepts(&left, &Rect::new(80, 99, 20, 20)));
        assert!(gate.accepts(&left, &Rect::new(80, 100, 20, 20)));
        assert!(!gate.accepts(&left, &Rect::new(80, 79, 20, 20)));
    }

    #[test]
    fn gate_width_ratio() {
        let gate = StereoGate::default();
        let right = Rect::new(0, 0, 20, 20);
        assert!(gate.accepts(&Rect::new(0, 0, 30, 20), &right));
        assert!(!gate.accepts(&Rect::new(0, 0, 31, 20), &right));
        assert!(gate.accepts(&Rect::new(0, 0, 10, 20), &right));
        assert!(!gate.accepts(&Rect::new(0, 0, 9, 20), &right));
        assert!(!gate.accepts(&right, &Rect::new(0, 0, 0, 20)));
    }

    #[test]
    fn point_estimate_follows_gate() {
        let r = StereoReconstructor::default();
        let d = disparity(10.0);
        let left = Rect::new(30, 14, 10, 10);

        let ok = r.reconstruct_with(&d, &camera(), &left, &Rect::new(20, 18, 10, 10));
        assert!(ok.consistent);
        assert!((ok.point_estimate - Point3::new(-0.04, -0.2, 2.0)).norm() < 1e-5);

        let bad = r.reconstruct_with(&d, &camera(), &left, &Rect::new(20, 25, 10, 10));
        assert!(!bad.consistent);
        assert_eq!(bad.point_estimate, Point3::origin());
        assert_eq!(bad.cloud.len(), 100);

        let zero = r.reconstruct_with(&d, &camera(), &left, &left);
        assert!(zero.consistent);
        assert_eq!(zero.point_estimate, Point3::origin());
    }

    #[test]
    fn cloud_of_partially_valid_box() {
        let mut d = disparity(f32::NAN);
        for v in 10..15 {
            for u in 10..14 {
                d.image.put_pixel(u, v, Luma([20.0]));
            }
        }
        let c = camera();
        let cloud = dense_cloud(&d, &c, &Rect::new(8, 8, 10, 10), |_, _| true);
        assert_eq!(cloud.len(), 20);
        assert!(cloud.iter().all(|p| (p.z - 1.0).abs() < 1e-6));

        let selected = dense_cloud(&d, &c, &Rect::new(8, 8, 10, 10), |u, _| u < 12);
        assert_eq!(selected.len(), 10);

        let empty = dense_cloud(&d, &c, &Rect::new(40, 30, 5, 5), |_, _| true);
        assert!(empty.is_empty());
    }
}
