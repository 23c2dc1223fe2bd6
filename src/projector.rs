use crate::localize::{centroid, depth_density, min_max, OutlierFilter, RobustLocalizer};
use crate::pipeline::{Blob, BlobOutcome};
use crate::stereo::{project_to_3d, CameraInfo, DisparityImage, PointCloud};
use crate::sync::Timestamp;
use crate::utils::bbox::Rect;
use crate::Errors;
use anyhow::Result;
use image::{GrayImage, Rgb, RgbImage};
use log::debug;
use nalgebra::Point3;

/// Triangulated pixel with its colour
///
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColoredPoint {
    pub position: Point3<f32>,
    pub color: Rgb<u8>,
}

/// Output of [RoiProjector::project](RoiProjector::project)
///
#[derive(Clone, Debug)]
pub struct RoiProjection {
    /// every pixel of the region with a valid disparity, outlier filtered
    pub raw: Vec<ColoredPoint>,
    /// pixels selected by the mask, outlier filtered
    pub filtered: Vec<ColoredPoint>,
    pub blob: Blob,
}

/// Projects a region of interest of the left image into 3D.
///
/// The mask has the size of the region, its non-zero pixels select the object.
///
#[derive(Clone)]
pub struct RoiProjector {
    localizer: RobustLocalizer,
}

impl RoiProjector {
    pub fn new(localizer: RobustLocalizer) -> Self {
        Self { localizer }
    }

    pub fn with_threads(filter: OutlierFilter, threads: usize) -> Result<Self> {
        Ok(Self::new(RobustLocalizer::with_threads(filter, threads)?))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn project(
        &self,
        name: &str,
        timestamp: Timestamp,
        camera: &CameraInfo,
        image: &RgbImage,
        mask: &GrayImage,
        disparity: &DisparityImage,
        roi: Rect,
    ) -> Result<RoiProjection> {
        if roi.is_empty() {
            return Err(Errors::RoiMismatch("region is empty".to_string()).into());
        }
        if mask.width() as i32 != roi.width || mask.height() as i32 != roi.height {
            return Err(Errors::RoiMismatch(format!(
                "mask is {}x{}, region is {}x{}",
                mask.width(),
                mask.height(),
                roi.width,
                roi.height
            ))
            .into());
        }
        if image.dimensions() != (disparity.width(), disparity.height()) {
            return Err(Errors::RoiMismatch(format!(
                "image is {:?}, disparity is {:?}",
                image.dimensions(),
                (disparity.width(), disparity.height())
            ))
            .into());
        }

        let visible = roi.clamp_to(image.width(), image.height());
        let mut raw = Vec::default();
        let mut selected = Vec::default();
        for v in visible.y..visible.bottom() {
            for u in visible.x..visible.right() {
                let Some(d) = disparity.value(u, v) else {
                    continue;
                };
                let Some(position) = project_to_3d(u as f32, v as f32, d, disparity, camera)
                else {
                    continue;
                };
                let point = ColoredPoint {
                    position,
                    color: *image.get_pixel(u as u32, v as u32),
                };
                raw.push(point);
                if mask.get_pixel((u - roi.x) as u32, (v - roi.y) as u32)[0] > 0 {
                    selected.push(point);
                }
            }
        }
        debug!(
            "Region {:?} of {}: {} valid pixels, {} selected",
            roi,
            name,
            raw.len(),
            selected.len()
        );

        let raw = self.filter(&raw);
        let filtered = self.filter(&selected);
        let positions = filtered.iter().map(|p| p.position).collect::<PointCloud>();

        let mut blob = Blob::degenerate(name, timestamp, BlobOutcome::EmptyReconstruction);
        blob.bounding_box_2d = roi;
        blob.depth_density = depth_density(filtered.len(), &roi);
        if let (Some(c), Some(b)) = (centroid(&positions), min_max(&positions)) {
            blob.centroid = Some(c);
            blob.bounding_box_3d = Some(b);
            blob.outcome = BlobOutcome::Localized;
        }

        Ok(RoiProjection {
            raw,
            filtered,
            blob,
        })
    }

    fn filter(&self, points: &[ColoredPoint]) -> Vec<ColoredPoint> {
        let positions = points.iter().map(|p| p.position).collect::<PointCloud>();
        self.localizer
            .inlier_indices(&positions)
            .into_iter()
            .map(|i| points[i])
            .collect()
    }
}
