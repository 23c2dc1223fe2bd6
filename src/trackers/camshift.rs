use crate::model::AppearanceModel;
use crate::trackers::{ObjectTracker, TrackOutcome};
use crate::utils::bbox::Rect;
use crate::utils::mean_shift::{cam_shift, TermCriteria, CAMSHIFT_TOLERANCE};
use image::RgbImage;

/// Back-projection maximum below which the image is considered to carry no trace of the object
pub const DEFAULT_MIN_LIKELIHOOD: f32 = 1.0;

/// CAMShift tracker.
///
/// The image is back-projected against the learned hue/saturation histograms only around the
/// previous window (grown by half of its size on every side), so the cost depends on the object
/// size rather than on the image resolution. With no previous window the whole frame is searched.
///
#[derive(Clone, Copy, Debug)]
pub struct CamshiftTracker {
    criteria: TermCriteria,
    min_likelihood: f32,
}

impl Default for CamshiftTracker {
    fn default() -> Self {
        Self {
            criteria: TermCriteria::default(),
            min_likelihood: DEFAULT_MIN_LIKELIHOOD,
        }
    }
}

impl CamshiftTracker {
    pub fn new(criteria: TermCriteria, min_likelihood: f32) -> Self {
        Self {
            criteria,
            min_likelihood,
        }
    }

    /// Area of the image that is back-projected for the `window`
    ///
    pub fn search_area(window: Rect, bounds: Rect) -> Rect {
        if window.is_empty() {
            bounds
        } else {
            window
                .inflate(
                    window.width / 2 + CAMSHIFT_TOLERANCE,
                    window.height / 2 + CAMSHIFT_TOLERANCE,
                )
                .intersect(&bounds)
        }
    }
}

impl ObjectTracker for CamshiftTracker {
    fn track(
        &self,
        image: &RgbImage,
        model: &AppearanceModel,
        window: Rect,
    ) -> Option<TrackOutcome> {
        if !model.is_trained() {
            return None;
        }
        let bounds = Rect::full(image.width(), image.height());
        if bounds.is_empty() {
            return None;
        }
        let window = window.intersect(&bounds);
        let area = Self::search_area(window, bounds);
        let start = if window.is_empty() { area } else { window };

        let prob = model.back_project(image, area);
        if prob.max() < self.min_likelihood {
            return None;
        }

        let (region, next) = cam_shift(&prob, start, area, self.criteria)?;
        if next.is_empty() || next.intersect(&bounds) != next {
            return None;
        }
        if region.width <= 0.0 || region.height <= 0.0 {
            return None;
        }
        Some(TrackOutcome {
            region,
            window: next,
        })
    }
}
