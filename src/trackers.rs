use crate::model::AppearanceModel;
use crate::utils::bbox::{Rect, RotatedRect};
use image::RgbImage;
use serde::{Deserialize, Serialize};

/// Back-projection tracker with adaptive window size and orientation
pub mod camshift;

/// Fixed window tracker following the dominant hue band
pub mod naive;

/// Tracking strategy used for every registered object
///
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingAlgorithm {
    Naive,
    #[default]
    Camshift,
}

/// Result of a successful tracking call
///
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrackOutcome {
    /// object region in the image
    pub region: RotatedRect,
    /// search window for the next frame
    pub window: Rect,
}

impl TrackOutcome {
    /// Upright box of the region, clamped to the image
    ///
    pub fn bounding_rect(&self, width: u32, height: u32) -> Rect {
        self.region.bounding_rect().clamp_to(width, height)
    }
}

/// Single image tracker.
///
/// The tracker keeps no state between calls: the search window of the previous frame is passed in
/// and the window for the next one is returned in [TrackOutcome](TrackOutcome). An empty `window`
/// means that the object is searched in the whole image.
///
pub trait ObjectTracker: Send + Sync {
    fn track(
        &self,
        image: &RgbImage,
        model: &AppearanceModel,
        window: Rect,
    ) -> Option<TrackOutcome>;
}

/// Constructs the tracker implementing `algorithm`
///
pub fn tracker_for(algorithm: TrackingAlgorithm) -> Box<dyn ObjectTracker> {
    match algorithm {
        TrackingAlgorithm::Camshift => Box::<camshift::CamshiftTracker>::default(),
        TrackingAlgorithm::Naive => Box::<naive::NaiveTracker>::default(),
    }
}

#[cfg(test)]
mod tests {
    use crate::trackers::{tracker_for, TrackingAlgorithm};
    use crate::model::AppearanceModel;
    use crate::utils::bbox::Rect;
    use image::{Rgb, RgbImage};

    #[test]
    fn both_algorithms_find_the_object() {
        let mut img = RgbImage::new(120, 80);
        for y in 20..40 {
            for x in 60..80 {
                img.put_pixel(x, y, Rgb([0, 200, 0]));
            }
        }
        let mut model = AppearanceModel::default();
        model.add_view(&RgbImage::from_pixel(6, 6, Rgb([0, 200, 0])));

        for algorithm in [TrackingAlgorithm::Camshift, TrackingAlgorithm::Naive] {
            let tracker = tracker_for(algorithm);
            let res = tracker.track(&img, &model, Rect::default()).unwrap();
            let c = res.region.center;
            assert!((c.x - 70.0).abs() <= 1.0, "{:?}", algorithm);
            assert!((c.y - 30.0).abs() <= 1.0, "{:?}", algorithm);
        }
    }

    #[test]
    fn algorithm_names() {
        let a: TrackingAlgorithm = serde_yaml::from_str("naive").unwrap();
        assert_eq!(a, TrackingAlgorithm::Naive);
        let a: TrackingAlgorithm = serde_yaml::from_str("camshift").unwrap();
        assert_eq!(a, TrackingAlgorithm::Camshift);
        assert_eq!(TrackingAlgorithm::default(), TrackingAlgorithm::Camshift);
    }
}
