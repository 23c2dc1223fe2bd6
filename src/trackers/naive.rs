use crate::model::AppearanceModel;
use crate::trackers::{ObjectTracker, TrackOutcome};
use crate::utils::bbox::{Rect, RotatedRect};
use crate::utils::color::rgb_to_hsv;
use image::RgbImage;

/// Minimal number of hue band pixels required to accept the detection
pub const DEFAULT_MIN_PIXELS: usize = 4;

/// Hue band tracker.
///
/// Pixels inside the learned hue band are collected around the previous window. On acquisition
/// (no previous window) the window becomes the bounding box of all band pixels of the frame;
/// afterwards the window keeps its size and is recentered on the centroid of the band pixels.
///
#[derive(Clone, Copy, Debug)]
pub struct NaiveTracker {
    min_pixels: usize,
}

impl Default for NaiveTracker {
    fn default() -> Self {
        Self {
            min_pixels: DEFAULT_MIN_PIXELS,
        }
    }
}

impl NaiveTracker {
    pub fn new(min_pixels: usize) -> Self {
        Self {
            min_pixels: min_pixels.max(1),
        }
    }
}

impl ObjectTracker for NaiveTracker {
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
        let window = window.intersect(&bounds);
        let acquiring = window.is_empty();
        let area = if acquiring {
            bounds
        } else {
            window
                .inflate(window.width / 2, window.height / 2)
                .intersect(&bounds)
        };

        let mut count = 0_usize;
        let (mut sx, mut sy) = (0_f64, 0_f64);
        let (mut min_x, mut min_y) = (i32::MAX, i32::MAX);
        let (mut max_x, mut max_y) = (i32::MIN, i32::MIN);
        for y in area.y..area.bottom() {
            for x in area.x..area.right() {
                if !model.in_hue_band(rgb_to_hsv(image.get_pixel(x as u32, y as u32))) {
                    continue;
                }
                count += 1;
                sx += x as f64;
                sy += y as f64;
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);
            }
        }
        if count < self.min_pixels {
            return None;
        }

        let next = if acquiring {
            Rect::new(min_x, min_y, max_x - min_x + 1, max_y - min_y + 1)
        } else {
            let cx = (sx / count as f64).round() as i32;
            let cy = (sy / count as f64).round() as i32;
            Rect::new(
                (cx - window.width / 2).clamp(0, bounds.width - window.width),
                (cy - window.height / 2).clamp(0, bounds.height - window.height),
                window.width,
                window.height,
            )
        };
        if next.is_empty() {
            return None;
        }
        Some(TrackOutcome {
            region: RotatedRect::upright(&next),
            window: next,
        })
    }
}
