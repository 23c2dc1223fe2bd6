use crate::utils::bbox::Rect;
use crate::utils::color::{gray, rgb_to_hsv, Hsv};
use crate::utils::histogram::{
    hue_bin, hue_bin_end, hue_bin_start, BackProjection, HsHistogram, HueHistogram, HUE_BINS,
};
use image::{GrayImage, Luma, RgbImage};

/// Gray level at or below which a sample pixel is considered background
pub const DEFAULT_MASK_THRESHOLD: u8 = 5;

/// Bins around the peak with at least this share of the peak value belong to the hue band
pub const HUE_BAND_FRACTION: f32 = 0.25;

/// Minimal saturation of a pixel that may belong to the hue band
pub const MIN_BAND_SATURATION: u8 = 30;

/// Running sums of the saturation and the value of the sample pixels, per hue bin
#[derive(Clone, Copy, Debug, Default)]
struct BinStats {
    count: f64,
    s: f64,
    v: f64,
}

/// Learned colour appearance of one object.
///
/// Every training view appends one hue/saturation histogram (used by the back-projection tracker)
/// and one hue histogram. The hue histograms are accumulated to derive the dominant hue band and
/// the peak colour used by the naive tracker.
///
#[derive(Clone, Debug)]
pub struct AppearanceModel {
    histograms: Vec<HsHistogram>,
    hue_histograms: Vec<HueHistogram>,
    hue_band: Option<(u8, u8)>,
    peak_color: Hsv,
    bin_stats: [BinStats; HUE_BINS],
    mask_threshold: u8,
}

impl Default for AppearanceModel {
    fn default() -> Self {
        Self::new(DEFAULT_MASK_THRESHOLD)
    }
}

impl AppearanceModel {
    /// # Parameters
    /// * `mask_threshold` - sample pixels with the gray level at or below it are background
    ///
    pub fn new(mask_threshold: u8) -> Self {
        Self {
            histograms: Vec::default(),
            hue_histograms: Vec::default(),
            hue_band: None,
            peak_color: Hsv::default(),
            bin_stats: [BinStats::default(); HUE_BINS],
            mask_threshold,
        }
    }

    /// Foreground mask of a sample: 255 for pixels brighter than the threshold, 0 otherwise
    ///
    pub fn compute_mask(&self, image: &RgbImage) -> GrayImage {
        GrayImage::from_fn(image.width(), image.height(), |x, y| {
            if gray(image.get_pixel(x, y)) > self.mask_threshold {
                Luma([255])
            } else {
                Luma([0])
            }
        })
    }

    /// Learns one more view of the object.
    ///
    /// A sample without foreground pixels produces empty histograms; they are kept, so the view
    /// count still grows, but they never match anything.
    ///
    pub fn add_view(&mut self, image: &RgbImage) {
        let mask = self.compute_mask(image);

        let mut hist = HsHistogram::from_masked(image, &mask);
        hist.normalize_to_peak();
        self.histograms.push(hist);

        let mut hue_hist = HueHistogram::from_masked(image, &mask);
        hue_hist.normalize_to_peak();
        self.hue_histograms.push(hue_hist);

        for (x, y, p) in image.enumerate_pixels() {
            if mask.get_pixel(x, y)[0] == 0 {
                continue;
            }
            let hsv = rgb_to_hsv(p);
            let stats = &mut self.bin_stats[hue_bin(hsv.h)];
            stats.count += 1.0;
            stats.s += hsv.s as f64;
            stats.v += hsv.v as f64;
        }

        self.update_hue_band();
    }

    fn update_hue_band(&mut self) {
        let acc = HueHistogram::accumulate(self.hue_histograms.iter());
        let max = acc.max();
        if max <= 0.0 {
            self.hue_band = None;
            self.peak_color = Hsv::default();
            return;
        }
        let bins = acc.bins();
        let peak = bins
            .iter()
            .position(|b| *b == max)
            .unwrap_or_default();
        let limit = max * HUE_BAND_FRACTION;

        let mut lower = peak;
        let mut upper = peak;
        let mut covered = 1;
        while covered < HUE_BINS {
            let prev = (lower + HUE_BINS - 1) % HUE_BINS;
            if bins[prev] < limit {
                break;
            }
            lower = prev;
            covered += 1;
        }
        while covered < HUE_BINS {
            let next = (upper + 1) % HUE_BINS;
            if bins[next] < limit {
                break;
            }
            upper = next;
            covered += 1;
        }

        self.hue_band = if covered == HUE_BINS {
            Some((0, hue_bin_end(HUE_BINS - 1)))
        } else {
            Some((hue_bin_start(lower), hue_bin_end(upper)))
        };

        let stats = self.bin_stats[peak];
        let center = (hue_bin_start(peak) as u16 + hue_bin_end(peak) as u16) / 2;
        self.peak_color = if stats.count > 0.0 {
            Hsv::new(
                center as u8,
                (stats.s / stats.count).round() as u8,
                (stats.v / stats.count).round() as u8,
            )
        } else {
            Hsv::new(center as u8, 0, 0)
        };
    }

    pub fn views(&self) -> usize {
        self.histograms.len()
    }

    /// At least one of the learned views carries colour information
    ///
    pub fn is_trained(&self) -> bool {
        self.histograms.iter().any(|h| !h.is_empty())
    }

    pub fn histograms(&self) -> &[HsHistogram] {
        &self.histograms
    }

    pub fn hue_histograms(&self) -> &[HueHistogram] {
        &self.hue_histograms
    }

    pub fn lower_hue(&self) -> u8 {
        self.hue_band.map(|(l, _)| l).unwrap_or_default()
    }

    pub fn upper_hue(&self) -> u8 {
        self.hue_band.map(|(_, u)| u).unwrap_or_default()
    }

    pub fn peak_color(&self) -> Hsv {
        self.peak_color
    }

    pub fn mask_threshold(&self) -> u8 {
        self.mask_threshold
    }

    /// Histogram likelihood of `image` pixels inside `roi`
    ///
    pub fn back_project(&self, image: &RgbImage, roi: Rect) -> BackProjection {
        BackProjection::compute(image, roi, &self.histograms)
    }

    /// The colour falls into the dominant hue band; a band with `lower > upper` wraps around red
    ///
    pub fn in_hue_band(&self, hsv: Hsv) -> bool {
        let Some((lower, upper)) = self.hue_band else {
            return false;
        };
        if hsv.s < MIN_BAND_SATURATION || hsv.v <= self.mask_threshold {
            return false;
        }
        if lower <= upper {
            hsv.h >= lower && hsv.h <= upper
        } else {
            hsv.h >= lower || hsv.h <= upper
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::model::AppearanceModel;
    use crate::utils::bbox::Rect;
    use crate::utils::color::Hsv;
    use crate::utils::histogram::PEAK_INTENSITY;
    use crate::EPS;
    use image::{Rgb, RgbImage};

    #[test]
    fn mask_excludes_dark_background() {
        let mut img = RgbImage::from_pixel(4, 4, Rgb([3, 3, 3]));
        img.put_pixel(1, 1, Rgb([0, 200, 0]));
        let m = AppearanceModel::default();
        let mask = m.compute_mask(&img);
        assert_eq!(mask.get_pixel(1, 1)[0], 255);
        assert_eq!(mask.get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn views_are_appended() {
        let img = RgbImage::from_pixel(8, 8, Rgb([0, 200, 0]));
        let mut m = AppearanceModel::default();
        assert!(!m.is_trained());
        m.add_view(&img);
        m.add_view(&img);
        assert_eq!(m.views(), 2);
        assert_eq!(m.hue_histograms().len(), 2);
        assert!(m.is_trained());
        assert!((m.histograms()[0].max() - PEAK_INTENSITY).abs() < EPS);
    }

    #[test]
    fn dark_sample_is_uninformative() {
        let img = RgbImage::from_pixel(8, 8, Rgb([1, 2, 1]));
        let mut m = AppearanceModel::default();
        m.add_view(&img);
        assert_eq!(m.views(), 1);
        assert!(!m.is_trained());
        assert!(!m.in_hue_band(Hsv::new(60, 255, 200)));
        let bp = m.back_project(&img, Rect::full(8, 8));
        assert_eq!(bp.max(), 0.0);
    }

    #[test]
    fn hue_band_of_green() {
        let img = RgbImage::from_pixel(8, 8, Rgb([0, 200, 0]));
        let mut m = AppearanceModel::default();
        m.add_view(&img);
        assert_eq!(m.lower_hue(), 58);
        assert_eq!(m.upper_hue(), 64);
        assert_eq!(m.peak_color(), Hsv::new(61, 255, 200));
        assert!(m.in_hue_band(Hsv::new(60, 255, 200)));
        assert!(!m.in_hue_band(Hsv::new(0, 255, 200)));
        assert!(!m.in_hue_band(Hsv::new(60, 10, 200)));
    }

    #[test]
    fn hue_band_wraps_around_red() {
        let mut img = RgbImage::from_pixel(8, 8, Rgb([255, 0, 0]));
        for y in 0..8 {
            for x in 4..8 {
                img.put_pixel(x, y, Rgb([255, 0, 50]));
            }
        }
        let mut m = AppearanceModel::default();
        m.add_view(&img);
        assert!(m.lower_hue() > m.upper_hue());
        assert!(m.in_hue_band(Hsv::new(3, 255, 255)));
        assert!(m.in_hue_band(Hsv::new(176, 255, 255)));
        assert!(!m.in_hue_band(Hsv::new(90, 255, 255)));
    }
}
