use crate::utils::bbox::Rect;
use crate::utils::color::{rgb_to_hsv, Hsv, HUE_RANGE, SAT_RANGE};
use image::{GrayImage, RgbImage};

/// Number of hue bins of the learned histograms
pub const HUE_BINS: usize = 25;

/// Number of saturation bins of the learned histograms
pub const SAT_BINS: usize = 25;

/// Value of the highest bin after normalization
pub const PEAK_INTENSITY: f32 = 255.0;

pub fn hue_bin(h: u8) -> usize {
    (h as usize * HUE_BINS / HUE_RANGE as usize).min(HUE_BINS - 1)
}

pub fn sat_bin(s: u8) -> usize {
    (s as usize * SAT_BINS / SAT_RANGE as usize).min(SAT_BINS - 1)
}

/// Lowest hue that falls into `bin`
///
pub fn hue_bin_start(bin: usize) -> u8 {
    ((bin * HUE_RANGE as usize + HUE_BINS - 1) / HUE_BINS) as u8
}

/// Highest hue that falls into `bin`
///
pub fn hue_bin_end(bin: usize) -> u8 {
    (((bin + 1) * HUE_RANGE as usize + HUE_BINS - 1) / HUE_BINS)
        .saturating_sub(1)
        .min(HUE_RANGE as usize - 1) as u8
}

/// Iterates over the HSV values of the pixels of `image` selected by the non-zero pixels of `mask`
///
fn masked_pixels<'a>(image: &'a RgbImage, mask: &'a GrayImage) -> impl Iterator<Item = Hsv> + 'a {
    image
        .enumerate_pixels()
        .filter(move |(x, y, _)| mask.get_pixel(*x, *y)[0] != 0)
        .map(|(_, _, p)| rgb_to_hsv(p))
}

/// Two dimensional hue/saturation histogram
///
#[derive(Clone, Debug, PartialEq)]
pub struct HsHistogram {
    bins: Vec<f32>,
}

impl Default for HsHistogram {
    fn default() -> Self {
        Self {
            bins: vec![0.0; HUE_BINS * SAT_BINS],
        }
    }
}

impl HsHistogram {
    /// Counts the masked pixels of `image`
    ///
    pub fn from_masked(image: &RgbImage, mask: &GrayImage) -> Self {
        let mut hist = Self::default();
        for hsv in masked_pixels(image, mask) {
            hist.bins[Self::index(hsv)] += 1.0;
        }
        hist
    }

    fn index(hsv: Hsv) -> usize {
        hue_bin(hsv.h) * SAT_BINS + sat_bin(hsv.s)
    }

    /// Scales the bins so that the maximal one equals [PEAK_INTENSITY](PEAK_INTENSITY).
    /// An empty histogram stays empty.
    ///
    pub fn normalize_to_peak(&mut self) {
        let max = self.max();
        let scale = if max > 0.0 { PEAK_INTENSITY / max } else { 0.0 };
        self.bins.iter_mut().for_each(|b| *b *= scale);
    }

    pub fn value(&self, hsv: Hsv) -> f32 {
        self.bins[Self::index(hsv)]
    }

    pub fn bin(&self, hue_bin: usize, sat_bin: usize) -> f32 {
        self.bins[hue_bin * SAT_BINS + sat_bin]
    }

    pub fn max(&self) -> f32 {
        self.bins.iter().copied().fold(0.0, f32::max)
    }

    pub fn is_empty(&self) -> bool {
        self.max() <= 0.0
    }
}

/// One dimensional hue histogram, used to derive the dominant hue band
///
#[derive(Clone, Debug, Default, PartialEq)]
pub struct HueHistogram {
    bins: [f32; HUE_BINS],
}

impl HueHistogram {
    pub fn from_masked(image: &RgbImage, mask: &GrayImage) -> Self {
        let mut hist = Self::default();
        for hsv in masked_pixels(image, mask) {
            hist.bins[hue_bin(hsv.h)] += 1.0;
        }
        hist
    }

    pub fn normalize_to_peak(&mut self) {
        let max = self.max();
        let scale = if max > 0.0 { PEAK_INTENSITY / max } else { 0.0 };
        self.bins.iter_mut().for_each(|b| *b *= scale);
    }

    pub fn bins(&self) -> &[f32; HUE_BINS] {
        &self.bins
    }

    pub fn max(&self) -> f32 {
        self.bins.iter().copied().fold(0.0, f32::max)
    }

    /// Sums histograms bin-wise
    ///
    pub fn accumulate<'a>(hists: impl IntoIterator<Item = &'a HueHistogram>) -> HueHistogram {
        let mut res = HueHistogram::default();
        for h in hists {
            res.bins
                .iter_mut()
                .zip(h.bins.iter())
                .for_each(|(a, b)| *a += *b);
        }
        res
    }
}

/// Histogram likelihood of image pixels, computed only within a region of interest.
///
/// Pixels outside of the region have zero likelihood.
///
#[derive(Clone, Debug)]
pub struct BackProjection {
    roi: Rect,
    data: Vec<f32>,
    max: f32,
}

impl BackProjection {
    /// Back-projects `image` within `roi` against `histograms`; the likelihood of a pixel is the
    /// maximum over all histograms
    ///
    pub fn compute(image: &RgbImage, roi: Rect, histograms: &[HsHistogram]) -> Self {
        let roi = roi.clamp_to(image.width(), image.height());
        let mut data = Vec::with_capacity(roi.area() as usize);
        let mut max = 0.0_f32;
        for y in roi.y..roi.bottom() {
            for x in roi.x..roi.right() {
                let hsv = rgb_to_hsv(image.get_pixel(x as u32, y as u32));
                let v = histograms
                    .iter()
                    .map(|h| h.value(hsv))
                    .fold(0.0_f32, f32::max);
                max = max.max(v);
                data.push(v);
            }
        }
        Self { roi, data, max }
    }

    pub fn roi(&self) -> Rect {
        self.roi
    }

    /// Likelihood at absolute image coordinates
    ///
    pub fn get(&self, x: i32, y: i32) -> f32 {
        if !self.roi.contains(x, y) {
            return 0.0;
        }
        let idx = (y - self.roi.y) as usize * self.roi.width as usize + (x - self.roi.x) as usize;
        self.data[idx]
    }

    pub fn max(&self) -> f32 {
        self.max
    }
}
