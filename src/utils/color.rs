use image::Rgb;

/// Exclusive upper bound of the 8-bit hue channel (degrees halved)
pub const HUE_RANGE: u16 = 180;

/// Exclusive upper bound of the 8-bit saturation channel
pub const SAT_RANGE: u16 = 256;

/// 8-bit HSV triple: hue in `[0; 180)`, saturation and value in `[0; 255]`
///
#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, Hash)]
pub struct Hsv {
    pub h: u8,
    pub s: u8,
    pub v: u8,
}

impl Hsv {
    pub fn new(h: u8, s: u8, v: u8) -> Self {
        Self { h, s, v }
    }
}

impl From<&Rgb<u8>> for Hsv {
    fn from(p: &Rgb<u8>) -> Self {
        rgb_to_hsv(p)
    }
}

/// Converts an RGB pixel to 8-bit HSV
///
pub fn rgb_to_hsv(p: &Rgb<u8>) -> Hsv {
    let [r, g, b] = p.0;
    let (r, g, b) = (r as f32, g as f32, b as f32);
    let v = r.max(g).max(b);
    let min = r.min(g).min(b);
    let diff = v - min;

    let s = if v > 0.0 { 255.0 * diff / v } else { 0.0 };

    let h = if diff == 0.0 {
        0.0
    } else if v == r {
        60.0 * (g - b) / diff
    } else if v == g {
        120.0 + 60.0 * (b - r) / diff
    } else {
        240.0 + 60.0 * (r - g) / diff
    };
    let h = if h < 0.0 { h + 360.0 } else { h };

    Hsv {
        h: ((h / 2.0).round() as u16 % HUE_RANGE) as u8,
        s: s.round().min(255.0) as u8,
        v: v as u8,
    }
}

/// Luma of an RGB pixel with the ITU-R BT.601 weights
///
pub fn gray(p: &Rgb<u8>) -> u8 {
    let [r, g, b] = p.0;
    (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32)
        .round()
        .min(255.0) as u8
}

#[cfg(test)]
mod tests {
    use crate::utils::color::{gray, rgb_to_hsv, Hsv};
    use image::Rgb;

    #[test]
    fn primaries() {
        assert_eq!(rgb_to_hsv(&Rgb([255, 0, 0])), Hsv::new(0, 255, 255));
        assert_eq!(rgb_to_hsv(&Rgb([0, 255, 0])), Hsv::new(60, 255, 255));
        assert_eq!(rgb_to_hsv(&Rgb([0, 0, 255])), Hsv::new(120, 255, 255));
    }

    #[test]
    fn achromatic() {
        assert_eq!(rgb_to_hsv(&Rgb([0, 0, 0])), Hsv::new(0, 0, 0));
        assert_eq!(rgb_to_hsv(&Rgb([128, 128, 128])), Hsv::new(0, 0, 128));
    }

    #[test]
    fn hue_wraps_below_zero() {
        // magenta-red: hue is negative before wrapping
        let hsv = rgb_to_hsv(&Rgb([255, 0, 50]));
        assert!(hsv.h > 170);
        assert_eq!(hsv.s, 255);
    }

    #[test]
    fn luma() {
        assert_eq!(gray(&Rgb([0, 0, 0])), 0);
        assert_eq!(gray(&Rgb([255, 255, 255])), 255);
        assert_eq!(gray(&Rgb([0, 200, 0])), 117);
    }
}
