//! Skin-tone segmentation in YCbCr space.
//!
//! Shared by the heuristic face detector and the metric extractor so both
//! agree on what counts as skin.

use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};

/// Neutral chroma value; Cb and Cr sit here for any grey pixel.
pub const NEUTRAL_CHROMA: f32 = 128.0;

/// A pixel in full-range BT.601 YCbCr.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ycc {
    pub y: f32,
    pub cb: f32,
    pub cr: f32,
}

impl Ycc {
    pub fn from_rgb(pixel: &Rgb<u8>) -> Self {
        let [r, g, b] = pixel.0;
        let (r, g, b) = (r as f32, g as f32, b as f32);
        Self {
            y: 0.299 * r + 0.587 * g + 0.114 * b,
            cb: NEUTRAL_CHROMA - 0.168_736 * r - 0.331_264 * g + 0.5 * b,
            cr: NEUTRAL_CHROMA + 0.5 * r - 0.418_688 * g - 0.081_312 * b,
        }
    }

    /// L1 distance of the chroma pair from neutral grey.
    pub fn chroma(&self) -> f32 {
        (self.cb - NEUTRAL_CHROMA).abs() + (self.cr - NEUTRAL_CHROMA).abs()
    }
}

/// Inclusive YCbCr box classified as skin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkinRange {
    pub cb_min: f32,
    pub cb_max: f32,
    pub cr_min: f32,
    pub cr_max: f32,
    /// Darker pixels are rejected regardless of chroma (shadows, hair, pupils).
    pub min_luma: f32,
}

impl Default for SkinRange {
    fn default() -> Self {
        Self {
            cb_min: 77.0,
            cb_max: 127.0,
            cr_min: 133.0,
            // Wider than the classic 173 so inflamed skin stays in the mask.
            cr_max: 180.0,
            min_luma: 40.0,
        }
    }
}

impl SkinRange {
    pub fn contains(&self, p: Ycc) -> bool {
        p.y >= self.min_luma
            && (self.cb_min..=self.cb_max).contains(&p.cb)
            && (self.cr_min..=self.cr_max).contains(&p.cr)
    }

    pub fn is_skin(&self, pixel: &Rgb<u8>) -> bool {
        self.contains(Ycc::from_rgb(pixel))
    }
}

/// Row-major boolean skin classification of an image.
#[derive(Debug, Clone)]
pub struct SkinMask {
    pub width: u32,
    pub height: u32,
    bits: Vec<bool>,
}

impl SkinMask {
    pub fn from_image(image: &RgbImage, range: &SkinRange) -> Self {
        let bits = image.pixels().map(|p| range.is_skin(p)).collect();
        Self {
            width: image.width(),
            height: image.height(),
            bits,
        }
    }

    pub fn get(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height && self.bits[(y * self.width + x) as usize]
    }

    pub fn count(&self) -> usize {
        self.bits.iter().filter(|&&b| b).count()
    }

    /// Fraction of pixels classified as skin (0.0 for an empty mask).
    pub fn fraction(&self) -> f32 {
        if self.bits.is_empty() {
            return 0.0;
        }
        self.count() as f32 / self.bits.len() as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SKIN: Rgb<u8> = Rgb([224, 172, 140]);

    #[test]
    fn test_ycc_grey_is_neutral() {
        let p = Ycc::from_rgb(&Rgb([90, 90, 90]));
        assert!((p.y - 90.0).abs() < 0.01);
        assert!((p.cb - NEUTRAL_CHROMA).abs() < 0.01);
        assert!((p.cr - NEUTRAL_CHROMA).abs() < 0.01);
        assert!(p.chroma() < 0.02);
    }

    #[test]
    fn test_typical_skin_tones_classified() {
        let range = SkinRange::default();
        assert!(range.is_skin(&SKIN));
        assert!(range.is_skin(&Rgb([198, 134, 66])));
        assert!(range.is_skin(&Rgb([141, 85, 36])));
    }

    #[test]
    fn test_non_skin_rejected() {
        let range = SkinRange::default();
        assert!(!range.is_skin(&Rgb([0, 0, 0])));
        assert!(!range.is_skin(&Rgb([255, 255, 255])));
        assert!(!range.is_skin(&Rgb([40, 60, 160])));
        assert!(!range.is_skin(&Rgb([30, 140, 60])));
        assert!(!range.is_skin(&Rgb([128, 128, 128])));
    }

    #[test]
    fn test_mask_fraction() {
        let mut img = RgbImage::from_pixel(10, 10, Rgb([40, 60, 160]));
        for y in 0..5 {
            for x in 0..10 {
                img.put_pixel(x, y, SKIN);
            }
        }
        let mask = SkinMask::from_image(&img, &SkinRange::default());
        assert_eq!(mask.count(), 50);
        assert!((mask.fraction() - 0.5).abs() < 1e-6);
        assert!(mask.get(3, 2));
        assert!(!mask.get(3, 7));
        assert!(!mask.get(30, 70));
    }

    #[test]
    fn test_empty_mask_fraction() {
        let mask = SkinMask::from_image(&RgbImage::new(0, 0), &SkinRange::default());
        assert_eq!(mask.fraction(), 0.0);
    }
}
