//! Face localization: decode, detect, pick the primary face, crop to canonical.

use crate::config::LocalizerConfig;
use crate::detector::{DetectorError, FaceDetector};
use crate::types::{BoundingBox, CroppedFace, FaceRegion};
use image::imageops::{self, FilterType};
use image::{ImageReader, Limits, RgbImage};
use std::cmp::Ordering;
use std::io::Cursor;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LocalizeError {
    #[error("failed to decode image: {0}")]
    ImageDecode(String),
    #[error("image too small: {width}x{height}, shorter side must be at least {min}px")]
    ImageTooSmall { width: u32, height: u32, min: u32 },
    #[error("no face detected")]
    FaceNotFound,
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
}

/// Crop rectangle within the source image, in whole pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Decode untrusted bytes into an RGB raster.
///
/// The format is sniffed from the content rather than trusted from a file
/// name, and the decoder is capped at `max_dimension` per side so hostile
/// headers cannot force a huge allocation.
pub fn decode_image(input: &[u8], max_dimension: u32) -> Result<RgbImage, LocalizeError> {
    let mut reader = ImageReader::new(Cursor::new(input))
        .with_guessed_format()
        .map_err(|e| LocalizeError::ImageDecode(e.to_string()))?;
    if reader.format().is_none() {
        return Err(LocalizeError::ImageDecode("unrecognized image format".to_string()));
    }

    let mut limits = Limits::default();
    limits.max_image_width = Some(max_dimension);
    limits.max_image_height = Some(max_dimension);
    reader.limits(limits);

    let decoded = reader
        .decode()
        .map_err(|e| LocalizeError::ImageDecode(e.to_string()))?;
    Ok(decoded.to_rgb8())
}

/// Pick the primary face among detector candidates.
///
/// Candidates below `min_confidence` are dropped. Of the rest the largest box
/// wins; equal areas fall back to scan order (top edge, then left edge), so
/// the choice is stable for identical input.
pub fn select_primary(candidates: &[BoundingBox], min_confidence: f32) -> Option<&BoundingBox> {
    candidates
        .iter()
        .filter(|c| c.confidence >= min_confidence && c.area() > 0.0)
        .min_by(|a, b| {
            // Whole-pixel areas keep float noise from deciding ties.
            let area_a = a.area().round() as u64;
            let area_b = b.area().round() as u64;
            area_b
                .cmp(&area_a)
                .then_with(|| a.y.partial_cmp(&b.y).unwrap_or(Ordering::Equal))
                .then_with(|| a.x.partial_cmp(&b.x).unwrap_or(Ordering::Equal))
        })
}

/// Square crop around a face box, expanded by `margin` and clamped to the image.
///
/// The side is `max(face_w, face_h) × margin`, shrunk to fit the shorter image
/// side if needed; the square is then slid (never wrapped) back inside the
/// image bounds, so faces at the border keep a full-size crop.
pub fn square_crop_region(face: &BoundingBox, image_width: u32, image_height: u32, margin: f32) -> CropRegion {
    let face_cx = face.x as f64 + face.width as f64 / 2.0;
    let face_cy = face.y as f64 + face.height as f64 / 2.0;
    let desired = (face.width.max(face.height) as f64 * margin as f64).round() as u32;

    let side = desired.clamp(1, image_width.min(image_height).max(1));

    let x = (face_cx - side as f64 / 2.0)
        .round()
        .max(0.0)
        .min(image_width.saturating_sub(side) as f64) as u32;
    let y = (face_cy - side as f64 / 2.0)
        .round()
        .max(0.0)
        .min(image_height.saturating_sub(side) as f64) as u32;

    CropRegion { x, y, width: side, height: side }
}

/// Finds the primary face in a photo and produces a canonical crop.
pub struct FaceLocalizer {
    config: LocalizerConfig,
    detector: Box<dyn FaceDetector>,
}

impl FaceLocalizer {
    pub fn new(config: LocalizerConfig, detector: Box<dyn FaceDetector>) -> Self {
        Self { config, detector }
    }

    /// Decode `input`, locate the primary face, and crop it to the canonical square.
    pub fn locate_and_crop(&self, input: &[u8]) -> Result<CroppedFace, LocalizeError> {
        let image = decode_image(input, self.config.max_input_dimension)?;
        self.crop_decoded(&image)
    }

    /// Same as [`locate_and_crop`](Self::locate_and_crop) for an already-decoded raster.
    pub fn crop_decoded(&self, image: &RgbImage) -> Result<CroppedFace, LocalizeError> {
        let (width, height) = image.dimensions();
        if width.min(height) < self.config.min_input_dimension {
            return Err(LocalizeError::ImageTooSmall {
                width,
                height,
                min: self.config.min_input_dimension,
            });
        }

        let candidates: Vec<BoundingBox> = self
            .detector
            .detect(image)?
            .iter()
            .filter_map(|c| c.clip(width, height))
            .collect();

        let face = select_primary(&candidates, self.config.min_confidence).ok_or_else(|| {
            tracing::debug!(
                detector = self.detector.name(),
                candidates = candidates.len(),
                best_confidence = candidates.iter().map(|c| c.confidence).fold(0.0f32, f32::max),
                "no candidate above confidence threshold"
            );
            LocalizeError::FaceNotFound
        })?;

        let crop = square_crop_region(face, width, height, self.config.margin_factor);
        let size = self.config.canonical_size;
        let cut = imageops::crop_imm(image, crop.x, crop.y, crop.width, crop.height).to_image();
        let canonical = imageops::resize(&cut, size, size, FilterType::Lanczos3);

        tracing::debug!(
            detector = self.detector.name(),
            candidates = candidates.len(),
            confidence = face.confidence,
            crop_x = crop.x,
            crop_y = crop.y,
            crop_side = crop.width,
            "face localized"
        );

        Ok(CroppedFace::new(canonical, FaceRegion::from_bbox(face, width, height)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::png::PngEncoder;
    use image::{ImageEncoder, Rgb};

    fn make_bbox(x: f32, y: f32, w: f32, h: f32, conf: f32) -> BoundingBox {
        BoundingBox { x, y, width: w, height: h, confidence: conf, landmarks: None }
    }

    /// Returns whatever boxes it was built with.
    struct FixedDetector(Vec<BoundingBox>);

    impl FaceDetector for FixedDetector {
        fn detect(&self, _image: &RgbImage) -> Result<Vec<BoundingBox>, DetectorError> {
            Ok(self.0.clone())
        }

        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    fn encode_png(img: &RgbImage) -> Vec<u8> {
        let mut buffer = Vec::new();
        PngEncoder::new(&mut buffer)
            .write_image(img.as_raw(), img.width(), img.height(), image::ExtendedColorType::Rgb8)
            .unwrap();
        buffer
    }

    fn localizer(boxes: Vec<BoundingBox>) -> FaceLocalizer {
        FaceLocalizer::new(LocalizerConfig::default(), Box::new(FixedDetector(boxes)))
    }

    #[test]
    fn test_select_largest() {
        let cands = vec![
            make_bbox(0.0, 0.0, 50.0, 50.0, 0.99),
            make_bbox(100.0, 0.0, 80.0, 90.0, 0.7),
            make_bbox(200.0, 0.0, 60.0, 60.0, 0.95),
        ];
        let best = select_primary(&cands, 0.5).unwrap();
        assert_eq!(best.x, 100.0);
    }

    #[test]
    fn test_select_skips_low_confidence() {
        let cands = vec![
            make_bbox(0.0, 0.0, 200.0, 200.0, 0.3),
            make_bbox(300.0, 0.0, 50.0, 50.0, 0.8),
        ];
        assert_eq!(select_primary(&cands, 0.5).unwrap().x, 300.0);
    }

    #[test]
    fn test_select_none_above_threshold() {
        let cands = vec![make_bbox(0.0, 0.0, 200.0, 200.0, 0.49)];
        assert!(select_primary(&cands, 0.5).is_none());
        assert!(select_primary(&[], 0.5).is_none());
    }

    #[test]
    fn test_select_tie_breaks_by_scan_order() {
        let cands = vec![
            make_bbox(300.0, 10.0, 50.0, 50.0, 0.9),
            make_bbox(10.0, 200.0, 50.0, 50.0, 0.9),
            make_bbox(100.0, 10.0, 50.0, 50.0, 0.6),
        ];
        let best = select_primary(&cands, 0.5).unwrap();
        assert_eq!((best.x, best.y), (100.0, 10.0));

        let mut reversed = cands.clone();
        reversed.reverse();
        let best = select_primary(&reversed, 0.5).unwrap();
        assert_eq!((best.x, best.y), (100.0, 10.0));
    }

    #[test]
    fn test_crop_region_centered() {
        let face = make_bbox(150.0, 100.0, 100.0, 100.0, 0.9);
        let crop = square_crop_region(&face, 400, 400, 1.4);
        assert_eq!(crop, CropRegion { x: 130, y: 80, width: 140, height: 140 });
    }

    #[test]
    fn test_crop_region_clamped_at_border() {
        let face = make_bbox(0.0, 0.0, 80.0, 100.0, 0.9);
        let crop = square_crop_region(&face, 640, 480, 1.5);
        assert_eq!(crop, CropRegion { x: 0, y: 0, width: 150, height: 150 });

        let face = make_bbox(590.0, 420.0, 50.0, 60.0, 0.9);
        let crop = square_crop_region(&face, 640, 480, 1.5);
        assert_eq!(crop.width, 90);
        assert_eq!(crop.x + crop.width, 640);
        assert_eq!(crop.y + crop.height, 480);
    }

    #[test]
    fn test_crop_region_shrinks_to_image() {
        let face = make_bbox(10.0, 10.0, 180.0, 90.0, 0.9);
        let crop = square_crop_region(&face, 200, 100, 2.0);
        assert_eq!(crop.width, 100);
        assert_eq!(crop.height, 100);
        assert_eq!(crop.y, 0);
        assert!(crop.x + crop.width <= 200);
    }

    #[test]
    fn test_locate_and_crop_canonical_size() {
        let img = RgbImage::from_pixel(300, 200, Rgb([90, 90, 90]));
        let loc = localizer(vec![make_bbox(100.0, 50.0, 60.0, 80.0, 0.9)]);
        let face = loc.locate_and_crop(&encode_png(&img)).unwrap();
        assert_eq!(face.dimensions(), (256, 256));
        assert!((face.region().x - 100.0 / 300.0).abs() < 1e-6);
        assert!((face.region().confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_candidate_outside_image_is_ignored() {
        let img = RgbImage::from_pixel(100, 100, Rgb([90, 90, 90]));
        let loc = localizer(vec![make_bbox(500.0, 500.0, 60.0, 60.0, 0.99)]);
        assert!(matches!(loc.crop_decoded(&img), Err(LocalizeError::FaceNotFound)));
    }

    #[test]
    fn test_no_candidates_is_face_not_found() {
        let img = RgbImage::from_pixel(100, 100, Rgb([90, 90, 90]));
        assert!(matches!(localizer(vec![]).crop_decoded(&img), Err(LocalizeError::FaceNotFound)));
    }

    #[test]
    fn test_rejects_tiny_input() {
        let img = RgbImage::from_pixel(200, 20, Rgb([90, 90, 90]));
        let loc = localizer(vec![make_bbox(0.0, 0.0, 10.0, 10.0, 0.9)]);
        let err = loc.locate_and_crop(&encode_png(&img)).unwrap_err();
        assert!(matches!(err, LocalizeError::ImageTooSmall { width: 200, height: 20, min: 64 }));
    }

    #[test]
    fn test_rejects_garbage_bytes() {
        let loc = localizer(vec![]);
        let err = loc.locate_and_crop(b"definitely not an image").unwrap_err();
        assert!(matches!(err, LocalizeError::ImageDecode(_)));
    }

    #[test]
    fn test_rejects_truncated_png() {
        let img = RgbImage::from_pixel(120, 120, Rgb([90, 90, 90]));
        let png = encode_png(&img);
        let loc = localizer(vec![]);
        let err = loc.locate_and_crop(&png[..png.len() / 2]).unwrap_err();
        assert!(matches!(err, LocalizeError::ImageDecode(_)));
    }

    #[test]
    fn test_rejects_over_limit_dimensions() {
        let img = RgbImage::from_pixel(300, 100, Rgb([90, 90, 90]));
        let config = LocalizerConfig { max_input_dimension: 256, ..LocalizerConfig::default() };
        let loc = FaceLocalizer::new(config, Box::new(FixedDetector(vec![])));
        let err = loc.locate_and_crop(&encode_png(&img)).unwrap_err();
        assert!(matches!(err, LocalizeError::ImageDecode(_)));
    }
}
