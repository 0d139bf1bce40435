use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Detector-level face candidate in source pixel coordinates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersect with the `width × height` image rectangle.
    ///
    /// Returns `None` when nothing of the box lies inside the image.
    pub fn clip(&self, width: u32, height: u32) -> Option<BoundingBox> {
        let x1 = self.x.max(0.0);
        let y1 = self.y.max(0.0);
        let x2 = (self.x + self.width).min(width as f32);
        let y2 = (self.y + self.height).min(height as f32);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(BoundingBox {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
            confidence: self.confidence,
            landmarks: self.landmarks,
        })
    }
}

/// Face location relative to the source image.
///
/// All coordinates are normalized to `[0, 1]` so the region is independent of
/// the source resolution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceRegion {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

impl FaceRegion {
    /// Normalize a pixel-space box against the source dimensions.
    pub fn from_bbox(bbox: &BoundingBox, source_width: u32, source_height: u32) -> Self {
        let sw = source_width.max(1) as f32;
        let sh = source_height.max(1) as f32;
        Self {
            x: (bbox.x / sw).clamp(0.0, 1.0),
            y: (bbox.y / sh).clamp(0.0, 1.0),
            width: (bbox.width / sw).clamp(0.0, 1.0),
            height: (bbox.height / sh).clamp(0.0, 1.0),
            confidence: bbox.confidence,
        }
    }
}

/// A face cut out of its source and resampled to the canonical square.
#[derive(Debug, Clone, PartialEq)]
pub struct CroppedFace {
    image: RgbImage,
    region: FaceRegion,
}

impl CroppedFace {
    pub fn new(image: RgbImage, region: FaceRegion) -> Self {
        Self { image, region }
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn region(&self) -> &FaceRegion {
        &self.region
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn into_image(self) -> RgbImage {
        self.image
    }
}

/// Quantitative skin signals, each on a 0–100 inclusive scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkinMetrics {
    /// Specular-highlight density in the T-zone.
    pub oiliness: f32,
    /// Red-chroma dominance of skin pixels over a neutral baseline.
    pub redness: f32,
    /// Tone uniformity; 100 is perfectly even.
    pub evenness: f32,
    /// Share of the crop classified as skin.
    pub coverage: f32,
}

impl SkinMetrics {
    /// Named view of every signal, in a stable order.
    pub fn signals(&self) -> [(&'static str, f32); 4] {
        [
            ("oiliness", self.oiliness),
            ("redness", self.redness),
            ("evenness", self.evenness),
            ("coverage", self.coverage),
        ]
    }

    pub fn get(&self, name: &str) -> Option<f32> {
        self.signals()
            .into_iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v)
    }
}

/// Clamp to the metric scale and round to one decimal.
pub(crate) fn to_score(value: f64) -> f32 {
    ((value.clamp(0.0, 100.0) * 10.0).round() / 10.0) as f32
}

/// Categorical skin bucket that drives catalog filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkinTag {
    Oily,
    Dry,
    Normal,
    Sensitive,
}

impl SkinTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkinTag::Oily => "oily",
            SkinTag::Dry => "dry",
            SkinTag::Normal => "normal",
            SkinTag::Sensitive => "sensitive",
        }
    }
}

impl fmt::Display for SkinTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SkinTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "oily" => Ok(SkinTag::Oily),
            "dry" => Ok(SkinTag::Dry),
            "normal" => Ok(SkinTag::Normal),
            "sensitive" => Ok(SkinTag::Sensitive),
            other => Err(format!("unknown skin tag: {other}")),
        }
    }
}
