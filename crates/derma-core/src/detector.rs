//! Face detection backends.
//!
//! [`FaceDetector`] is the seam between localization and whatever finds faces.
//! The built-in [`SkinBlobDetector`] needs no model files; the SCRFD backend
//! lives in [`crate::scrfd`] behind the `scrfd` feature.

use crate::skin::{SkinMask, SkinRange};
use crate::types::BoundingBox;
use image::imageops::{self, FilterType};
use image::RgbImage;
use thiserror::Error;

// --- Named constants (no magic numbers) ---
const BLOB_ANALYSIS_SIZE: u32 = 160;
const BLOB_MIN_AREA_FRACTION: f32 = 0.01;
/// Height / width of a typical frontal face box.
const FACE_ASPECT: f32 = 1.3;
/// Area of an ellipse relative to its bounding box (π/4).
const ELLIPSE_FILL: f32 = std::f32::consts::FRAC_PI_4;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[cfg(feature = "scrfd")]
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Pluggable face detection backend.
///
/// Implementations return every candidate they find, in source pixel
/// coordinates and in a deterministic order for identical input. Selection of
/// the primary face is done by the localizer, not the detector.
pub trait FaceDetector: Send + Sync {
    fn detect(&self, image: &RgbImage) -> Result<Vec<BoundingBox>, DetectorError>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}

/// Connected skin-tone region found on the analysis grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Blob {
    area: usize,
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
}

impl Blob {
    fn box_width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    fn box_height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }
}

/// Heuristic detector: faces are large, roughly elliptical skin-tone blobs.
///
/// The image is downscaled to a small analysis grid, segmented with a
/// [`SkinRange`], split into 4-connected components, and each component is
/// scored by how closely its fill ratio and aspect ratio match a face.
#[derive(Debug, Clone)]
pub struct SkinBlobDetector {
    range: SkinRange,
    analysis_size: u32,
    min_area_fraction: f32,
}

impl SkinBlobDetector {
    pub fn new(range: SkinRange) -> Self {
        Self {
            range,
            analysis_size: BLOB_ANALYSIS_SIZE,
            min_area_fraction: BLOB_MIN_AREA_FRACTION,
        }
    }

    /// Longest side of the analysis grid. Larger grids resolve smaller faces.
    pub fn with_analysis_size(mut self, size: u32) -> Self {
        self.analysis_size = size.max(16);
        self
    }
}

impl Default for SkinBlobDetector {
    fn default() -> Self {
        Self::new(SkinRange::default())
    }
}

impl FaceDetector for SkinBlobDetector {
    fn detect(&self, image: &RgbImage) -> Result<Vec<BoundingBox>, DetectorError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Ok(Vec::new());
        }

        let scale = (self.analysis_size as f32 / width.max(height) as f32).min(1.0);
        let grid_w = ((width as f32 * scale).round() as u32).max(1);
        let grid_h = ((height as f32 * scale).round() as u32).max(1);
        let mask = if grid_w == width && grid_h == height {
            SkinMask::from_image(image, &self.range)
        } else {
            let grid = imageops::resize(image, grid_w, grid_h, FilterType::Triangle);
            SkinMask::from_image(&grid, &self.range)
        };

        let min_area = (grid_w * grid_h) as f32 * self.min_area_fraction;
        let sx = width as f32 / grid_w as f32;
        let sy = height as f32 / grid_h as f32;

        let candidates: Vec<BoundingBox> = connected_components(&mask)
            .into_iter()
            .filter(|blob| blob.area as f32 >= min_area)
            .map(|blob| BoundingBox {
                x: blob.min_x as f32 * sx,
                y: blob.min_y as f32 * sy,
                width: blob.box_width() as f32 * sx,
                height: blob.box_height() as f32 * sy,
                confidence: face_likeness(&blob),
                landmarks: None,
            })
            .collect();

        tracing::debug!(
            grid_w,
            grid_h,
            skin_fraction = mask.fraction(),
            candidates = candidates.len(),
            "skin-blob detection"
        );

        Ok(candidates)
    }

    fn name(&self) -> &'static str {
        "skin-blob"
    }
}

/// Label 4-connected skin components, returned in raster order of their
/// first pixel.
fn connected_components(mask: &SkinMask) -> Vec<Blob> {
    let (w, h) = (mask.width, mask.height);
    let mut visited = vec![false; (w * h) as usize];
    let mut blobs = Vec::new();
    let mut stack = Vec::new();

    for y in 0..h {
        for x in 0..w {
            let idx = (y * w + x) as usize;
            if visited[idx] || !mask.get(x, y) {
                continue;
            }

            visited[idx] = true;
            stack.push((x, y));
            let mut blob = Blob { area: 0, min_x: x, min_y: y, max_x: x, max_y: y };

            while let Some((px, py)) = stack.pop() {
                blob.area += 1;
                blob.min_x = blob.min_x.min(px);
                blob.min_y = blob.min_y.min(py);
                blob.max_x = blob.max_x.max(px);
                blob.max_y = blob.max_y.max(py);

                let neighbors = [
                    (px.wrapping_sub(1), py),
                    (px + 1, py),
                    (px, py.wrapping_sub(1)),
                    (px, py + 1),
                ];
                for (nx, ny) in neighbors {
                    if nx >= w || ny >= h {
                        continue;
                    }
                    let nidx = (ny * w + nx) as usize;
                    if !visited[nidx] && mask.get(nx, ny) {
                        visited[nidx] = true;
                        stack.push((nx, ny));
                    }
                }
            }

            blobs.push(blob);
        }
    }

    blobs
}

/// Score in [0, 1] combining elliptical fill and face-like aspect ratio.
fn face_likeness(blob: &Blob) -> f32 {
    let box_area = (blob.box_width() * blob.box_height()) as f32;
    let fill = blob.area as f32 / box_area;
    let fill_score = (1.0 - (fill - ELLIPSE_FILL).abs() / ELLIPSE_FILL).clamp(0.0, 1.0);

    // Log-ratio so 2× too wide and 2× too tall are penalised equally.
    let aspect = blob.box_height() as f32 / blob.box_width() as f32;
    let aspect_score = (1.0 - (aspect / FACE_ASPECT).ln().abs() / std::f32::consts::LN_2).clamp(0.0, 1.0);

    0.5 * fill_score + 0.5 * aspect_score
}
