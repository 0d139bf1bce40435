//! Skin metric extraction from a canonical face crop.
//!
//! Segmentation runs first; every signal is computed over skin pixels only.
//! Extraction assumes a roughly frontal, evenly lit face. There is no lighting
//! normalization, so harsh side light will read as uneven tone and strong
//! overhead light as oiliness.

use crate::config::ExtractorConfig;
use crate::skin::{SkinMask, SkinRange, Ycc};
use crate::types::{to_score, CroppedFace, SkinMetrics};
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ExtractError {
    #[error("insufficient skin pixels: {coverage:.3} of the crop, need {required:.3}")]
    InsufficientSkin { coverage: f32, required: f32 },
    #[error("degenerate crop: {0}")]
    DegenerateCrop(String),
}

/// T-zone rectangles in normalized crop coordinates: (x0, y0, x1, y1).
///
/// Forehead band, nose column, chin band, for a face framed by the localizer's
/// margin.
const T_ZONE: [(f32, f32, f32, f32); 3] = [
    (0.28, 0.12, 0.72, 0.32),
    (0.42, 0.32, 0.58, 0.66),
    (0.36, 0.76, 0.64, 0.92),
];

fn in_t_zone(nx: f32, ny: f32) -> bool {
    T_ZONE
        .iter()
        .any(|&(x0, y0, x1, y1)| nx >= x0 && nx < x1 && ny >= y0 && ny < y1)
}

/// Median of a luma histogram (lower median for even counts).
fn histogram_median(hist: &[u32; 256], total: u32) -> f32 {
    let target = total.div_ceil(2);
    let mut seen = 0u32;
    for (value, &count) in hist.iter().enumerate() {
        seen += count;
        if seen >= target {
            return value as f32;
        }
    }
    255.0
}

/// Computes [`SkinMetrics`] from canonical face crops.
#[derive(Debug, Clone)]
pub struct SkinMetricExtractor {
    config: ExtractorConfig,
    range: SkinRange,
    canonical_size: u32,
}

impl SkinMetricExtractor {
    pub fn new(config: ExtractorConfig, range: SkinRange, canonical_size: u32) -> Self {
        Self {
            config,
            range,
            canonical_size,
        }
    }

    pub fn extract(&self, face: &CroppedFace) -> Result<SkinMetrics, ExtractError> {
        let image = face.image();
        let (w, h) = image.dimensions();
        if w != self.canonical_size || h != self.canonical_size {
            return Err(ExtractError::DegenerateCrop(format!(
                "expected {0}x{0} crop, got {w}x{h}",
                self.canonical_size
            )));
        }

        let mask = SkinMask::from_image(image, &self.range);
        let coverage = mask.fraction();
        // Every later statistic averages over skin pixels; none means no metrics.
        if coverage < self.config.min_skin_fraction || mask.count() == 0 {
            return Err(ExtractError::InsufficientSkin {
                coverage,
                required: self.config.min_skin_fraction,
            });
        }

        // Pass 1: skin luma histogram, redness, luma moments.
        let mut hist = [0u32; 256];
        let mut skin_count = 0u32;
        let mut redness_sum = 0.0f64;
        let mut luma_sum = 0.0f64;
        let mut luma_sq_sum = 0.0f64;
        let cfg = &self.config;

        for (x, y, pixel) in image.enumerate_pixels() {
            if !mask.get(x, y) {
                continue;
            }
            let p = Ycc::from_rgb(pixel);
            skin_count += 1;
            hist[p.y.round().clamp(0.0, 255.0) as usize] += 1;
            luma_sum += p.y as f64;
            luma_sq_sum += (p.y as f64) * (p.y as f64);
            redness_sum += ((p.cr - cfg.redness_baseline_cr) / cfg.redness_span).clamp(0.0, 1.0) as f64;
        }

        let n = skin_count as f64;
        let median_luma = histogram_median(&hist, skin_count);
        let mean_luma = luma_sum / n;
        let luma_std = (luma_sq_sum / n - mean_luma * mean_luma).max(0.0).sqrt();

        // Pass 2: specular highlights inside the T-zone.
        let highlight_floor = median_luma + cfg.highlight_luma_offset;
        let headroom = (255.0 - median_luma).max(1.0);
        let mut pool = 0u32;
        let mut highlights = 0u32;
        let mut intensity_sum = 0.0f64;

        for (x, y, pixel) in image.enumerate_pixels() {
            let nx = (x as f32 + 0.5) / w as f32;
            let ny = (y as f32 + 0.5) / h as f32;
            if !in_t_zone(nx, ny) {
                continue;
            }
            let p = Ycc::from_rgb(pixel);
            // Highlights wash out chroma and fall outside the skin mask, so
            // they join the pool on their own.
            let is_highlight = p.y >= highlight_floor && p.chroma() <= cfg.highlight_max_chroma;
            if is_highlight {
                highlights += 1;
                intensity_sum += ((p.y - median_luma) / headroom).clamp(0.0, 1.0) as f64;
            }
            if is_highlight || mask.get(x, y) {
                pool += 1;
            }
        }

        if pool == 0 {
            return Err(ExtractError::DegenerateCrop("no skin in the T-zone".to_string()));
        }

        let raw_oiliness = intensity_sum / pool as f64;
        let oiliness = 100.0 * (1.0 - (-(cfg.oiliness_gain as f64) * raw_oiliness).exp());
        let redness = 100.0 * redness_sum / n;
        let evenness = 100.0 * (1.0 - luma_std / cfg.evenness_span as f64);

        let metrics = SkinMetrics {
            oiliness: to_score(oiliness),
            redness: to_score(redness),
            evenness: to_score(evenness),
            coverage: to_score(coverage as f64 * 100.0),
        };

        tracing::debug!(
            skin_pixels = skin_count,
            median_luma,
            t_zone_pool = pool,
            highlights,
            oiliness = metrics.oiliness,
            redness = metrics.redness,
            evenness = metrics.evenness,
            coverage = metrics.coverage,
            "skin metrics extracted"
        );

        Ok(metrics)
    }
}
