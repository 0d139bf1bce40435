//! End-to-end assessment: bytes → crop → metrics → tag → products.

use crate::catalog::Catalog;
use crate::config::{ConfigError, PipelineConfig};
use crate::detector::{FaceDetector, SkinBlobDetector};
use crate::localizer::{FaceLocalizer, LocalizeError};
use crate::matcher::{ProductMatcher, Recommendation};
use crate::metrics::{ExtractError, SkinMetricExtractor};
use crate::types::{CroppedFace, FaceRegion, SkinMetrics};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error(transparent)]
    Localize(#[from] LocalizeError),
    #[error("metric extraction failed: {0}")]
    Extract(#[from] ExtractError),
}

/// Coarse failure class for the boundary layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Bytes did not decode to a supported raster.
    ImageDecode,
    /// Decoded, but below the minimum resolution.
    ImageTooSmall,
    /// No face above the confidence threshold.
    FaceNotFound,
    /// Not enough skin, or an unusable crop.
    ExtractionFailed,
    /// Detector backend failure; not the client's fault.
    Internal,
}

impl AnalysisError {
    pub fn kind(&self) -> FailureKind {
        match self {
            AnalysisError::Localize(LocalizeError::ImageDecode(_)) => FailureKind::ImageDecode,
            AnalysisError::Localize(LocalizeError::ImageTooSmall { .. }) => FailureKind::ImageTooSmall,
            AnalysisError::Localize(LocalizeError::FaceNotFound) => FailureKind::FaceNotFound,
            AnalysisError::Localize(LocalizeError::Detector(_)) => FailureKind::Internal,
            AnalysisError::Extract(_) => FailureKind::ExtractionFailed,
        }
    }
}

/// Everything the core produces for one photo.
#[derive(Debug, Clone, Serialize)]
pub struct Assessment {
    pub region: FaceRegion,
    pub metrics: SkinMetrics,
    pub recommendation: Recommendation,
}

/// The three stages plus the catalog snapshot they share.
///
/// Holds no per-call state, so one instance can serve any number of threads.
pub struct Pipeline {
    localizer: FaceLocalizer,
    extractor: SkinMetricExtractor,
    matcher: ProductMatcher,
    catalog: Catalog,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, detector: Box<dyn FaceDetector>, catalog: Catalog) -> Result<Self, ConfigError> {
        config.validate()?;
        tracing::info!(
            detector = detector.name(),
            canonical_size = config.localizer.canonical_size,
            products = catalog.len(),
            "pipeline ready"
        );
        Ok(Self {
            extractor: SkinMetricExtractor::new(
                config.extractor.clone(),
                config.skin,
                config.localizer.canonical_size,
            ),
            matcher: ProductMatcher::new(config.matcher.clone()),
            localizer: FaceLocalizer::new(config.localizer, detector),
            catalog,
        })
    }

    /// Pipeline using the built-in skin-blob detector.
    pub fn with_skin_detector(config: PipelineConfig, catalog: Catalog) -> Result<Self, ConfigError> {
        let detector = SkinBlobDetector::new(config.skin);
        Self::new(config, Box::new(detector), catalog)
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn locate_and_crop(&self, image: &[u8]) -> Result<CroppedFace, LocalizeError> {
        self.localizer.locate_and_crop(image)
    }

    pub fn extract(&self, face: &CroppedFace) -> Result<SkinMetrics, ExtractError> {
        self.extractor.extract(face)
    }

    pub fn recommend(&self, metrics: &SkinMetrics, declared_skin_type: &str) -> Recommendation {
        self.matcher.recommend(metrics, declared_skin_type, &self.catalog)
    }

    /// Localize and extract; no products.
    pub fn measure(&self, image: &[u8]) -> Result<(CroppedFace, SkinMetrics), AnalysisError> {
        let face = self.locate_and_crop(image)?;
        let metrics = self.extract(&face)?;
        Ok((face, metrics))
    }

    /// Run every stage. Either the full assessment or a tagged failure.
    pub fn assess(&self, image: &[u8], declared_skin_type: &str) -> Result<Assessment, AnalysisError> {
        let (face, metrics) = self.measure(image)?;
        let recommendation = self.recommend(&metrics, declared_skin_type);
        Ok(Assessment {
            region: *face.region(),
            metrics,
            recommendation,
        })
    }
}
