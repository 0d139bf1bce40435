//! derma-core — Face localization, skin metric extraction and product matching.
//!
//! Raw photo bytes flow strictly forward through three stages:
//! [`FaceLocalizer`] crops the primary face to a canonical square,
//! [`SkinMetricExtractor`] turns the crop into bounded skin signals, and
//! [`ProductMatcher`] derives a skin tag and samples matching products from an
//! immutable [`Catalog`]. [`Pipeline`] wires the three together.

pub mod catalog;
pub mod config;
pub mod detector;
pub mod localizer;
pub mod matcher;
pub mod metrics;
pub mod pipeline;
#[cfg(feature = "scrfd")]
pub mod scrfd;
pub mod skin;
pub mod types;

pub use catalog::{Catalog, CatalogError, ProductRecord, ProductTag};
pub use config::{ConfigError, PipelineConfig};
pub use detector::{DetectorError, FaceDetector, SkinBlobDetector};
pub use localizer::{FaceLocalizer, LocalizeError};
pub use matcher::{ProductMatcher, Recommendation};
pub use metrics::{ExtractError, SkinMetricExtractor};
pub use pipeline::{AnalysisError, Assessment, FailureKind, Pipeline};
#[cfg(feature = "scrfd")]
pub use scrfd::ScrfdDetector;
pub use types::{BoundingBox, CroppedFace, FaceRegion, SkinMetrics, SkinTag};
