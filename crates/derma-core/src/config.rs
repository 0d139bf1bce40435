//! Tunable thresholds for every pipeline stage.
//!
//! Every field has a default, so a TOML file only needs to name what it
//! overrides:
//!
//! ```toml
//! [localizer]
//! margin_factor = 1.6
//!
//! [matcher]
//! max_count = 6
//! sensitivity_markers = ["แพ้ง่าย", "sensitive", "allergic"]
//! ```

use crate::skin::SkinRange;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("reading config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Complete configuration for [`crate::Pipeline`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub skin: SkinRange,
    pub localizer: LocalizerConfig,
    pub extractor: ExtractorConfig,
    pub matcher: MatcherConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalizerConfig {
    /// Candidates scoring below this are discarded.
    pub min_confidence: f32,
    /// Side of the square crop relative to the longer side of the face box.
    pub margin_factor: f32,
    /// Output crop is `canonical_size × canonical_size`.
    pub canonical_size: u32,
    /// Inputs whose shorter side is below this are rejected.
    pub min_input_dimension: u32,
    /// Decoder limit on either side; larger images fail to decode.
    pub max_input_dimension: u32,
}

impl Default for LocalizerConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            margin_factor: 1.4,
            canonical_size: 256,
            min_input_dimension: 64,
            max_input_dimension: 8192,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Minimum share of the crop classified as skin.
    pub min_skin_fraction: f32,
    /// Luma above the median skin luma that marks a specular highlight.
    pub highlight_luma_offset: f32,
    /// Highlights are near-white; pixels with more chroma than this are not.
    pub highlight_max_chroma: f32,
    /// Steepness of the oiliness calibration curve.
    pub oiliness_gain: f32,
    /// Cr of neutral, non-irritated skin.
    pub redness_baseline_cr: f32,
    /// Cr excess over the baseline that scores 100.
    pub redness_span: f32,
    /// Luma standard deviation that scores 0 evenness.
    pub evenness_span: f32,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            min_skin_fraction: 0.15,
            highlight_luma_offset: 40.0,
            highlight_max_chroma: 40.0,
            oiliness_gain: 12.0,
            redness_baseline_cr: 145.0,
            redness_span: 30.0,
            evenness_span: 64.0,
        }
    }
}

/// How sensitivity markers are matched against the declared skin type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerMatch {
    /// Case-insensitive substring anywhere in the declared text.
    #[default]
    Substring,
    /// Case-insensitive equality with a whole alphanumeric token.
    Token,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    pub max_count: usize,
    pub sensitivity_markers: Vec<String>,
    pub marker_match: MarkerMatch,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            max_count: 4,
            sensitivity_markers: vec!["แพ้ง่าย".to_string(), "sensitive".to_string()],
            marker_match: MarkerMatch::Substring,
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no pipeline config file, using defaults");
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));
        let loc = &self.localizer;
        if !(0.0..=1.0).contains(&loc.min_confidence) {
            return invalid(format!("localizer.min_confidence must be in [0, 1], got {}", loc.min_confidence));
        }
        if loc.margin_factor < 1.0 || !loc.margin_factor.is_finite() {
            return invalid(format!("localizer.margin_factor must be >= 1.0, got {}", loc.margin_factor));
        }
        if loc.canonical_size < 32 {
            return invalid(format!("localizer.canonical_size must be >= 32, got {}", loc.canonical_size));
        }
        if loc.min_input_dimension == 0 || loc.min_input_dimension > loc.max_input_dimension {
            return invalid(format!(
                "localizer input bounds must satisfy 0 < min ({}) <= max ({})",
                loc.min_input_dimension, loc.max_input_dimension
            ));
        }

        let ext = &self.extractor;
        if !(ext.min_skin_fraction > 0.0 && ext.min_skin_fraction <= 1.0) {
            return invalid(format!("extractor.min_skin_fraction must be in (0, 1], got {}", ext.min_skin_fraction));
        }
        if ext.redness_span <= 0.0 || ext.evenness_span <= 0.0 || ext.oiliness_gain <= 0.0 {
            return invalid("extractor spans and gain must be positive".to_string());
        }

        let skin = &self.skin;
        if skin.cb_min > skin.cb_max || skin.cr_min > skin.cr_max {
            return invalid("skin range minimums must not exceed maximums".to_string());
        }

        if self.matcher.sensitivity_markers.iter().any(|m| m.trim().is_empty()) {
            return invalid("matcher.sensitivity_markers must not contain blank entries".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        PipelineConfig::default().validate().unwrap();
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [localizer]
            margin_factor = 1.6

            [matcher]
            max_count = 6
            marker_match = "token"
            "#,
        )
        .unwrap();
        assert_eq!(config.localizer.margin_factor, 1.6);
        assert_eq!(config.localizer.canonical_size, 256);
        assert_eq!(config.matcher.max_count, 6);
        assert_eq!(config.matcher.marker_match, MarkerMatch::Token);
        assert_eq!(config.matcher.sensitivity_markers.len(), 2);
        assert_eq!(config.extractor, ExtractorConfig::default());
    }

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(PipelineConfig::from_toml_str("").unwrap(), PipelineConfig::default());
    }

    #[test]
    fn test_rejects_shrinking_margin() {
        let err = PipelineConfig::from_toml_str("[localizer]\nmargin_factor = 0.8\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)), "{err}");
    }

    #[test]
    fn test_rejects_zero_skin_fraction() {
        let err = PipelineConfig::from_toml_str("[extractor]\nmin_skin_fraction = 0.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)), "{err}");
    }

    #[test]
    fn test_rejects_blank_marker() {
        let err = PipelineConfig::from_toml_str("[matcher]\nsensitivity_markers = [\" \"]\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_malformed_toml() {
        let err = PipelineConfig::from_toml_str("[localizer\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = PipelineConfig::default();
        let raw = config.to_toml_string().unwrap();
        assert_eq!(PipelineConfig::from_toml_str(&raw).unwrap(), config);
    }

    #[test]
    fn test_missing_file_is_default() {
        let path = Path::new("/nonexistent/derma/pipeline.toml");
        assert_eq!(PipelineConfig::load(path).unwrap(), PipelineConfig::default());
    }
}
