//! JSON envelopes returned to the user.

use crate::advisor::{Advice, AdvisorError};
use crate::engine::EngineError;
use chrono::{DateTime, Utc};
use derma_core::{Assessment, FaceRegion, FailureKind, ProductRecord, SkinMetrics, SkinTag};
use serde::Serialize;

const MORNING_STEPS: [&str; 3] = ["Cleanse the face", "Apply a moisturizer or serum", "Apply sunscreen every morning"];
const EVENING_STEPS: [&str; 3] = ["Remove makeup and sunscreen", "Cleanse the face", "Apply a night cream before bed"];
const FALLBACK_INGREDIENTS: [&str; 2] = ["Ceramide", "Hyaluronic Acid"];
const FALLBACK_ADVICE: &str = "Focus on the care steps above and keep the routine consistent.";

#[derive(Debug, Clone, Serialize)]
pub struct Routine {
    pub morning: Vec<String>,
    pub evening: Vec<String>,
    pub ingredients: Vec<String>,
    pub advice: String,
}

impl Routine {
    /// Fixed daily steps plus the advisor's output, or the fallback when it failed.
    pub fn new(advice: Result<Advice, AdvisorError>) -> Self {
        let (ingredients, advice) = match advice {
            Ok(advice) => (advice.recommended_ingredients, advice.analysis),
            Err(e) => {
                tracing::warn!(error = %e, "advisor failed; using default advice");
                (
                    FALLBACK_INGREDIENTS.iter().map(|s| s.to_string()).collect(),
                    FALLBACK_ADVICE.to_string(),
                )
            }
        };
        Self {
            morning: MORNING_STEPS.iter().map(|s| s.to_string()).collect(),
            evening: EVENING_STEPS.iter().map(|s| s.to_string()).collect(),
            ingredients,
            advice,
        }
    }
}

/// Successful analysis envelope.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub request_id: String,
    pub analyzed_at: DateTime<Utc>,
    pub analysis: SkinMetrics,
    pub skin_tag: SkinTag,
    pub face: FaceRegion,
    pub routine: Routine,
    pub products: Vec<ProductRecord>,
}

impl Report {
    pub fn new(request_id: String, assessment: Assessment, advice: Result<Advice, AdvisorError>) -> Self {
        Self {
            request_id,
            analyzed_at: Utc::now(),
            analysis: assessment.metrics,
            skin_tag: assessment.recommendation.tag,
            face: assessment.region,
            routine: Routine::new(advice),
            products: assessment.recommendation.products,
        }
    }
}

/// Failure envelope with an HTTP-style status.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub error: String,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<FailureKind>,
}

impl ErrorReport {
    pub fn from_engine(err: &EngineError) -> Self {
        match err {
            EngineError::Analysis(e) => Self::for_kind(e.kind()),
            EngineError::Timeout(_) => Self {
                error: "Analysis took too long; please try again".to_string(),
                status: 504,
                kind: None,
            },
            EngineError::ChannelClosed | EngineError::Spawn(_) => Self {
                error: "Analysis service unavailable".to_string(),
                status: 503,
                kind: None,
            },
        }
    }

    pub fn for_kind(kind: FailureKind) -> Self {
        let (error, status) = match kind {
            FailureKind::ImageDecode => ("The upload is not a readable image", 422),
            FailureKind::ImageTooSmall => ("The image is too small to analyze", 400),
            FailureKind::FaceNotFound => ("No face could be detected in the image", 400),
            FailureKind::ExtractionFailed => ("Skin analysis failed", 400),
            FailureKind::Internal => ("Internal analysis error", 500),
        };
        Self {
            error: error.to_string(),
            status,
            kind: Some(kind),
        }
    }

    /// Process exit code: 2 for client input errors, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        if (400..500).contains(&self.status) {
            2
        } else {
            1
        }
    }
}
