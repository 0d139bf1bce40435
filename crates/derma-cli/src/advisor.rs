//! Care advice generation.
//!
//! The pipeline never calls an advisor; the CLI consults one after analysis
//! and tolerates its failure.

use derma_core::config::MatcherConfig;
use derma_core::matcher::derive_tag;
use derma_core::{SkinMetrics, SkinTag};
use thiserror::Error;

const REDNESS_CONCERN: f32 = 40.0;
const EVENNESS_CONCERN: f32 = 60.0;

#[derive(Error, Debug)]
pub enum AdvisorError {
    /// Reserved for remote advisors; `RuleAdvisor` never produces it.
    #[error("advisor unavailable: {0}")]
    Unavailable(String),
    #[error("advisor returned no usable advice")]
    Empty,
}

/// Free-text advice plus the ingredients it recommends.
#[derive(Debug, Clone, PartialEq)]
pub struct Advice {
    pub analysis: String,
    pub recommended_ingredients: Vec<String>,
}

/// Source of care advice for measured skin.
pub trait Advisor: Send + Sync {
    fn consult(&self, metrics: &SkinMetrics, skin_type: &str, allergies: &str) -> Result<Advice, AdvisorError>;
}

/// Offline advisor driven by fixed rules over the metrics.
#[derive(Debug, Clone, Default)]
pub struct RuleAdvisor {
    matcher: MatcherConfig,
}

impl RuleAdvisor {
    /// Uses the same sensitivity markers as the product matcher so advice and
    /// products agree on the skin tag.
    pub fn new(matcher: MatcherConfig) -> Self {
        Self { matcher }
    }
}

impl Advisor for RuleAdvisor {
    fn consult(&self, metrics: &SkinMetrics, skin_type: &str, allergies: &str) -> Result<Advice, AdvisorError> {
        let tag = derive_tag(metrics, skin_type, &self.matcher);
        let mut ingredients: Vec<&str> = Vec::new();
        let mut notes: Vec<String> = Vec::new();

        match tag {
            SkinTag::Oily => {
                ingredients.extend(["Niacinamide", "Salicylic Acid", "Zinc PCA"]);
                notes.push(format!(
                    "Your T-zone shows noticeable shine (oiliness {:.0}/100); use a gentle foaming cleanser and a light, oil-free moisturizer.",
                    metrics.oiliness
                ));
            }
            SkinTag::Dry => {
                ingredients.extend(["Ceramide", "Hyaluronic Acid", "Squalane"]);
                notes.push("Your skin shows little surface oil; layer hydration and seal it with a barrier cream.".to_string());
            }
            SkinTag::Normal => {
                ingredients.extend(["Hyaluronic Acid", "Niacinamide"]);
                notes.push("Your oil balance looks healthy; keep the routine simple and consistent.".to_string());
            }
            SkinTag::Sensitive => {
                ingredients.extend(["Ceramide", "Panthenol", "Centella Asiatica"]);
                notes.push("You reported sensitive skin; introduce one new product at a time and patch-test first.".to_string());
            }
        }

        if metrics.redness > REDNESS_CONCERN {
            ingredients.extend(["Centella Asiatica", "Panthenol"]);
            notes.push(format!(
                "Visible redness ({:.0}/100) suggests irritation; skip fragrance and strong exfoliants for now.",
                metrics.redness
            ));
        }
        if metrics.evenness < EVENNESS_CONCERN {
            ingredients.push("Vitamin C");
            notes.push("Tone looks uneven; daily sunscreen matters most for fading marks.".to_string());
        }

        let allergens: Vec<String> = allergies
            .split([',', ';', '/'])
            .map(|a| a.trim().to_lowercase())
            .filter(|a| !a.is_empty() && a != "none" && a != "ไม่มี")
            .collect();

        let mut recommended: Vec<String> = Vec::new();
        for ingredient in ingredients {
            let lower = ingredient.to_lowercase();
            let excluded = allergens.iter().any(|a| lower.contains(a.as_str()) || a.contains(lower.as_str()));
            if !excluded && !recommended.iter().any(|r| r == ingredient) {
                recommended.push(ingredient.to_string());
            }
        }

        if recommended.is_empty() {
            return Err(AdvisorError::Empty);
        }
        if !allergens.is_empty() {
            notes.push(format!("Suggestions avoid your listed allergies: {}.", allergens.join(", ")));
        }

        Ok(Advice {
            analysis: notes.join(" "),
            recommended_ingredients: recommended,
        })
    }
}
