use std::path::Path;

use anyhow::{anyhow, Context, Result};
use annorec_match::{Mssc, SpeciesMethod};
use serde::{Deserialize, Serialize};

use crate::credibility::LogisticCredibility;

pub const DEFAULT_ROUND_DIGITS: u32 = 3;
pub const MAX_ROUND_DIGITS: u32 = 10;

// ============================================================================
// Recommender Configuration
// ============================================================================

/// Configuration for the recommender
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommenderConfig {
    /// Species scoring method: `"cdist"` (cosine) or `"edist"` (edit distance)
    pub species_method: SpeciesMethod,
    /// Candidate selection for user-facing recommendations
    pub mssc: Mssc,
    /// Decimal places kept in recommendation scores
    pub round_digits: u32,
    /// Use existing species annotations (instead of predictions) when scoring reactions
    pub use_existing_species_annotation: bool,
    /// Weights of the species credibility classifier
    pub species_credibility: Option<LogisticCredibility>,
    /// Weights of the reaction credibility classifier
    pub reaction_credibility: Option<LogisticCredibility>,
}

impl Default for RecommenderConfig {
    fn default() -> Self {
        Self {
            species_method: SpeciesMethod::Cosine,
            mssc: Mssc::default(),
            round_digits: DEFAULT_ROUND_DIGITS,
            use_existing_species_annotation: false,
            species_credibility: None,
            reaction_credibility: None,
        }
    }
}

impl RecommenderConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).context("failed to parse recommender config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.mssc.cutoff.is_finite() || self.mssc.cutoff < 0.0 {
            return Err(anyhow!(
                "mssc cutoff must be a finite, non-negative number (got {})",
                self.mssc.cutoff
            ));
        }
        if self.round_digits > MAX_ROUND_DIGITS {
            return Err(anyhow!(
                "round_digits must be at most {MAX_ROUND_DIGITS} (got {})",
                self.round_digits
            ));
        }
        for (name, model) in [
            ("species_credibility", &self.species_credibility),
            ("reaction_credibility", &self.reaction_credibility),
        ] {
            if let Some(model) = model {
                if model.weights.iter().any(|w| !w.is_finite()) || !model.intercept.is_finite() {
                    return Err(anyhow!("{name} weights must be finite"));
                }
            }
        }
        Ok(())
    }
}
