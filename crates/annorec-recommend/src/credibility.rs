//! Credibility oracle: a pretrained classifier mapping a fixed-length feature
//! vector to a probability that the candidate set holds the right answer.
//!
//! Weights are trained elsewhere; this crate only evaluates them.

use serde::{Deserialize, Serialize};

pub trait CredibilityModel: Send + Sync {
    fn predict(&self, features: &[f64]) -> f64;
}

impl<F> CredibilityModel for F
where
    F: Fn(&[f64]) -> f64 + Send + Sync,
{
    fn predict(&self, features: &[f64]) -> f64 {
        self(features)
    }
}

/// Clamp an oracle output to [0, 1]; NaN counts as 0.
pub fn clamp_probability(p: f64) -> f64 {
    if p.is_nan() {
        0.0
    } else {
        p.clamp(0.0, 1.0)
    }
}

/// `sigmoid(intercept + weights · features)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticCredibility {
    pub weights: Vec<f64>,
    #[serde(default)]
    pub intercept: f64,
}

impl LogisticCredibility {
    pub fn new(weights: Vec<f64>, intercept: f64) -> Self {
        Self { weights, intercept }
    }
}

impl CredibilityModel for LogisticCredibility {
    fn predict(&self, features: &[f64]) -> f64 {
        if features.len() != self.weights.len() {
            tracing::warn!(
                expected = self.weights.len(),
                got = features.len(),
                "credibility feature length mismatch"
            );
        }
        let z: f64 = self.intercept
            + self
                .weights
                .iter()
                .zip(features)
                .map(|(w, x)| w * x)
                .sum::<f64>();
        1.0 / (1.0 + (-z).exp())
    }
}
