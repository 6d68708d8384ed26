use std::cmp::Ordering;

use annorec_reference::Term;
use serde::{Deserialize, Serialize};

/// A scored ontology term. Every ranked list in this crate is a `Vec<Candidate>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub term: Term,
    pub score: f64,
}

impl Candidate {
    pub fn new(term: impl Into<Term>, score: f64) -> Self {
        Self {
            term: term.into(),
            score,
        }
    }
}

/// Stable descending sort by score; tied candidates keep their input order.
pub fn sort_candidates(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
}

/// Round half away from zero to `digits` decimal places.
pub fn round_score(score: f64, digits: u32) -> f64 {
    let factor = 10f64.powi(digits as i32);
    (score * factor).round() / factor
}

/// Score of `term` in `candidates`, if present.
pub fn score_of(candidates: &[Candidate], term: &str) -> Option<f64> {
    candidates
        .iter()
        .find(|c| c.term.as_str() == term)
        .map(|c| c.score)
}
