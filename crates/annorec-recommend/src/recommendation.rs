use annorec_match::{apply_mssc, round_score, Candidate, Mssc};
use annorec_reference::{ReferenceData, Term};
use serde::{Deserialize, Serialize};

/// Ranked terms for one model element (or literal name), with parallel
/// deep links and labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: String,
    pub candidates: Vec<Candidate>,
    pub urls: Vec<String>,
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credibility: Option<f64>,
}

impl Recommendation {
    /// Round scores to `round_digits` and attach links and labels. A term
    /// without a label is labelled with its own id.
    pub fn from_candidates(
        id: impl Into<String>,
        candidates: &[Candidate],
        reference: &ReferenceData,
        round_digits: u32,
    ) -> Self {
        let candidates: Vec<Candidate> = candidates
            .iter()
            .map(|c| Candidate {
                term: c.term.clone(),
                score: round_score(c.score, round_digits),
            })
            .collect();
        let urls = candidates
            .iter()
            .map(|c| c.term.url().unwrap_or_default())
            .collect();
        let labels = candidates
            .iter()
            .map(|c| {
                reference
                    .label_of(c.term.as_str())
                    .unwrap_or(c.term.as_str())
                    .to_string()
            })
            .collect();
        Self {
            id: id.into(),
            candidates,
            urls,
            labels,
            credibility: None,
        }
    }

    pub fn with_credibility(mut self, credibility: Option<f64>) -> Self {
        self.credibility = credibility;
        self
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn terms(&self) -> Vec<&Term> {
        self.candidates.iter().map(|c| &c.term).collect()
    }

    pub fn top_score(&self) -> Option<f64> {
        self.candidates.first().map(|c| c.score)
    }

    /// Keep candidates scoring at least `min_score`.
    pub fn filter_by_threshold(&self, min_score: f64) -> Recommendation {
        self.keep(|i| self.candidates[i].score >= min_score)
    }

    /// Auto-select under `mssc`.
    pub fn select(&self, mssc: Mssc) -> Recommendation {
        let chosen = apply_mssc(&self.candidates, mssc);
        self.keep(|i| chosen.iter().any(|c| c.term == self.candidates[i].term))
    }

    fn keep(&self, pred: impl Fn(usize) -> bool) -> Recommendation {
        let mut out = Recommendation {
            id: self.id.clone(),
            candidates: Vec::new(),
            urls: Vec::new(),
            labels: Vec::new(),
            credibility: self.credibility,
        };
        for i in 0..self.candidates.len() {
            if pred(i) {
                out.candidates.push(self.candidates[i].clone());
                out.urls.push(self.urls.get(i).cloned().unwrap_or_default());
                out.labels.push(self.labels.get(i).cloned().unwrap_or_default());
            }
        }
        out
    }
}
