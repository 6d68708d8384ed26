//! Name -> chemical term similarity search.
//!
//! Two interchangeable scorers:
//! - **cosine**: dot product of L2-normalised `[a-z0-9]` count profiles; a term
//!   scores the maximum over its distinct synonym profiles.
//! - **edit distance**: `1 - levenshtein(query, synonym) / len(synonym)`, the
//!   maximum over the term's synonyms, clamped at 0. Normalising by the synonym
//!   length (not the query's) is deliberate and asymmetric.
//!
//! Queries are deduplicated before scoring; the result has one entry per
//! distinct query. Terms are scored in parallel and collected in term order,
//! so output is identical across runs.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use annorec_reference::{char_profile, ReferenceData};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::candidate::Candidate;
use crate::mssc::{apply_mssc, Mssc};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpeciesMethod {
    #[default]
    #[serde(rename = "cdist")]
    Cosine,
    #[serde(rename = "edist")]
    EditDistance,
}

impl fmt::Display for SpeciesMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpeciesMethod::Cosine => f.write_str("cdist"),
            SpeciesMethod::EditDistance => f.write_str("edist"),
        }
    }
}

impl FromStr for SpeciesMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "cdist" | "cosine" => Ok(SpeciesMethod::Cosine),
            "edist" | "edit" => Ok(SpeciesMethod::EditDistance),
            other => Err(format!("unknown species method `{other}` (expected `cdist` or `edist`)")),
        }
    }
}

/// Similarity of `query` to a single synonym, normalised by the synonym length.
pub fn edit_score(query: &str, synonym: &str) -> f64 {
    let len = synonym.chars().count();
    if len == 0 {
        return 0.0;
    }
    let distance = strsim::levenshtein(query, synonym);
    (1.0 - distance as f64 / len as f64).max(0.0)
}

pub struct SpeciesMatcher<'a> {
    reference: &'a ReferenceData,
}

impl<'a> SpeciesMatcher<'a> {
    pub fn new(reference: &'a ReferenceData) -> Self {
        Self { reference }
    }

    pub fn score<I, S>(
        &self,
        method: SpeciesMethod,
        queries: I,
        mssc: Mssc,
    ) -> BTreeMap<String, Vec<Candidate>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        match method {
            SpeciesMethod::Cosine => self.score_by_cosine(queries, mssc),
            SpeciesMethod::EditDistance => self.score_by_edit_distance(queries, mssc),
        }
    }

    pub fn score_by_cosine<I, S>(&self, queries: I, mssc: Mssc) -> BTreeMap<String, Vec<Candidate>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let queries = distinct(queries);
        tracing::debug!(
            queries = queries.len(),
            terms = self.reference.synonym_rows().len(),
            "cosine species scoring"
        );
        let rows = self.reference.synonym_rows();
        let profiles = self.reference.profile_rows();
        queries
            .into_iter()
            .map(|query| {
                let q = char_profile(&query);
                let scored: Vec<Candidate> = rows
                    .par_iter()
                    .zip(profiles.par_iter())
                    .map(|((term, _), term_profiles)| {
                        let best = term_profiles
                            .iter()
                            .map(|p| p.dot(&q))
                            .fold(0.0f64, f64::max);
                        Candidate {
                            term: term.clone(),
                            score: best,
                        }
                    })
                    .collect();
                let selected = apply_mssc(&scored, mssc);
                (query, selected)
            })
            .collect()
    }

    pub fn score_by_edit_distance<I, S>(
        &self,
        queries: I,
        mssc: Mssc,
    ) -> BTreeMap<String, Vec<Candidate>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let queries = distinct(queries);
        tracing::debug!(
            queries = queries.len(),
            terms = self.reference.synonym_rows().len(),
            "edit-distance species scoring"
        );
        let rows = self.reference.synonym_rows();
        queries
            .into_iter()
            .map(|query| {
                let lowered = query.to_lowercase();
                let scored: Vec<Candidate> = rows
                    .par_iter()
                    .map(|(term, synonyms)| {
                        let best = synonyms
                            .iter()
                            .map(|s| edit_score(&lowered, s))
                            .fold(0.0f64, f64::max);
                        Candidate {
                            term: term.clone(),
                            score: best,
                        }
                    })
                    .collect();
                let selected = apply_mssc(&scored, mssc);
                (query, selected)
            })
            .collect()
    }
}

fn distinct<I, S>(queries: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    queries.into_iter().map(|q| q.as_ref().to_string()).collect()
}

// ============================================================================
// Credibility features
// ============================================================================

/// Inputs of the species credibility oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesFeatures {
    pub name_len: usize,
    pub num_candidates: usize,
    pub mean_score: f64,
    /// Only reported by the cosine scorer.
    pub num_formulas: Option<usize>,
}

impl SpeciesFeatures {
    pub fn from_candidates(
        name: &str,
        candidates: &[Candidate],
        method: SpeciesMethod,
        reference: &ReferenceData,
    ) -> Self {
        let mean_score = if candidates.is_empty() {
            0.0
        } else {
            candidates.iter().map(|c| c.score).sum::<f64>() / candidates.len() as f64
        };
        let num_formulas = match method {
            SpeciesMethod::Cosine => {
                Some(reference.formulas_of(candidates.iter().map(|c| &c.term)).len())
            }
            SpeciesMethod::EditDistance => None,
        };
        Self {
            name_len: name.chars().count(),
            num_candidates: candidates.len(),
            mean_score,
            num_formulas,
        }
    }

    /// Fixed-length vector: 4 values for cosine, 3 for edit distance.
    pub fn to_vec(&self) -> Vec<f64> {
        let mut out = vec![
            self.name_len as f64,
            self.num_candidates as f64,
            self.mean_score,
        ];
        if let Some(n) = self.num_formulas {
            out.push(n as f64);
        }
        out
    }
}
