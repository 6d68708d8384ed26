//! Reaction scoring by min-max weighted overlap.
//!
//! For a reaction `r` with query formula set `Q_r` (the union of its component
//! species' formula sets):
//!
//! ```text
//! M[t, r]  = |formulas(t) ∩ Q_r|
//! max_r    = max_t M[t, r]
//! norm_r   = min { |formulas(t)| : M[t, r] == max_r }
//! score    = M[t, r] / norm_r          (0 when norm_r == 0)
//! ```
//!
//! Each row of the membership matrix is a Roaring bitmap, so `M[t, r]` is an
//! intersection cardinality. The selection policy is applied per reaction.

use std::collections::{BTreeMap, BTreeSet};

use annorec_reference::ReferenceData;
use rayon::prelude::*;
use roaring::RoaringBitmap;
use serde::{Deserialize, Serialize};

use crate::candidate::Candidate;
use crate::error::{MatchError, MatchResult};
use crate::model::{FormulaState, Model};
use crate::mssc::{apply_mssc, Mssc};

/// Selected templates for one reaction, plus the raw best overlap count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionMatch {
    pub candidates: Vec<Candidate>,
    pub max_overlap: u64,
}

impl ReactionMatch {
    pub fn top_score(&self) -> f64 {
        self.candidates.first().map(|c| c.score).unwrap_or(0.0)
    }

    /// No template shares any formula with the query.
    pub fn is_zero_evidence(&self) -> bool {
        self.max_overlap == 0
    }
}

/// Component species of a reaction (reactants and products).
pub fn reaction_components<'m>(model: &'m Model, reaction_id: &str) -> MatchResult<&'m BTreeSet<String>> {
    Ok(&model.reaction(reaction_id)?.components)
}

pub struct ReactionMatcher<'a> {
    reference: &'a ReferenceData,
}

impl<'a> ReactionMatcher<'a> {
    pub fn new(reference: &'a ReferenceData) -> Self {
        Self { reference }
    }

    /// Query column for one reaction. Species missing from `state` add nothing.
    pub fn query_bitmap(&self, components: &BTreeSet<String>, state: &FormulaState) -> RoaringBitmap {
        let mut query = RoaringBitmap::new();
        for species in components {
            if let Some(formulas) = state.get(species) {
                query |= self.reference.formula_bitmap(formulas.iter());
            }
        }
        query
    }

    /// Score every template against one query column.
    pub fn score_query(&self, query: &RoaringBitmap, mssc: Mssc) -> ReactionMatch {
        let templates = self.reference.templates();
        let overlaps: Vec<u64> = templates.par_iter().map(|t| t.overlap(query)).collect();

        let max_overlap = overlaps.iter().copied().max().unwrap_or(0);
        let normalizer = templates
            .iter()
            .zip(&overlaps)
            .filter(|&(_, &m)| m == max_overlap)
            .map(|(t, _)| t.size())
            .min()
            .unwrap_or(0);

        let scored: Vec<Candidate> = templates
            .iter()
            .zip(&overlaps)
            .map(|(t, &m)| Candidate {
                term: t.term.clone(),
                score: if normalizer == 0 {
                    0.0
                } else {
                    m as f64 / normalizer as f64
                },
            })
            .collect();

        ReactionMatch {
            candidates: apply_mssc(&scored, mssc),
            max_overlap,
        }
    }

    /// Score `reaction_ids` against the templates using an explicit formula state.
    pub fn score_reactions<I, S>(
        &self,
        model: &Model,
        reaction_ids: I,
        state: &FormulaState,
        mssc: Mssc,
    ) -> MatchResult<BTreeMap<String, ReactionMatch>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out = BTreeMap::new();
        for id in reaction_ids {
            let id = id.as_ref();
            if out.contains_key(id) {
                continue;
            }
            let components = reaction_components(model, id)?;
            if components.is_empty() {
                return Err(MatchError::EmptyReaction(id.to_string()));
            }
            let query = self.query_bitmap(components, state);
            out.insert(id.to_string(), self.score_query(&query, mssc));
        }
        tracing::debug!(reactions = out.len(), "scored reactions");
        Ok(out)
    }

    /// Score using each species' latest `formula`.
    pub fn score_model_reactions<I, S>(
        &self,
        model: &Model,
        reaction_ids: I,
        mssc: Mssc,
    ) -> MatchResult<BTreeMap<String, ReactionMatch>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.score_reactions(model, reaction_ids, &model.formula_state(), mssc)
    }
}

// ============================================================================
// Credibility features
// ============================================================================

/// Inputs of the reaction credibility oracle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionFeatures {
    pub num_candidates: usize,
    pub max_overlap: u64,
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    pub variance: f64,
}

impl ReactionFeatures {
    pub fn from_match(result: &ReactionMatch) -> Self {
        Self::from_candidates(&result.candidates, result.max_overlap)
    }

    pub fn from_candidates(candidates: &[Candidate], max_overlap: u64) -> Self {
        let mut scores: Vec<f64> = candidates.iter().map(|c| c.score).collect();
        if scores.is_empty() {
            return Self {
                num_candidates: 0,
                max_overlap,
                mean: 0.0,
                median: 0.0,
                min: 0.0,
                max: 0.0,
                variance: 0.0,
            };
        }
        scores.sort_by(|a, b| a.total_cmp(b));
        let n = scores.len() as f64;
        let mean = scores.iter().sum::<f64>() / n;
        let mid = scores.len() / 2;
        let median = if scores.len() % 2 == 0 {
            (scores[mid - 1] + scores[mid]) / 2.0
        } else {
            scores[mid]
        };
        let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
        Self {
            num_candidates: scores.len(),
            max_overlap,
            mean,
            median,
            min: scores[0],
            max: scores[scores.len() - 1],
            variance,
        }
    }

    pub fn to_vec(&self) -> Vec<f64> {
        vec![
            self.num_candidates as f64,
            self.max_overlap as f64,
            self.mean,
            self.median,
            self.min,
            self.max,
            self.variance,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelSpec;
    use annorec_reference::Formula;
    use approx::assert_relative_eq;

    fn reference() -> ReferenceData {
        ReferenceData::builder()
            .chemical("CHEBI:A", &["a"], Some("FA"), "")
            .chemical("CHEBI:B", &["b"], Some("FB"), "")
            .chemical("CHEBI:C", &["c"], Some("FC"), "")
            .chemical("CHEBI:D", &["d"], Some("FD"), "")
            .reaction("RHEA:1", &["CHEBI:A", "CHEBI:B"], "")
            .reaction("RHEA:2", &["CHEBI:A", "CHEBI:B", "CHEBI:C"], "")
            .reaction("RHEA:3", &["CHEBI:D"], "")
            .template_row("RHEA:4", &[])
            .build()
    }

    fn state(entries: &[(&str, &[&str])]) -> FormulaState {
        entries
            .iter()
            .map(|(s, fs)| (s.to_string(), fs.iter().map(|f| Formula::new(*f)).collect()))
            .collect()
    }

    fn model() -> Model {
        let spec = ModelSpec::default()
            .species("s1", "", &[])
            .species("s2", "", &[])
            .species("s3", "", &[])
            .reaction("R", &["s1", "s2"], &[])
            .reaction("R_big", &["s1", "s2", "s3"], &[])
            .reaction("R_empty", &[], &[]);
        Model::from_spec(spec, &reference()).unwrap()
    }

    #[test]
    fn exact_template_match_scores_one() {
        let reference = reference();
        let matcher = ReactionMatcher::new(&reference);
        let st = state(&[("s1", &["FA"]), ("s2", &["FB"])]);
        let out = matcher
            .score_reactions(&model(), ["R"], &st, Mssc::above(0.0))
            .unwrap();
        let r = &out["R"];
        assert_eq!(r.max_overlap, 2);
        assert_eq!(r.candidates[0].term.as_str(), "RHEA:1");
        assert_eq!(r.candidates[0].score, 1.0);
        // RHEA:2 also overlaps by 2 but is larger; normaliser is the smaller size
        assert_eq!(r.candidates[1].term.as_str(), "RHEA:2");
        assert_eq!(r.candidates[1].score, 1.0);
        assert_eq!(r.candidates.len(), 4);
    }

    #[test]
    fn min_max_normaliser_rewards_dense_evidence() {
        let reference = reference();
        let matcher = ReactionMatcher::new(&reference);
        let st = state(&[("s1", &["FA", "FB"]), ("s2", &["FC"]), ("s3", &["FD"])]);
        let out = matcher
            .score_reactions(&model(), ["R_big"], &st, Mssc::above(0.0))
            .unwrap();
        let r = &out["R_big"];
        assert_eq!(r.max_overlap, 3);
        assert_eq!(r.candidates[0].term.as_str(), "RHEA:2");
        assert_eq!(r.candidates[0].score, 1.0);
        assert_relative_eq!(r.candidates[1].score, 2.0 / 3.0);
        assert_relative_eq!(r.candidates[2].score, 1.0 / 3.0);
        assert_eq!(r.candidates[3].score, 0.0);
    }

    #[test]
    fn zero_evidence_ties_every_template_at_zero() {
        let reference = reference();
        let matcher = ReactionMatcher::new(&reference);
        let st = state(&[("s1", &["UNKNOWN"])]);
        let out = matcher
            .score_reactions(&model(), ["R"], &st, Mssc::default())
            .unwrap();
        let r = &out["R"];
        assert!(r.is_zero_evidence());
        assert_eq!(r.candidates.len(), reference.templates().len());
        assert!(r.candidates.iter().all(|c| c.score == 0.0));
    }

    #[test]
    fn missing_species_state_contributes_nothing() {
        let reference = reference();
        let matcher = ReactionMatcher::new(&reference);
        let st = state(&[("s1", &["FD"])]);
        let out = matcher
            .score_reactions(&model(), ["R"], &st, Mssc::default())
            .unwrap();
        assert_eq!(out["R"].candidates.len(), 1);
        assert_eq!(out["R"].candidates[0].term.as_str(), "RHEA:3");
        assert_eq!(out["R"].top_score(), 1.0);
    }

    #[test]
    fn contract_violations_are_errors() {
        let reference = reference();
        let matcher = ReactionMatcher::new(&reference);
        let st = FormulaState::new();
        assert_eq!(
            matcher.score_reactions(&model(), ["R_empty"], &st, Mssc::default()),
            Err(MatchError::EmptyReaction("R_empty".to_string()))
        );
        assert_eq!(
            matcher.score_reactions(&model(), ["nope"], &st, Mssc::default()),
            Err(MatchError::UnknownReaction("nope".to_string()))
        );
        assert_eq!(
            reaction_components(&model(), "R").unwrap().len(),
            2
        );
    }

    #[test]
    fn features_summarise_scores() {
        let cands = vec![
            Candidate::new("RHEA:1", 1.0),
            Candidate::new("RHEA:2", 0.5),
            Candidate::new("RHEA:3", 0.0),
        ];
        let f = ReactionFeatures::from_candidates(&cands, 2);
        assert_eq!(f.num_candidates, 3);
        assert_relative_eq!(f.mean, 0.5);
        assert_relative_eq!(f.median, 0.5);
        assert_relative_eq!(f.variance, 1.0 / 6.0, epsilon = 1e-12);
        assert_eq!(f.to_vec().len(), 7);
        assert_eq!(ReactionFeatures::from_candidates(&[], 0).to_vec(), vec![0.0; 7]);
    }
}
