//! Mutual species/reaction refinement.
//!
//! Each cycle visits the target reactions. For a reaction, the top template
//! candidate is compared with the formula sets of the reaction's species:
//!
//! 1. exactly one unmatched species and exactly one unmatched template term:
//!    propose `species <- term`;
//! 2. otherwise, if every template term matches exactly one species: propose
//!    the reverse mapping (a re-assertion of the current matching);
//! 3. otherwise: no proposal.
//!
//! A proposal is kept only if substituting it strictly raises the aggregate
//! score (mean top score over the targets). Kept proposals of one cycle are
//! unioned per species and applied together, again only if the combined state
//! strictly raises the aggregate. The loop stops when a cycle changes nothing
//! or after [`MAX_CYCLES`].

use std::collections::{BTreeMap, BTreeSet};

use annorec_reference::{Formula, ReferenceData, Term};
use serde::{Deserialize, Serialize};

use crate::candidate::Candidate;
use crate::error::{MatchError, MatchResult};
use crate::model::{FormulaState, Model};
use crate::mssc::Mssc;
use crate::reaction::ReactionMatcher;

pub const MAX_CYCLES: usize = 3;

/// Species id -> proposed chemical terms.
pub type SpeciesUpdates = BTreeMap<String, BTreeSet<Term>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoopState {
    Iterating,
    Converged,
    Capped,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreDelta {
    pub new_score: f64,
    pub old_score: f64,
}

impl ScoreDelta {
    pub fn is_increase(&self) -> bool {
        self.new_score > self.old_score
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementOutcome {
    pub updates: SpeciesUpdates,
    pub state: LoopState,
    /// Cycles run, including the final one that changed nothing.
    pub cycles: usize,
    /// Aggregate score before the first cycle and after each applied cycle.
    pub scores: Vec<f64>,
}

/// Decide a species <- term assignment from one reaction's evidence.
///
/// `template` maps each formula of the reaction template to one of its terms;
/// `species` holds the current formula sets of the reaction's species.
pub fn match_by_exactly_one_remaining(
    template: &BTreeMap<Formula, Term>,
    species: &BTreeMap<String, BTreeSet<Formula>>,
) -> Option<SpeciesUpdates> {
    if template.is_empty() {
        return None;
    }
    let matches: Vec<(&Term, Vec<&String>)> = template
        .iter()
        .map(|(formula, term)| {
            let hits = species
                .iter()
                .filter(|(_, formulas)| formulas.contains(formula))
                .map(|(id, _)| id)
                .collect();
            (term, hits)
        })
        .collect();

    let matched: BTreeSet<&String> = matches.iter().flat_map(|(_, hits)| hits.iter().copied()).collect();
    let unmatched_species: Vec<&String> = species.keys().filter(|id| !matched.contains(id)).collect();
    let unmatched_terms: Vec<&Term> = matches
        .iter()
        .filter(|(_, hits)| hits.is_empty())
        .map(|(term, _)| *term)
        .collect();

    if let ([only_species], [only_term]) = (unmatched_species.as_slice(), unmatched_terms.as_slice()) {
        let mut out = SpeciesUpdates::new();
        out.entry((*only_species).clone())
            .or_default()
            .insert((*only_term).clone());
        return Some(out);
    }

    if matches.iter().all(|(_, hits)| hits.len() == 1) {
        let mut out = SpeciesUpdates::new();
        for (term, hits) in &matches {
            out.entry(hits[0].clone()).or_default().insert((*term).clone());
        }
        return Some(out);
    }

    None
}

pub struct RefinementLoop<'a> {
    reference: &'a ReferenceData,
    model: &'a Model,
    matcher: ReactionMatcher<'a>,
    formula_state: FormulaState,
    reaction_candidates: BTreeMap<String, Vec<Candidate>>,
    targets: Vec<String>,
    state: LoopState,
}

impl<'a> RefinementLoop<'a> {
    /// `targets` defaults to every reaction in `reaction_candidates` when empty.
    /// Targets without any candidate are skipped.
    pub fn new(
        reference: &'a ReferenceData,
        model: &'a Model,
        formula_state: FormulaState,
        reaction_candidates: BTreeMap<String, Vec<Candidate>>,
        targets: Vec<String>,
    ) -> MatchResult<Self> {
        let requested = if targets.is_empty() {
            reaction_candidates.keys().cloned().collect()
        } else {
            targets
        };
        let mut kept = Vec::with_capacity(requested.len());
        for id in requested {
            let reaction = model.reaction(&id)?;
            if reaction.components.is_empty() {
                return Err(MatchError::EmptyReaction(id));
            }
            let has_candidate = reaction_candidates
                .get(&id)
                .map(|c| !c.is_empty())
                .unwrap_or(false);
            if has_candidate && !kept.contains(&id) {
                kept.push(id);
            } else if !has_candidate {
                tracing::debug!(reaction = %id, "skipping refinement target without candidates");
            }
        }
        Ok(Self {
            reference,
            model,
            matcher: ReactionMatcher::new(reference),
            formula_state,
            reaction_candidates,
            targets: kept,
            state: LoopState::Iterating,
        })
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    pub fn formula_state(&self) -> &FormulaState {
        &self.formula_state
    }

    /// Mean top-candidate score over the targets under `state`.
    pub fn aggregate_score(&self, state: &FormulaState) -> MatchResult<f64> {
        if self.targets.is_empty() {
            return Ok(0.0);
        }
        let scored = self
            .matcher
            .score_reactions(self.model, &self.targets, state, Mssc::default())?;
        let total: f64 = scored.values().map(|m| m.top_score()).sum();
        Ok(total / scored.len() as f64)
    }

    /// Proposal from one reaction's top template, if the evidence forces one.
    pub fn proposal_for(&self, reaction_id: &str) -> MatchResult<Option<SpeciesUpdates>> {
        let Some(top) = self
            .reaction_candidates
            .get(reaction_id)
            .and_then(|c| c.first())
        else {
            return Ok(None);
        };
        let template = self.reference.template_formula_map(top.term.as_str());
        let species: BTreeMap<String, BTreeSet<Formula>> = self
            .model
            .reaction(reaction_id)?
            .components
            .iter()
            .map(|id| {
                let formulas = self.formula_state.get(id).cloned().unwrap_or_default();
                (id.clone(), formulas)
            })
            .collect();
        Ok(match_by_exactly_one_remaining(&template, &species))
    }

    /// Score `proposal` substituted into the current state against the state as is.
    pub fn evaluate(&self, proposal: &SpeciesUpdates) -> MatchResult<ScoreDelta> {
        let old_score = self.aggregate_score(&self.formula_state)?;
        self.evaluate_against(proposal, old_score)
    }

    fn evaluate_against(&self, proposal: &SpeciesUpdates, old_score: f64) -> MatchResult<ScoreDelta> {
        let substituted = self.substitute(proposal);
        let new_score = self.aggregate_score(&substituted)?;
        Ok(ScoreDelta {
            new_score,
            old_score,
        })
    }

    fn substitute(&self, updates: &SpeciesUpdates) -> FormulaState {
        let mut state = self.formula_state.clone();
        for (species, terms) in updates {
            state.insert(species.clone(), self.reference.formulas_of(terms.iter()));
        }
        state
    }

    /// One pass over the targets; returns the accepted proposals, unioned per species.
    pub fn run_cycle(&self) -> MatchResult<SpeciesUpdates> {
        let old_score = self.aggregate_score(&self.formula_state)?;
        let mut combined = SpeciesUpdates::new();
        for reaction_id in &self.targets {
            let Some(proposal) = self.proposal_for(reaction_id)? else {
                continue;
            };
            let delta = self.evaluate_against(&proposal, old_score)?;
            tracing::debug!(
                reaction = %reaction_id,
                species = proposal.len(),
                new_score = delta.new_score,
                old_score = delta.old_score,
                accepted = delta.is_increase(),
                "refinement proposal"
            );
            if delta.is_increase() {
                for (species, terms) in proposal {
                    combined.entry(species).or_default().extend(terms);
                }
            }
        }
        Ok(combined)
    }

    /// Run cycles until a cycle accepts no proposal or the cap is reached.
    pub fn match_updates(&mut self) -> MatchResult<RefinementOutcome> {
        let mut updates = SpeciesUpdates::new();
        let mut scores = vec![self.aggregate_score(&self.formula_state)?];
        let mut cycles = 0;
        self.state = LoopState::Iterating;

        while self.state == LoopState::Iterating {
            if cycles >= MAX_CYCLES {
                self.state = LoopState::Capped;
                break;
            }
            let cycle = self.run_cycle()?;
            cycles += 1;
            if cycle.is_empty() {
                self.state = LoopState::Converged;
                break;
            }
            // every accepted proposal is applied, even when the union scores lower
            self.formula_state = self.substitute(&cycle);
            scores.push(self.aggregate_score(&self.formula_state)?);
            // latest accepted terms replace earlier ones
            updates.extend(cycle);
        }

        tracing::info!(
            state = ?self.state,
            cycles,
            updated_species = updates.len(),
            "refinement finished"
        );
        Ok(RefinementOutcome {
            updates,
            state: self.state,
            cycles,
            scores,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(entries: &[(&str, &str)]) -> BTreeMap<Formula, Term> {
        entries
            .iter()
            .map(|(f, t)| (Formula::new(*f), Term::new(*t)))
            .collect()
    }

    fn species(entries: &[(&str, &[&str])]) -> BTreeMap<String, BTreeSet<Formula>> {
        entries
            .iter()
            .map(|(s, fs)| (s.to_string(), fs.iter().map(|f| Formula::new(*f)).collect()))
            .collect()
    }

    fn terms(updates: &SpeciesUpdates, species: &str) -> Vec<String> {
        updates[species].iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn single_unexplained_slot_is_forced() {
        let t = template(&[("FA", "CHEBI:A"), ("FB", "CHEBI:B"), ("FC", "CHEBI:C")]);
        let s = species(&[("s1", &["FA"]), ("s2", &["FB"]), ("s3", &["WRONG", "ALSO"])]);
        let out = match_by_exactly_one_remaining(&t, &s).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(terms(&out, "s3"), ["CHEBI:C"]);
    }

    #[test]
    fn two_unexplained_slots_are_ambiguous() {
        let t = template(&[("FA", "CHEBI:A"), ("FB", "CHEBI:B"), ("FC", "CHEBI:C")]);
        let s = species(&[("s1", &["FA"]), ("s2", &["X"]), ("s3", &["Y"])]);
        assert_eq!(match_by_exactly_one_remaining(&t, &s), None);
    }

    #[test]
    fn perfect_bijection_is_reasserted() {
        let t = template(&[("FA", "CHEBI:A"), ("FB", "CHEBI:B")]);
        let s = species(&[("s1", &["FA", "FZ"]), ("s2", &["FB"])]);
        let out = match_by_exactly_one_remaining(&t, &s).unwrap();
        assert_eq!(terms(&out, "s1"), ["CHEBI:A"]);
        assert_eq!(terms(&out, "s2"), ["CHEBI:B"]);
    }

    #[test]
    fn shared_formula_blocks_reassertion() {
        let t = template(&[("FA", "CHEBI:A"), ("FB", "CHEBI:B")]);
        let s = species(&[("s1", &["FA"]), ("s2", &["FA", "FB"])]);
        assert_eq!(match_by_exactly_one_remaining(&t, &s), None);
    }

    #[test]
    fn empty_template_proposes_nothing() {
        let s = species(&[("s1", &["FA"])]);
        assert_eq!(match_by_exactly_one_remaining(&BTreeMap::new(), &s), None);
    }

    #[test]
    fn score_delta_is_strict() {
        let same = ScoreDelta {
            new_score: 0.5,
            old_score: 0.5,
        };
        assert!(!same.is_increase());
        let up = ScoreDelta {
            new_score: 0.6,
            old_score: 0.5,
        };
        assert!(up.is_increase());
    }
}
