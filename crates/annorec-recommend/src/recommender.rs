//! Model-level recommendation driver.
//!
//! Runs species scoring, then reaction scoring, then (optionally) refinement
//! over a [`Model`], and turns ranked candidates into [`Recommendation`]s.
//! Model state changes only when an operation is called with `update = true`
//! (and for every element touched by [`Recommender::recommend_annotation`]).

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use anyhow::Result;
use annorec_match::{
    project_formulas, round_score, score_of, Candidate, FormulaState, LoopState, MatchError, Model,
    Mssc, ReactionFeatures, ReactionMatcher, RefinementLoop, RefinementOutcome, SpeciesFeatures,
    SpeciesMatcher, SpeciesMethod, SpeciesUpdates,
};
use annorec_reference::{Formula, ReferenceData, Term};

use crate::config::RecommenderConfig;
use crate::credibility::{clamp_probability, CredibilityModel};
use crate::pattern::{IdPattern, PatternKind};
use crate::recommendation::Recommendation;
use crate::stats::Statistics;

// ============================================================================
// Options
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpeciesOptions {
    pub method: SpeciesMethod,
    pub mssc: Mssc,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReactionOptions {
    pub mssc: Mssc,
    /// Method for predicting component species that need a prediction.
    pub species_method: SpeciesMethod,
    /// Take component formulas from existing species annotations where present.
    pub use_existing_species_annotation: bool,
    /// Precomputed species recommendations; components missing from it are predicted.
    pub species_recommendations: Option<Vec<Recommendation>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AnnotationOptions {
    pub mssc: Mssc,
    /// Run the refinement loop after the first pass.
    pub optimize: bool,
    /// Skip species whose name is shorter than this.
    pub min_name_len: usize,
    /// Skip reactions with fewer component species than this.
    pub min_components: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationResult {
    pub species: Vec<Recommendation>,
    pub reactions: Vec<Recommendation>,
    pub refinement: Option<RefinementOutcome>,
}

/// Species candidates at full precision, before rounding for presentation.
struct ScoredSpecies {
    id: String,
    name: String,
    candidates: Vec<Candidate>,
}

// ============================================================================
// Recommender
// ============================================================================

pub struct Recommender {
    reference: Arc<ReferenceData>,
    model: Model,
    config: RecommenderConfig,
    species_credibility: Option<Box<dyn CredibilityModel>>,
    reaction_credibility: Option<Box<dyn CredibilityModel>>,
}

impl Recommender {
    pub fn new(reference: Arc<ReferenceData>, model: Model, config: RecommenderConfig) -> Self {
        let species_credibility = config
            .species_credibility
            .clone()
            .map(|m| Box::new(m) as Box<dyn CredibilityModel>);
        let reaction_credibility = config
            .reaction_credibility
            .clone()
            .map(|m| Box::new(m) as Box<dyn CredibilityModel>);
        Self {
            reference,
            model,
            config,
            species_credibility,
            reaction_credibility,
        }
    }

    pub fn with_species_credibility(mut self, model: impl CredibilityModel + 'static) -> Self {
        self.species_credibility = Some(Box::new(model));
        self
    }

    pub fn with_reaction_credibility(mut self, model: impl CredibilityModel + 'static) -> Self {
        self.reaction_credibility = Some(Box::new(model));
        self
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn into_model(self) -> Model {
        self.model
    }

    pub fn reference(&self) -> &ReferenceData {
        &self.reference
    }

    pub fn config(&self) -> &RecommenderConfig {
        &self.config
    }

    /// Species options from the configuration.
    pub fn species_options(&self) -> SpeciesOptions {
        SpeciesOptions {
            method: self.config.species_method,
            mssc: self.config.mssc,
        }
    }

    /// Reaction options from the configuration.
    pub fn reaction_options(&self) -> ReactionOptions {
        ReactionOptions {
            mssc: self.config.mssc,
            species_method: self.config.species_method,
            use_existing_species_annotation: self.config.use_existing_species_annotation,
            species_recommendations: None,
        }
    }

    // ------------------------------------------------------------------------
    // Species
    // ------------------------------------------------------------------------

    /// Recommendations for literal names. The id of each recommendation is the
    /// name itself; model state is never touched.
    pub fn recommend_species_names<I, S>(&self, names: I, opts: SpeciesOptions) -> Vec<Recommendation>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names = dedup_in_order(names);
        let scored = SpeciesMatcher::new(&self.reference).score(opts.method, &names, opts.mssc);
        names
            .iter()
            .map(|name| {
                let cands = scored.get(name).map(Vec::as_slice).unwrap_or(&[]);
                self.species_recommendation(name, name, cands, opts.method)
            })
            .collect()
    }

    pub fn recommend_species_name(&self, name: &str, opts: SpeciesOptions) -> Recommendation {
        let mut recs = self.recommend_species_names([name], opts);
        recs.pop().unwrap_or_else(|| {
            Recommendation::from_candidates(name, &[], &self.reference, self.config.round_digits)
        })
    }

    /// Recommendations for model species, scored by their name (or id when
    /// the name is empty). With `update`, the species' candidates are replaced.
    pub fn recommend_species_ids<I, S>(
        &mut self,
        ids: I,
        opts: SpeciesOptions,
        update: bool,
    ) -> Result<Vec<Recommendation>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let scored = self.predict_species(&dedup_in_order(ids), opts)?;
        let recs = scored
            .iter()
            .map(|s| self.species_recommendation(&s.id, &s.name, &s.candidates, opts.method))
            .collect();
        if update {
            // the model keeps full-precision scores; only the recommendations are rounded
            for s in scored {
                self.model
                    .species_mut(&s.id)?
                    .update_with_candidates(s.candidates, &self.reference);
            }
        }
        Ok(recs)
    }

    pub fn recommend_species_id(
        &mut self,
        id: &str,
        opts: SpeciesOptions,
        update: bool,
    ) -> Result<Recommendation> {
        let mut recs = self.recommend_species_ids([id], opts, update)?;
        recs.pop()
            .ok_or_else(|| MatchError::UnknownSpecies(id.to_string()).into())
    }

    /// Replace a species' candidates with those of `rec` (keyed by `rec.id`).
    /// Scores are stored as `rec` carries them.
    pub fn update_species_with_recommendation(&mut self, rec: &Recommendation) -> Result<()> {
        let species = self.model.species_mut(&rec.id)?;
        species.update_with_candidates(rec.candidates.clone(), &self.reference);
        Ok(())
    }

    fn predict_species(&self, ids: &[String], opts: SpeciesOptions) -> Result<Vec<ScoredSpecies>> {
        let mut names = Vec::with_capacity(ids.len());
        for id in ids {
            names.push(self.model.species(id)?.name_to_use().to_string());
        }
        let scored = SpeciesMatcher::new(&self.reference).score(opts.method, &names, opts.mssc);
        Ok(ids
            .iter()
            .zip(names)
            .map(|(id, name)| {
                // duplicate names share one scored entry
                let candidates = scored.get(&name).cloned().unwrap_or_default();
                ScoredSpecies {
                    id: id.clone(),
                    name,
                    candidates,
                }
            })
            .collect())
    }

    fn species_recommendation(
        &self,
        id: &str,
        name: &str,
        candidates: &[Candidate],
        method: SpeciesMethod,
    ) -> Recommendation {
        let credibility = self.species_credibility.as_ref().map(|oracle| {
            let features = SpeciesFeatures::from_candidates(name, candidates, method, &self.reference);
            clamp_probability(oracle.predict(&features.to_vec()))
        });
        Recommendation::from_candidates(id, candidates, &self.reference, self.config.round_digits)
            .with_credibility(credibility)
    }

    // ------------------------------------------------------------------------
    // Reactions
    // ------------------------------------------------------------------------

    /// Recommendations for model reactions. Component species are predicted
    /// with MSSC top / 0.0 without touching model state, unless existing
    /// annotations or precomputed recommendations are supplied in `opts`.
    /// With `update`, the reactions' candidates are replaced.
    pub fn recommend_reactions<I, S>(
        &mut self,
        ids: I,
        opts: &ReactionOptions,
        update: bool,
    ) -> Result<Vec<Recommendation>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ids = dedup_in_order(ids);
        let state = self.component_formula_state(&ids, opts)?;
        let matcher = ReactionMatcher::new(&self.reference);
        let scored = matcher.score_reactions(&self.model, &ids, &state, opts.mssc)?;

        let mut recs = Vec::with_capacity(ids.len());
        for id in &ids {
            let Some(result) = scored.get(id) else {
                continue;
            };
            let credibility = self.reaction_credibility.as_ref().map(|oracle| {
                let features = ReactionFeatures::from_match(result);
                clamp_probability(oracle.predict(&features.to_vec()))
            });
            recs.push(
                Recommendation::from_candidates(
                    id.as_str(),
                    &result.candidates,
                    &self.reference,
                    self.config.round_digits,
                )
                .with_credibility(credibility),
            );
        }

        if update {
            for (id, result) in scored {
                self.model
                    .reaction_mut(&id)?
                    .update_with_candidates(result.candidates);
            }
        }
        Ok(recs)
    }

    pub fn recommend_reaction(
        &mut self,
        id: &str,
        opts: &ReactionOptions,
        update: bool,
    ) -> Result<Recommendation> {
        let mut recs = self.recommend_reactions([id], opts, update)?;
        recs.pop()
            .ok_or_else(|| MatchError::UnknownReaction(id.to_string()).into())
    }

    fn component_formula_state(&self, reaction_ids: &[String], opts: &ReactionOptions) -> Result<FormulaState> {
        let mut components = BTreeSet::new();
        for id in reaction_ids {
            components.extend(self.model.reaction(id)?.components.iter().cloned());
        }

        let mut state = FormulaState::new();
        if opts.use_existing_species_annotation {
            for id in &components {
                let species = self.model.species(id)?;
                if !species.existing_annotation.is_empty() {
                    state.insert(id.clone(), species.existing_formula(&self.reference));
                }
            }
        }

        if let Some(recs) = &opts.species_recommendations {
            for rec in recs.iter().filter(|r| components.contains(&r.id)) {
                state
                    .entry(rec.id.clone())
                    .or_insert_with(|| project_formulas(&rec.candidates, &self.reference));
            }
        }

        // anything still uncovered is predicted with the default selection
        let remaining: Vec<String> = components
            .into_iter()
            .filter(|id| !state.contains_key(id))
            .collect();
        if !remaining.is_empty() {
            let species_opts = SpeciesOptions {
                method: opts.species_method,
                mssc: Mssc::default(),
            };
            for s in self.predict_species(&remaining, species_opts)? {
                let formulas = project_formulas(&s.candidates, &self.reference);
                state.insert(s.id, formulas);
            }
        }
        tracing::debug!(
            reactions = reaction_ids.len(),
            species = state.len(),
            "prepared component formulas"
        );
        Ok(state)
    }

    // ------------------------------------------------------------------------
    // Whole model
    // ------------------------------------------------------------------------

    /// Species and reaction recommendations for the whole model, optionally
    /// refined. Every recommended element's candidates are stored on the model.
    pub fn recommend_annotation(&mut self, opts: &AnnotationOptions) -> Result<AnnotationResult> {
        let species_ids: Vec<String> = self
            .model
            .all_species()
            .filter(|s| s.name_to_use().chars().count() >= opts.min_name_len)
            .map(|s| s.id.clone())
            .collect();
        let reaction_ids: Vec<String> = self
            .model
            .all_reactions()
            .filter(|r| !r.components.is_empty() && r.components.len() >= opts.min_components)
            .map(|r| r.id.clone())
            .collect();
        tracing::debug!(
            species = species_ids.len(),
            reactions = reaction_ids.len(),
            optimize = opts.optimize,
            "recommending model annotation"
        );

        let species_opts = SpeciesOptions {
            method: self.config.species_method,
            mssc: opts.mssc,
        };
        let mut species = self.recommend_species_ids(&species_ids, species_opts, true)?;

        let reaction_opts = ReactionOptions {
            mssc: opts.mssc,
            ..self.reaction_options()
        };
        let mut reactions = self.recommend_reactions(&reaction_ids, &reaction_opts, true)?;

        if !opts.optimize {
            return Ok(AnnotationResult {
                species,
                reactions,
                refinement: None,
            });
        }

        let outcome = self.optimize(&mut species, &mut reactions, &reaction_opts)?;
        Ok(AnnotationResult {
            species,
            reactions,
            refinement: Some(outcome),
        })
    }

    /// Refine `species`/`reactions` in place. Only reactions with some
    /// structural evidence take part; a refined species gets the mean top score
    /// of the participating reactions that use it, and those are re-scored.
    fn optimize(
        &mut self,
        species: &mut Vec<Recommendation>,
        reactions: &mut [Recommendation],
        reaction_opts: &ReactionOptions,
    ) -> Result<RefinementOutcome> {
        let targets: Vec<String> = reactions
            .iter()
            .filter(|r| r.top_score().map(|s| s > 0.0).unwrap_or(false))
            .map(|r| r.id.clone())
            .collect();
        if targets.is_empty() {
            tracing::debug!("no reaction with structural evidence; skipping refinement");
            return Ok(RefinementOutcome {
                updates: SpeciesUpdates::new(),
                state: LoopState::Converged,
                cycles: 0,
                scores: Vec::new(),
            });
        }

        // same component formulas the reactions were scored with, including
        // species left out of `species` (e.g. by the name length filter)
        let seed = ReactionOptions {
            species_recommendations: Some(species.clone()),
            ..reaction_opts.clone()
        };
        let formula_state = self.component_formula_state(&targets, &seed)?;
        let mut reaction_candidates: BTreeMap<String, Vec<Candidate>> = BTreeMap::new();
        for id in &targets {
            let stored = self.model.reaction(id)?.candidates().to_vec();
            reaction_candidates.insert(id.clone(), stored);
        }
        let outcome = RefinementLoop::new(
            &self.reference,
            &self.model,
            formula_state,
            reaction_candidates,
            targets.clone(),
        )?
        .match_updates()?;

        for (species_id, terms) in &outcome.updates {
            let mut using = Vec::new();
            for id in &targets {
                let reaction = self.model.reaction(id)?;
                if reaction.components.contains(species_id) {
                    using.extend(reaction.candidates().first().map(|c| c.score));
                }
            }
            let adjusted = if using.is_empty() {
                0.0
            } else {
                using.iter().sum::<f64>() / using.len() as f64
            };
            let candidates: Vec<Candidate> = terms
                .iter()
                .map(|t| Candidate {
                    term: t.clone(),
                    score: adjusted,
                })
                .collect();
            let name = self.model.species(species_id)?.name_to_use().to_string();
            let rec = self.species_recommendation(species_id, &name, &candidates, self.config.species_method);
            self.model
                .species_mut(species_id)?
                .update_with_candidates(candidates, &self.reference);
            match species.iter().position(|r| &r.id == species_id) {
                Some(i) => species[i] = rec,
                None => species.push(rec),
            }
        }

        if !outcome.updates.is_empty() {
            let rescore = ReactionOptions {
                species_recommendations: Some(species.clone()),
                use_existing_species_annotation: false,
                ..reaction_opts.clone()
            };
            let rescored = self.recommend_reactions(&targets, &rescore, true)?;
            for rec in rescored {
                if let Some(slot) = reactions.iter_mut().find(|r| r.id == rec.id) {
                    *slot = rec;
                }
            }
        }
        Ok(outcome)
    }

    // ------------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------------

    /// Species ids matching `pattern`; all ids when `pattern` is `None`.
    pub fn species_ids(&self, pattern: Option<&str>, kind: PatternKind) -> Result<Vec<String>> {
        let ids = self.model.species_ids().map(str::to_string);
        let Some(pattern) = pattern else {
            return Ok(ids.collect());
        };
        let pattern = IdPattern::compile(pattern, kind)?;
        Ok(ids.filter(|id| pattern.matches(id)).collect())
    }

    /// Reaction ids matching `pattern`; with `by_species`, reactions having a
    /// component species that matches instead.
    pub fn reaction_ids(
        &self,
        pattern: Option<&str>,
        kind: PatternKind,
        by_species: bool,
    ) -> Result<Vec<String>> {
        let Some(raw) = pattern else {
            return Ok(self.model.reaction_ids().map(str::to_string).collect());
        };
        if by_species {
            let species: BTreeSet<String> = self.species_ids(Some(raw), kind)?.into_iter().collect();
            return Ok(self
                .model
                .all_reactions()
                .filter(|r| r.components.iter().any(|c| species.contains(c)))
                .map(|r| r.id.clone())
                .collect());
        }
        let pattern = IdPattern::compile(raw, kind)?;
        Ok(self
            .model
            .reaction_ids()
            .filter(|id| pattern.matches(id))
            .map(str::to_string)
            .collect())
    }

    /// Cosine score of a species' name against `term` (MSSC above / 0.0);
    /// 0.0 when the term is not a candidate.
    pub fn match_score_of_chemical(&self, species_id: &str, term: &str) -> Result<f64> {
        let name = self.model.species(species_id)?.name_to_use().to_string();
        let scored = SpeciesMatcher::new(&self.reference).score_by_cosine([name.as_str()], Mssc::above(0.0));
        let score = scored
            .get(&name)
            .and_then(|cands| score_of(cands, term))
            .unwrap_or(0.0);
        Ok(round_score(score, self.config.round_digits))
    }

    /// Score of a reaction against `term` (MSSC above / 0.0), with component
    /// species predicted by cosine; 0.0 when the term is not a candidate.
    pub fn match_score_of_reaction(&self, reaction_id: &str, term: &str) -> Result<f64> {
        let opts = ReactionOptions {
            mssc: Mssc::above(0.0),
            species_method: SpeciesMethod::Cosine,
            use_existing_species_annotation: false,
            species_recommendations: None,
        };
        let ids = [reaction_id.to_string()];
        let state = self.component_formula_state(&ids, &opts)?;
        let scored = ReactionMatcher::new(&self.reference).score_reactions(&self.model, &ids, &state, opts.mssc)?;
        let score = scored
            .get(reaction_id)
            .and_then(|m| score_of(&m.candidates, term))
            .unwrap_or(0.0);
        Ok(round_score(score, self.config.round_digits))
    }

    // ------------------------------------------------------------------------
    // Statistics
    // ------------------------------------------------------------------------

    /// Recall/precision of species predictions (as formulas) against existing
    /// species annotations; `None` when no species is annotated.
    pub fn species_statistics(&self, mssc: Mssc) -> Result<Option<Statistics>> {
        let reference: BTreeMap<String, BTreeSet<Formula>> = self
            .model
            .existing_formula_state(&self.reference)
            .into_iter()
            .filter(|(_, formulas)| !formulas.is_empty())
            .collect();
        if reference.is_empty() {
            return Ok(None);
        }
        let ids: Vec<String> = reference.keys().cloned().collect();
        let opts = SpeciesOptions {
            method: self.config.species_method,
            mssc,
        };
        let predicted: BTreeMap<String, BTreeSet<Formula>> = self
            .predict_species(&ids, opts)?
            .into_iter()
            .map(|s| {
                let formulas = project_formulas(&s.candidates, &self.reference);
                (s.id, formulas)
            })
            .collect();
        Ok(Some(Statistics::compute(&reference, &predicted)))
    }

    /// Recall/precision of reaction predictions against existing reaction
    /// annotations; `None` when no reaction is annotated.
    pub fn reaction_statistics(&self, mssc: Mssc) -> Result<Option<Statistics>> {
        let reference: BTreeMap<String, BTreeSet<Term>> = self
            .model
            .all_reactions()
            .filter(|r| !r.existing_annotation.is_empty() && !r.components.is_empty())
            .map(|r| (r.id.clone(), r.existing_annotation.clone()))
            .collect();
        if reference.is_empty() {
            return Ok(None);
        }
        let ids: Vec<String> = reference.keys().cloned().collect();
        let opts = ReactionOptions {
            mssc,
            ..self.reaction_options()
        };
        let state = self.component_formula_state(&ids, &opts)?;
        let scored = ReactionMatcher::new(&self.reference).score_reactions(&self.model, &ids, &state, mssc)?;
        let predicted: BTreeMap<String, BTreeSet<Term>> = scored
            .into_iter()
            .map(|(id, m)| (id, m.candidates.into_iter().map(|c| c.term).collect()))
            .collect();
        Ok(Some(Statistics::compute(&reference, &predicted)))
    }
}

fn dedup_in_order<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = BTreeSet::new();
    items
        .into_iter()
        .map(|s| s.as_ref().to_string())
        .filter(|s| seen.insert(s.clone()))
        .collect()
}
