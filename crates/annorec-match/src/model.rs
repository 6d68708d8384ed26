//! In-memory model structure and its mutable prediction state.
//!
//! Only `candidates` (and, for species, the derived `formula` set) change after
//! construction, and only through the explicit `update_with_*` methods. Every
//! update re-projects `formula` from `candidates` through the reference formula
//! map, dropping candidates that have no formula.

use std::collections::{BTreeMap, BTreeSet};

use annorec_reference::{Formula, ReferenceData, Term};
use serde::{Deserialize, Serialize};

use crate::candidate::{sort_candidates, Candidate};
use crate::error::{MatchError, MatchResult};

/// Species id -> formula set; what reaction scoring consumes.
pub type FormulaState = BTreeMap<String, BTreeSet<Formula>>;

/// Deduplicated formulas reachable from `candidates`.
pub fn project_formulas(candidates: &[Candidate], reference: &ReferenceData) -> BTreeSet<Formula> {
    reference.formulas_of(candidates.iter().map(|c| &c.term))
}

// ============================================================================
// Raw model contract
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeciesSpec {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Existing chemical annotation.
    #[serde(default)]
    pub annotation: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReactionSpec {
    pub id: String,
    /// Reactant and product species ids.
    pub components: Vec<String>,
    /// Existing Rhea annotation (any direction).
    #[serde(default)]
    pub annotation: Vec<String>,
    #[serde(default)]
    pub kegg: Vec<String>,
    #[serde(default)]
    pub ec: Vec<String>,
}

/// What a model source hands over: species and reactions with their
/// existing annotations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    #[serde(default)]
    pub species: Vec<SpeciesSpec>,
    #[serde(default)]
    pub reactions: Vec<ReactionSpec>,
}

impl ModelSpec {
    pub fn species(mut self, id: &str, name: &str, annotation: &[&str]) -> Self {
        self.species.push(SpeciesSpec {
            id: id.to_string(),
            name: name.to_string(),
            annotation: annotation.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    pub fn reaction(mut self, id: &str, components: &[&str], annotation: &[&str]) -> Self {
        self.reactions.push(ReactionSpec {
            id: id.to_string(),
            components: components.iter().map(|s| s.to_string()).collect(),
            annotation: annotation.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        });
        self
    }
}

// ============================================================================
// Species / reactions
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct ModelSpecies {
    pub id: String,
    pub display_name: String,
    pub existing_annotation: BTreeSet<Term>,
    candidates: Vec<Candidate>,
    formula: BTreeSet<Formula>,
}

impl ModelSpecies {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            existing_annotation: BTreeSet::new(),
            candidates: Vec::new(),
            formula: BTreeSet::new(),
        }
    }

    /// Display name, or the id when the name is empty.
    pub fn name_to_use(&self) -> &str {
        if self.display_name.is_empty() {
            &self.id
        } else {
            &self.display_name
        }
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn formula(&self) -> &BTreeSet<Formula> {
        &self.formula
    }

    pub fn existing_formula(&self, reference: &ReferenceData) -> BTreeSet<Formula> {
        reference.formulas_of(self.existing_annotation.iter())
    }

    pub fn update_with_candidates(&mut self, candidates: Vec<Candidate>, reference: &ReferenceData) {
        let mut candidates = candidates;
        sort_candidates(&mut candidates);
        self.formula = project_formulas(&candidates, reference);
        self.candidates = candidates;
    }

    /// Replace the candidates with `terms`, all at `score`.
    pub fn update_with_terms<'a, I>(&mut self, terms: I, score: f64, reference: &ReferenceData)
    where
        I: IntoIterator<Item = &'a Term>,
    {
        let candidates = terms
            .into_iter()
            .map(|t| Candidate {
                term: t.clone(),
                score,
            })
            .collect();
        self.update_with_candidates(candidates, reference);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelReaction {
    pub id: String,
    pub components: BTreeSet<String>,
    pub existing_annotation: BTreeSet<Term>,
    candidates: Vec<Candidate>,
}

impl ModelReaction {
    pub fn new<I, S>(id: impl Into<String>, components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            components: components.into_iter().map(Into::into).collect(),
            existing_annotation: BTreeSet::new(),
            candidates: Vec::new(),
        }
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn update_with_candidates(&mut self, candidates: Vec<Candidate>) {
        let mut candidates = candidates;
        sort_candidates(&mut candidates);
        self.candidates = candidates;
    }
}

// ============================================================================
// Model
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Model {
    species: BTreeMap<String, ModelSpecies>,
    reactions: BTreeMap<String, ModelReaction>,
}

impl Model {
    /// Build a model from its raw contract. Reaction annotations arriving as
    /// Rhea, KEGG or EC ids are merged into master Rhea terms.
    pub fn from_spec(spec: ModelSpec, reference: &ReferenceData) -> MatchResult<Self> {
        let mut model = Model::default();
        for s in spec.species {
            let mut species = ModelSpecies::new(s.id, s.name);
            species.existing_annotation = s.annotation.into_iter().map(Term::from).collect();
            model.species.insert(species.id.clone(), species);
        }
        for r in spec.reactions {
            if let Some(missing) = r.components.iter().find(|c| !model.species.contains_key(*c)) {
                return Err(MatchError::UnknownSpecies(missing.clone()));
            }
            let mut reaction = ModelReaction::new(r.id, r.components);
            reaction.existing_annotation =
                reference.merge_reaction_annotations(&r.annotation, &r.kegg, &r.ec);
            model.reactions.insert(reaction.id.clone(), reaction);
        }
        tracing::debug!(
            species = model.species.len(),
            reactions = model.reactions.len(),
            "built model"
        );
        Ok(model)
    }

    pub fn species(&self, id: &str) -> MatchResult<&ModelSpecies> {
        self.species
            .get(id)
            .ok_or_else(|| MatchError::UnknownSpecies(id.to_string()))
    }

    pub fn species_mut(&mut self, id: &str) -> MatchResult<&mut ModelSpecies> {
        self.species
            .get_mut(id)
            .ok_or_else(|| MatchError::UnknownSpecies(id.to_string()))
    }

    pub fn reaction(&self, id: &str) -> MatchResult<&ModelReaction> {
        self.reactions
            .get(id)
            .ok_or_else(|| MatchError::UnknownReaction(id.to_string()))
    }

    pub fn reaction_mut(&mut self, id: &str) -> MatchResult<&mut ModelReaction> {
        self.reactions
            .get_mut(id)
            .ok_or_else(|| MatchError::UnknownReaction(id.to_string()))
    }

    pub fn species_ids(&self) -> impl Iterator<Item = &str> {
        self.species.keys().map(|k| k.as_str())
    }

    pub fn reaction_ids(&self) -> impl Iterator<Item = &str> {
        self.reactions.keys().map(|k| k.as_str())
    }

    pub fn all_species(&self) -> impl Iterator<Item = &ModelSpecies> {
        self.species.values()
    }

    pub fn all_reactions(&self) -> impl Iterator<Item = &ModelReaction> {
        self.reactions.values()
    }

    /// Latest `formula` of every species.
    pub fn formula_state(&self) -> FormulaState {
        self.species
            .values()
            .map(|s| (s.id.clone(), s.formula.clone()))
            .collect()
    }

    /// Formulas of existing annotations, for species that have any.
    pub fn existing_formula_state(&self, reference: &ReferenceData) -> FormulaState {
        self.species
            .values()
            .filter(|s| !s.existing_annotation.is_empty())
            .map(|s| (s.id.clone(), s.existing_formula(reference)))
            .collect()
    }
}
