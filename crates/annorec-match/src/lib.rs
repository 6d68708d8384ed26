//! Scoring core of the annotation recommender.
//!
//! - [`species`]: free-text name -> ranked ChEBI candidates (cosine or edit distance)
//! - [`reaction`]: species formula sets -> ranked Rhea candidates (min-max overlap)
//! - [`refine`]: mutual species/reaction refinement, capped at [`refine::MAX_CYCLES`]
//! - [`mssc`]: the candidate selection policy shared by all of the above
//! - [`model`]: model structure and its mutable prediction state
//!
//! All scorers read a shared [`annorec_reference::ReferenceData`] and never
//! mutate it; ranked lists are always `Vec<Candidate>`, sorted descending with
//! ties kept in term order.

pub mod candidate;
pub mod error;
pub mod model;
pub mod mssc;
pub mod reaction;
pub mod refine;
pub mod species;

pub use candidate::{round_score, score_of, sort_candidates, Candidate};
pub use error::{MatchError, MatchResult};
pub use model::{
    project_formulas, FormulaState, Model, ModelReaction, ModelSpec, ModelSpecies, ReactionSpec,
    SpeciesSpec,
};
pub use mssc::{apply_mssc, Mssc, MsscMode};
pub use reaction::{reaction_components, ReactionFeatures, ReactionMatch, ReactionMatcher};
pub use refine::{
    match_by_exactly_one_remaining, LoopState, RefinementLoop, RefinementOutcome, ScoreDelta,
    SpeciesUpdates, MAX_CYCLES,
};
pub use species::{edit_score, SpeciesFeatures, SpeciesMatcher, SpeciesMethod};
