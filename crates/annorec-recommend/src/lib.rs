//! Model-level annotation recommendations.
//!
//! [`Recommender`] owns a [`annorec_match::Model`] and a shared
//! [`annorec_reference::ReferenceData`], and produces [`Recommendation`]s for
//! species (ChEBI) and reactions (Rhea), optionally refined against each other.

pub mod config;
pub mod credibility;
pub mod pattern;
pub mod recommendation;
pub mod recommender;
pub mod stats;

pub use config::{RecommenderConfig, DEFAULT_ROUND_DIGITS, MAX_ROUND_DIGITS};
pub use credibility::{clamp_probability, CredibilityModel, LogisticCredibility};
pub use pattern::PatternKind;
pub use recommendation::Recommendation;
pub use recommender::{
    AnnotationOptions, AnnotationResult, ReactionOptions, Recommender, SpeciesOptions,
};
pub use stats::{precision, recall, ScoreSummary, Statistics};
