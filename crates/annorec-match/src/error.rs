/// Contract violations by the caller. Missing reference data is never an error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchError {
    #[error("unknown species: {0}")]
    UnknownSpecies(String),

    #[error("unknown reaction: {0}")]
    UnknownReaction(String),

    #[error("reaction has no component species: {0}")]
    EmptyReaction(String),
}

pub type MatchResult<T> = Result<T, MatchError>;
