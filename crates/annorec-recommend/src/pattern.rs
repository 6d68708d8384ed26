use anyhow::{Context, Result};
use globset::{Glob, GlobMatcher};
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternKind {
    /// Shell-style wildcard over the whole id (`M_*_c`).
    #[default]
    Glob,
    /// Regular expression anchored at the start of the id.
    Regex,
}

pub(crate) enum IdPattern {
    Glob(GlobMatcher),
    Regex(Regex),
}

impl IdPattern {
    pub(crate) fn compile(pattern: &str, kind: PatternKind) -> Result<Self> {
        Ok(match kind {
            PatternKind::Glob => IdPattern::Glob(
                Glob::new(pattern)
                    .with_context(|| format!("invalid glob pattern `{pattern}`"))?
                    .compile_matcher(),
            ),
            PatternKind::Regex => IdPattern::Regex(
                Regex::new(pattern).with_context(|| format!("invalid regex `{pattern}`"))?,
            ),
        })
    }

    pub(crate) fn matches(&self, id: &str) -> bool {
        match self {
            IdPattern::Glob(glob) => glob.is_match(id),
            IdPattern::Regex(re) => re.find(id).map(|m| m.start() == 0).unwrap_or(false),
        }
    }
}
