//! Match-score selection criterion.
//!
//! `cutoff` is inclusive. `Top` keeps every candidate tied at the highest
//! surviving score; `Above` keeps everything at or over the cutoff. If nothing
//! reaches the cutoff the result is empty in both modes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::candidate::{sort_candidates, Candidate};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MsscMode {
    #[default]
    Top,
    Above,
}

impl fmt::Display for MsscMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MsscMode::Top => f.write_str("top"),
            MsscMode::Above => f.write_str("above"),
        }
    }
}

impl FromStr for MsscMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "top" => Ok(MsscMode::Top),
            "above" => Ok(MsscMode::Above),
            other => Err(format!("unknown MSSC mode `{other}` (expected `top` or `above`)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Mssc {
    #[serde(default)]
    pub mode: MsscMode,
    #[serde(default)]
    pub cutoff: f64,
}

impl Default for Mssc {
    fn default() -> Self {
        Self::top(0.0)
    }
}

impl Mssc {
    pub const fn top(cutoff: f64) -> Self {
        Self {
            mode: MsscMode::Top,
            cutoff,
        }
    }

    pub const fn above(cutoff: f64) -> Self {
        Self {
            mode: MsscMode::Above,
            cutoff,
        }
    }
}

/// Select from `candidates` under `mssc`. Always returns a fresh, sorted vector.
pub fn apply_mssc(candidates: &[Candidate], mssc: Mssc) -> Vec<Candidate> {
    let mut kept: Vec<Candidate> = candidates
        .iter()
        .filter(|c| c.score >= mssc.cutoff)
        .cloned()
        .collect();
    if kept.is_empty() {
        return kept;
    }
    if mssc.mode == MsscMode::Top {
        let best = kept
            .iter()
            .map(|c| c.score)
            .fold(f64::NEG_INFINITY, f64::max);
        kept.retain(|c| c.score == best);
    }
    sort_candidates(&mut kept);
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> Vec<Candidate> {
        vec![Candidate::new("T1", 0.9), Candidate::new("T2", 0.5)]
    }

    #[test]
    fn impossible_cutoff_yields_nothing() {
        assert!(apply_mssc(&pair(), Mssc::top(2.0)).is_empty());
        assert!(apply_mssc(&pair(), Mssc::above(2.0)).is_empty());
    }

    #[test]
    fn above_keeps_everything_over_cutoff_sorted() {
        let out = apply_mssc(&pair(), Mssc::above(0.3));
        assert_eq!(out, pair());
        let reversed: Vec<Candidate> = pair().into_iter().rev().collect();
        assert_eq!(apply_mssc(&reversed, Mssc::above(0.3)), pair());
    }

    #[test]
    fn cutoff_is_inclusive() {
        let out = apply_mssc(&pair(), Mssc::above(0.5));
        assert_eq!(out.len(), 2);
        let out = apply_mssc(&pair(), Mssc::top(0.9));
        assert_eq!(out, vec![Candidate::new("T1", 0.9)]);
    }

    #[test]
    fn top_keeps_all_ties() {
        let cands = vec![
            Candidate::new("A", 0.0),
            Candidate::new("B", 0.0),
            Candidate::new("C", 0.0),
        ];
        assert_eq!(apply_mssc(&cands, Mssc::default()), cands);
    }

    #[test]
    fn mode_parses() {
        assert_eq!("TOP".parse::<MsscMode>(), Ok(MsscMode::Top));
        assert_eq!(" above".parse::<MsscMode>(), Ok(MsscMode::Above));
        assert!("best".parse::<MsscMode>().is_err());
        assert_eq!(MsscMode::Above.to_string(), "above");
    }
}
