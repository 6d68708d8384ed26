//! Recall and precision of predicted annotations against existing ones.
//!
//! Only keys present on both sides are evaluated.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSummary {
    pub per_key: BTreeMap<String, f64>,
    /// Mean over `per_key`; 0.0 when nothing could be evaluated.
    pub mean: f64,
}

impl ScoreSummary {
    fn from_per_key(per_key: BTreeMap<String, f64>) -> Self {
        let mean = if per_key.is_empty() {
            0.0
        } else {
            per_key.values().sum::<f64>() / per_key.len() as f64
        };
        Self { per_key, mean }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    pub recall: ScoreSummary,
    pub precision: ScoreSummary,
}

impl Statistics {
    pub fn compute<T: Ord>(
        reference: &BTreeMap<String, BTreeSet<T>>,
        predicted: &BTreeMap<String, BTreeSet<T>>,
    ) -> Self {
        Self {
            recall: recall(reference, predicted),
            precision: precision(reference, predicted),
        }
    }
}

/// Fraction of reference annotations that were predicted.
pub fn recall<T: Ord>(
    reference: &BTreeMap<String, BTreeSet<T>>,
    predicted: &BTreeMap<String, BTreeSet<T>>,
) -> ScoreSummary {
    ratio(reference, predicted, |r, _| r.len())
}

/// Fraction of predicted annotations that are in the reference.
pub fn precision<T: Ord>(
    reference: &BTreeMap<String, BTreeSet<T>>,
    predicted: &BTreeMap<String, BTreeSet<T>>,
) -> ScoreSummary {
    ratio(reference, predicted, |_, p| p.len())
}

fn ratio<T: Ord>(
    reference: &BTreeMap<String, BTreeSet<T>>,
    predicted: &BTreeMap<String, BTreeSet<T>>,
    denominator: impl Fn(&BTreeSet<T>, &BTreeSet<T>) -> usize,
) -> ScoreSummary {
    let mut per_key = BTreeMap::new();
    for (key, r) in reference {
        let Some(p) = predicted.get(key) else {
            continue;
        };
        let hits = r.intersection(p).count();
        let denom = denominator(r, p);
        let value = if denom == 0 {
            0.0
        } else {
            hits as f64 / denom as f64
        };
        per_key.insert(key.clone(), value);
    }
    ScoreSummary::from_per_key(per_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotations(entries: &[(&str, &[&str])]) -> BTreeMap<String, BTreeSet<String>> {
        entries
            .iter()
            .map(|(k, vs)| (k.to_string(), vs.iter().map(|v| v.to_string()).collect()))
            .collect()
    }

    #[test]
    fn recall_and_precision_on_dummy_data() {
        let reference = annotations(&[("a", &["ABC", "BCD"]), ("b", &["DEF"])]);
        let predicted = annotations(&[("a", &["ABC"]), ("b", &["AAA"])]);

        let r = recall(&reference, &predicted);
        assert_eq!(r.mean, 0.25);
        assert_eq!(r.per_key["a"], 0.5);
        assert_eq!(r.per_key["b"], 0.0);

        let p = precision(&reference, &predicted);
        assert_eq!(p.mean, 0.5);
        assert_eq!(p.per_key["a"], 1.0);
        assert_eq!(p.per_key["b"], 0.0);
    }

    #[test]
    fn only_shared_keys_count() {
        let reference = annotations(&[("a", &["X"]), ("only_ref", &["Y"])]);
        let predicted = annotations(&[("a", &["X"]), ("only_pred", &["Z"]), ("b", &[])]);
        let stats = Statistics::compute(&reference, &predicted);
        assert_eq!(stats.recall.per_key.len(), 1);
        assert_eq!(stats.recall.mean, 1.0);
        assert_eq!(stats.precision.mean, 1.0);
    }

    #[test]
    fn empty_prediction_set_scores_zero() {
        let reference = annotations(&[("a", &["X"])]);
        let predicted = annotations(&[("a", &[])]);
        assert_eq!(precision(&reference, &predicted).mean, 0.0);
        assert_eq!(recall(&BTreeMap::new(), &predicted).mean, 0.0);
    }
}
