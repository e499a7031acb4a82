use derive_more::{Deref, From};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Breed identifier → confidence score (0–100).
///
/// Keys are breed catalog identifiers. Iteration follows key order, which is
/// what makes ranking deterministic when two breeds share a score.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Deref, From)]
#[serde(transparent)]
pub struct Predictions(BTreeMap<String, f64>);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedPrediction {
    pub breed: String,
    pub score: f64,
}

impl Predictions {
    pub const MAX_SCORE: f64 = 100.0;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, breed: impl Into<String>, score: f64) {
        self.0.insert(breed.into(), score);
    }

    /// All entries, highest score first. Equal scores keep key order.
    pub fn ranked(&self) -> Vec<RankedPrediction> {
        let mut ranked: Vec<RankedPrediction> = self
            .0
            .iter()
            .map(|(breed, score)| RankedPrediction {
                breed: breed.clone(),
                score: *score,
            })
            .collect();
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        ranked
    }

    pub fn top(&self) -> Option<RankedPrediction> {
        self.ranked().into_iter().next()
    }

    pub fn has_valid_scores(&self) -> bool {
        self.0
            .values()
            .all(|score| score.is_finite() && (0.0..=Self::MAX_SCORE).contains(score))
    }

    pub fn into_inner(self) -> BTreeMap<String, f64> {
        self.0
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for Predictions {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}
