//! Online mean and standard deviation over scalar streams.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::value::Value;
use crate::error::{KarasError, Result};

/// Running weighted sums of a scalar sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    #[serde(with = "crate::persistence::float")]
    x: f64,
    #[serde(with = "crate::persistence::float")]
    x2: f64,
    #[serde(with = "crate::persistence::float")]
    n: f64,
}

impl Summary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, value: f64, weight: f64) {
        self.x += weight * value;
        self.x2 += weight * value * value;
        self.n += weight;
    }

    /// Total weight accumulated so far.
    pub fn weight(&self) -> f64 {
        self.n
    }

    pub fn compute_mean(&self) -> f64 {
        self.x / self.n
    }

    /// Mean and standard deviation.
    pub fn make_statistics(&self) -> (f64, f64) {
        let mean = self.x / self.n;
        let var = self.x2 / self.n - mean * mean;
        // Rounding can push a zero variance slightly negative.
        (mean, var.max(0.0).sqrt())
    }
}

/// Online summaries of a stream of key/value dictionaries.
///
/// Only scalar entries are accumulated; arrays and images are skipped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DictSummary {
    summaries: BTreeMap<String, Summary>,
}

impl DictSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulate a dictionary of values.
    ///
    /// A [`Value::Weighted`] entry contributes its value with the given
    /// weight. A weight that is not scalar is a configuration error and
    /// nothing from the dictionary past that entry is added.
    pub fn add<'a, K, I>(&mut self, entries: I) -> Result<()>
    where
        K: AsRef<str>,
        I: IntoIterator<Item = (K, &'a Value)>,
    {
        for (key, value) in entries {
            let key = key.as_ref();
            let (value, weight) = match value {
                Value::Weighted { value, weight } => {
                    let w = weight.as_scalar().ok_or_else(|| {
                        KarasError::config(format!("Given weight to {key} was not scalar."))
                    })?;
                    (value.as_ref(), w)
                }
                other => (other, 1.0),
            };
            if let Some(x) = value.as_scalar() {
                self.summaries
                    .entry(key.to_string())
                    .or_default()
                    .add(x, weight);
            }
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.summaries.contains_key(key)
    }

    /// Mean of every accumulated key.
    pub fn compute_mean(&self) -> BTreeMap<String, f64> {
        self.summaries
            .iter()
            .map(|(name, summary)| (name.clone(), summary.compute_mean()))
            .collect()
    }

    /// Mean under `key` and standard deviation under `key.std`.
    pub fn make_statistics(&self) -> BTreeMap<String, f64> {
        let mut stats = BTreeMap::new();
        for (name, summary) in &self.summaries {
            let (mean, std) = summary.make_statistics();
            stats.insert(name.clone(), mean);
            stats.insert(format!("{name}.std"), std);
        }
        stats
    }
}
