//! Triggers that fire when a windowed metric reaches a new best.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Compare, IntervalTrigger, Trigger, TriggerContext};
use crate::error::Result;
use crate::reporter::DictSummary;

/// Fires when the mean of `key` over the last interval beats the best so far.
///
/// Every call adds the matching observations (any tag containing `key`) to a
/// private summary window. When the inner interval elapses the window's mean
/// is compared with the best value and the window is reset. The first
/// evaluated window always counts as an improvement.
#[derive(Debug, Clone)]
pub struct BestValueTrigger {
    key: String,
    compare: Compare,
    interval: IntervalTrigger,
    best_value: Option<f64>,
    summary: DictSummary,
}

#[derive(Serialize, Deserialize)]
struct BestValueState {
    #[serde(with = "crate::persistence::float::option")]
    best_value: Option<f64>,
    summary: DictSummary,
}

impl BestValueTrigger {
    pub fn new(key: impl Into<String>, compare: Compare, interval: IntervalTrigger) -> Self {
        Self {
            key: key.into(),
            compare,
            interval,
            best_value: None,
            summary: DictSummary::new(),
        }
    }

    /// Max-value trigger: fires when the metric increases. Checked every epoch.
    pub fn max(key: impl Into<String>) -> Self {
        Self::new(key, Compare::Greater, IntervalTrigger::every_epoch())
    }

    /// Min-value trigger: fires when the metric decreases. Checked every epoch.
    pub fn min(key: impl Into<String>) -> Self {
        Self::new(key, Compare::Less, IntervalTrigger::every_epoch())
    }

    pub fn with_interval(mut self, interval: IntervalTrigger) -> Self {
        self.interval = interval;
        self
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn best_value(&self) -> Option<f64> {
        self.best_value
    }
}

impl Trigger for BestValueTrigger {
    fn fires(&mut self, ctx: &TriggerContext<'_>) -> Result<bool> {
        for (tag, value) in ctx.observation {
            if tag.contains(self.key.as_str()) {
                self.summary.add([(self.key.as_str(), value)])?;
            }
        }

        if !self.interval.check(ctx) {
            return Ok(false);
        }

        let stats = self.summary.compute_mean();
        self.summary = DictSummary::new();
        let Some(&value) = stats.get(&self.key) else {
            debug!(key = %self.key, "no observations in window, skipping best-value check");
            return Ok(false);
        };

        if self.compare.improves(self.best_value, value) {
            self.best_value = Some(value);
            return Ok(true);
        }
        Ok(false)
    }

    fn state(&self) -> serde_json::Value {
        serde_json::to_value(BestValueState {
            best_value: self.best_value,
            summary: self.summary.clone(),
        })
        .unwrap_or(serde_json::Value::Null)
    }

    fn load_state(&mut self, state: serde_json::Value) -> Result<()> {
        if state.is_null() {
            return Ok(());
        }
        let state: BestValueState = serde_json::from_value(state)?;
        self.best_value = state.best_value;
        self.summary = state.summary;
        Ok(())
    }
}
