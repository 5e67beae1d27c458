//! Stop trigger combining a hard training length with patience on a metric.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{Compare, IntervalTrigger, Trigger, TriggerContext, Unit};
use crate::error::Result;
use crate::reporter::compare_key;

/// How the monitored value is judged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopMode {
    Min,
    Max,
    /// `max` when the monitor name contains `accuracy`, `min` otherwise.
    #[default]
    Auto,
}

/// Stops training after `patience` checks without improvement, or once the
/// maximum training length is reached.
///
/// The latest raw value of the monitored key is used, not a windowed mean.
/// A monitored key that is missing from the observation is logged and
/// treated as "not yet".
#[derive(Debug, Clone)]
pub struct EarlyStoppingTrigger {
    monitor: String,
    patience: usize,
    mode: StopMode,
    verbose: bool,
    check_trigger: IntervalTrigger,
    max_trigger: IntervalTrigger,
    count: usize,
    best: Option<f64>,
}

#[derive(Serialize, Deserialize)]
struct EarlyStoppingState {
    count: usize,
    #[serde(with = "crate::persistence::float::option")]
    best: Option<f64>,
}

impl Default for EarlyStoppingTrigger {
    fn default() -> Self {
        Self {
            monitor: "main/loss".to_string(),
            patience: 3,
            mode: StopMode::Auto,
            verbose: true,
            check_trigger: IntervalTrigger::every_epoch(),
            max_trigger: IntervalTrigger::fixed(100.0, Unit::Epoch),
            count: 0,
            best: None,
        }
    }
}

impl EarlyStoppingTrigger {
    pub fn new(monitor: impl Into<String>) -> Self {
        Self {
            monitor: monitor.into(),
            ..Self::default()
        }
    }

    pub fn patience(mut self, patience: usize) -> Self {
        self.patience = patience;
        self
    }

    pub fn mode(mut self, mode: StopMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn check_trigger(mut self, trigger: IntervalTrigger) -> Self {
        self.check_trigger = trigger;
        self
    }

    pub fn max_trigger(mut self, trigger: IntervalTrigger) -> Self {
        self.max_trigger = trigger;
        self
    }

    pub fn monitor(&self) -> &str {
        &self.monitor
    }

    /// Consecutive checks without improvement.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn best(&self) -> Option<f64> {
        self.best
    }

    /// The comparison resolved from the mode and monitor name.
    pub fn compare(&self) -> Compare {
        match self.mode {
            StopMode::Min => Compare::Less,
            StopMode::Max => Compare::Greater,
            StopMode::Auto if self.monitor.contains("accuracy") => Compare::Greater,
            StopMode::Auto => Compare::Less,
        }
    }

    pub fn training_length(&self) -> (f64, Unit) {
        self.max_trigger.training_length()
    }
}

impl Trigger for EarlyStoppingTrigger {
    fn fires(&mut self, ctx: &TriggerContext<'_>) -> Result<bool> {
        if self.max_trigger.check(ctx) {
            return Ok(true);
        }

        let current = ctx
            .observation
            .iter()
            .filter(|(tag, _)| compare_key(&self.monitor, tag))
            .filter_map(|(_, value)| value.as_scalar())
            .last();
        let Some(current) = current else {
            if self.verbose {
                warn!(monitor = %self.monitor, "monitored key is not in observation");
            }
            return Ok(false);
        };

        if !self.check_trigger.check(ctx) {
            return Ok(false);
        }

        if self.compare().improves(self.best, current) {
            self.best = Some(current);
            self.count = 0;
        } else {
            self.count += 1;
        }

        if self.count >= self.patience {
            if self.verbose {
                info!(epoch = ctx.epoch, monitor = %self.monitor, "early stopping");
            }
            return Ok(true);
        }
        Ok(false)
    }

    fn state(&self) -> serde_json::Value {
        serde_json::to_value(EarlyStoppingState {
            count: self.count,
            best: self.best,
        })
        .unwrap_or(serde_json::Value::Null)
    }

    fn load_state(&mut self, state: serde_json::Value) -> Result<()> {
        if state.is_null() {
            return Ok(());
        }
        let state: EarlyStoppingState = serde_json::from_value(state)?;
        self.count = state.count;
        self.best = state.best;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::{Observation, Value};
    use crate::trigger::test_support::context_at;

    fn observe(tag: &str, value: f64) -> Observation {
        let mut obs = Observation::new();
        obs.insert(tag.to_string(), Value::Scalar(value));
        obs
    }

    fn stopper(patience: usize) -> EarlyStoppingTrigger {
        EarlyStoppingTrigger::new("test/accuracy")
            .patience(patience)
            .check_trigger(IntervalTrigger::every_iteration())
            .max_trigger(IntervalTrigger::iterations(1000).unwrap())
            .verbose(false)
    }

    fn feed(trigger: &mut EarlyStoppingTrigger, values: &[f64]) -> Vec<bool> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| {
                let obs = observe("test/scalar/accuracy", v);
                trigger.fires(&context_at(i as u64 + 1, 10_000, &obs)).unwrap()
            })
            .collect()
    }

    #[test]
    fn test_auto_mode_detects_accuracy() {
        assert_eq!(stopper(3).compare(), Compare::Greater);
        assert_eq!(EarlyStoppingTrigger::new("main/loss").compare(), Compare::Less);
        assert_eq!(
            EarlyStoppingTrigger::new("main/loss").mode(StopMode::Max).compare(),
            Compare::Greater
        );
    }

    #[test]
    fn test_fires_on_third_non_improving_check() {
        let mut t = stopper(3);
        let fired = feed(&mut t, &[0.8, 0.7, 0.7, 0.6]);
        assert_eq!(fired, vec![false, false, false, true]);
        assert_eq!(t.count(), 3);
        assert_eq!(t.best(), Some(0.8));
    }

    #[test]
    fn test_improvement_resets_counter() {
        let mut t = stopper(3);
        feed(&mut t, &[0.5, 0.4]);
        assert_eq!(t.count(), 1);
        feed(&mut t, &[0.9]);
        assert_eq!(t.count(), 0);
        assert_eq!(t.best(), Some(0.9));
    }

    #[test]
    fn test_missing_key_is_not_fatal() {
        let mut t = stopper(1);
        let obs = observe("train/scalar/loss", 0.1);
        assert!(!t.fires(&context_at(1, 100, &obs)).unwrap());
        assert_eq!(t.count(), 0);
    }

    #[test]
    fn test_max_trigger_stops_regardless() {
        let mut t = stopper(3).max_trigger(IntervalTrigger::iterations(2).unwrap());
        let obs = Observation::new();
        assert!(!t.fires(&context_at(1, 100, &obs)).unwrap());
        assert!(t.fires(&context_at(2, 100, &obs)).unwrap());
        assert_eq!(t.training_length(), (2.0, Unit::Iteration));
    }

    #[test]
    fn test_only_counts_on_check_interval() {
        let mut t = stopper(1).check_trigger(IntervalTrigger::iterations(2).unwrap());
        // iteration 1 is not a check, iteration 2 sets the best, 3 skipped, 4 fails to improve
        assert_eq!(feed(&mut t, &[0.5, 0.6, 0.1, 0.2]), vec![false, false, false, true]);
    }

    #[test]
    fn test_state_roundtrip() {
        let mut t = stopper(3);
        feed(&mut t, &[0.8, 0.7]);
        let mut restored = stopper(3);
        restored.load_state(t.state()).unwrap();
        assert_eq!(restored.count(), 1);
        assert_eq!(restored.best(), Some(0.8));
    }
}
