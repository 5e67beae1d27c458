//! Learning-rate schedules applied to one of the updater's optimizers.

use serde::{Deserialize, Serialize};

use super::{Extension, PRIORITY_EDITOR};
use crate::error::{KarasError, Result};
use crate::trainer::Trainer;
use crate::trigger::{IntervalTrigger, Trigger};
use crate::updater::Updater;

/// A learning-rate schedule advanced once per scheduler call.
pub trait LrSchedule {
    /// Advance the schedule and return the new rate given the current one.
    fn step(&mut self, current: f64) -> f64;

    fn state(&self) -> serde_json::Value {
        serde_json::Value::Null
    }

    fn load_state(&mut self, _state: serde_json::Value) -> Result<()> {
        Ok(())
    }
}

/// Multiply the rate by `gamma` every `step_size` steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepLr {
    step_size: u64,
    gamma: f64,
    #[serde(default)]
    steps: u64,
}

impl StepLr {
    pub fn new(step_size: u64, gamma: f64) -> Result<Self> {
        if step_size == 0 {
            return Err(KarasError::config("step_size must be positive"));
        }
        Ok(Self {
            step_size,
            gamma,
            steps: 0,
        })
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }
}

impl LrSchedule for StepLr {
    fn step(&mut self, current: f64) -> f64 {
        self.steps += 1;
        if self.steps % self.step_size == 0 {
            current * self.gamma
        } else {
            current
        }
    }

    fn state(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    fn load_state(&mut self, state: serde_json::Value) -> Result<()> {
        if !state.is_null() {
            *self = serde_json::from_value(state)?;
        }
        Ok(())
    }
}

/// Advances a schedule and writes the new rate into the named optimizer.
/// Runs once per epoch unless registered with another trigger.
pub struct LrScheduler {
    optimizer: String,
    schedule: Box<dyn LrSchedule>,
}

impl LrScheduler {
    pub fn new(optimizer: impl Into<String>, schedule: impl LrSchedule + 'static) -> Self {
        Self {
            optimizer: optimizer.into(),
            schedule: Box::new(schedule),
        }
    }
}

impl<U: Updater> Extension<U> for LrScheduler {
    fn default_trigger(&self) -> Box<dyn Trigger> {
        Box::new(IntervalTrigger::every_epoch())
    }

    fn default_priority(&self) -> i32 {
        PRIORITY_EDITOR
    }

    fn execute(&mut self, trainer: &mut Trainer<U>) -> Result<()> {
        let optimizer = trainer.updater_mut().optimizer_mut(&self.optimizer)?;
        let rate = self.schedule.step(optimizer.learning_rate());
        optimizer.set_learning_rate(rate);
        Ok(())
    }

    fn state(&self) -> serde_json::Value {
        self.schedule.state()
    }

    fn load_state(&mut self, state: serde_json::Value) -> Result<()> {
        self.schedule.load_state(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::ExtendOptions;
    use crate::trainer::test_support::{CountingUpdater, loaders};

    #[test]
    fn test_step_lr_decays_every_step_size() {
        let mut schedule = StepLr::new(2, 0.5).unwrap();
        let rates: Vec<f64> = (0..4)
            .scan(1.0, |rate, _| {
                *rate = schedule.step(*rate);
                Some(*rate)
            })
            .collect();
        assert_eq!(rates, vec![1.0, 0.5, 0.5, 0.25]);
        assert!(StepLr::new(0, 0.5).is_err());
    }

    #[test]
    fn test_scheduler_updates_optimizer() {
        let dir = tempfile::tempdir().unwrap();
        let mut trainer = Trainer::new(
            CountingUpdater::new(),
            IntervalTrigger::iterations(6).unwrap(),
            loaders(vec![1.0, 2.0]),
            dir.path(),
        )
        .unwrap();
        trainer.extend(
            LrScheduler::new("main", StepLr::new(1, 0.5).unwrap()),
            ExtendOptions::new(),
        );
        trainer.run().unwrap();
        // Three epochs, one decay each.
        let rate = trainer.updater().optimizer("main").unwrap().learning_rate();
        assert!((rate - 0.0125).abs() < 1e-12);
    }

    #[test]
    fn test_unknown_optimizer_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let mut trainer = Trainer::new(
            CountingUpdater::new(),
            IntervalTrigger::iterations(2).unwrap(),
            loaders(vec![1.0]),
            dir.path(),
        )
        .unwrap();
        trainer.extend(
            LrScheduler::new("missing", StepLr::new(1, 0.5).unwrap()),
            ExtendOptions::new(),
        );
        assert!(trainer.run().unwrap_err().is_config());
    }

    #[test]
    fn test_schedule_state_roundtrip() {
        let mut schedule = StepLr::new(3, 0.1).unwrap();
        schedule.step(1.0);
        let mut restored = StepLr::new(3, 0.1).unwrap();
        restored.load_state(LrSchedule::state(&schedule)).unwrap();
        assert_eq!(restored.steps(), 1);
    }
}
