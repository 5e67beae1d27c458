//! Triggers decide when an extension (or the whole run) should act.
//!
//! The trainer calls each extension's trigger exactly once per step and only
//! runs the extension when it returns `true`. Stateful triggers update their
//! windows and counters on every call, so calling them more often than that
//! skews their statistics.

pub mod best_value;
pub mod early_stopping;
pub mod interval;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::iterator::DataIterator;
use crate::reporter::Observation;

pub use best_value::BestValueTrigger;
pub use early_stopping::{EarlyStoppingTrigger, StopMode};
pub use interval::{IntervalTrigger, TriggerSpec, Unit};

/// Training progress visible to a trigger.
#[derive(Debug, Clone, Copy)]
pub struct TriggerContext<'a> {
    pub iteration: u64,
    pub epoch: u64,
    pub epoch_detail: f64,
    pub previous_epoch_detail: Option<f64>,
    pub observation: &'a Observation,
}

impl<'a> TriggerContext<'a> {
    /// Progress of `iterator` together with the current observations.
    pub fn new<B>(iterator: &DataIterator<B>, observation: &'a Observation) -> Self {
        Self {
            iteration: iterator.iteration(),
            epoch: iterator.epoch(),
            epoch_detail: iterator.epoch_detail(),
            previous_epoch_detail: iterator.previous_epoch_detail(),
            observation,
        }
    }
}

/// A periodic or metric-driven condition.
pub trait Trigger {
    /// Whether the condition holds at this step. May update internal state.
    fn fires(&mut self, ctx: &TriggerContext<'_>) -> Result<bool>;

    /// Plain record of the trigger's mutable state for snapshots.
    fn state(&self) -> serde_json::Value {
        serde_json::Value::Null
    }

    fn load_state(&mut self, _state: serde_json::Value) -> Result<()> {
        Ok(())
    }
}

impl<F> Trigger for F
where
    F: FnMut(&TriggerContext<'_>) -> bool,
{
    fn fires(&mut self, ctx: &TriggerContext<'_>) -> Result<bool> {
        Ok(self(ctx))
    }
}

/// Direction in which a monitored value improves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compare {
    Greater,
    Less,
}

impl Compare {
    /// Whether `value` improves on `best`; anything improves on no best.
    pub fn improves(self, best: Option<f64>, value: f64) -> bool {
        match (self, best) {
            (_, None) => true,
            (Compare::Greater, Some(best)) => value > best,
            (Compare::Less, Some(best)) => value < best,
        }
    }
}
