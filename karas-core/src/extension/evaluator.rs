//! Held-out evaluation.

use tracing::debug;

use super::{Extension, PRIORITY_WRITER};
use crate::error::{KarasError, Result};
use crate::trainer::Trainer;
use crate::trigger::{IntervalTrigger, Trigger};
use crate::updater::{Evaluate, Mode};

/// Scores the model on a full pass over a held-out loader.
///
/// The model is put in inference mode with gradients disabled for the pass
/// and switched back afterwards, even if the pass fails. The match rate is
/// reported under `scalar/{key}`, so with the trainer's `test` scope it
/// lands at `test/scalar/accuracy` by default.
#[derive(Debug, Clone)]
pub struct Evaluator {
    loader: String,
    key: String,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new("test")
    }
}

impl Evaluator {
    /// Evaluate on the loader registered as `loader`.
    pub fn new(loader: impl Into<String>) -> Self {
        Self {
            loader: loader.into(),
            key: "accuracy".to_string(),
        }
    }

    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }
}

impl<U: Evaluate> Extension<U> for Evaluator {
    fn default_trigger(&self) -> Box<dyn Trigger> {
        Box::new(IntervalTrigger::every_epoch())
    }

    fn default_priority(&self) -> i32 {
        PRIORITY_WRITER
    }

    fn execute(&mut self, trainer: &mut Trainer<U>) -> Result<()> {
        let parts = trainer.parts_mut();
        let iterator = parts
            .iterators
            .get_mut(&self.loader)
            .ok_or_else(|| KarasError::not_found(format!("iterator '{}'", self.loader)))?;
        let updater = parts.updater;

        iterator.reset();
        updater.set_mode(Mode::Eval);
        updater.set_grad_enabled(false);
        let mut pass = || -> Result<(usize, usize)> {
            let (mut correct, mut total) = (0, 0);
            while iterator.has_next() {
                let batch = iterator.advance()?;
                let (c, t) = updater.count_matches(&batch)?;
                correct += c;
                total += t;
            }
            Ok((correct, total))
        };
        let outcome = pass();
        updater.set_grad_enabled(true);
        updater.set_mode(Mode::Train);
        let (correct, total) = outcome?;

        if total == 0 {
            debug!(loader = %self.loader, "evaluation pass had no samples");
            return Ok(());
        }
        parts
            .reporter
            .scope("scalar")
            .report_value(&self.key, correct as f64 / total as f64);
        Ok(())
    }
}
