//! Learning-rate observation.

use super::Extension;
use crate::error::Result;
use crate::trainer::Trainer;
use crate::updater::Updater;

/// Reports the learning rate of every optimizer as `scalar/{name}/lr`.
///
/// Also reports once from `initialize`, so the starting rate is visible
/// before the first step.
#[derive(Debug, Clone, Copy, Default)]
pub struct LrObserver;

impl LrObserver {
    fn observe<U: Updater>(trainer: &mut Trainer<U>) {
        let parts = trainer.parts_mut();
        let rates: Vec<(String, f64)> = parts
            .updater
            .base()
            .optimizers()
            .map(|(name, optimizer)| (format!("{name}/lr"), optimizer.learning_rate()))
            .collect();
        parts.reporter.scope("scalar").report(rates);
    }
}

impl<U: Updater> Extension<U> for LrObserver {
    fn initialize(&mut self, trainer: &mut Trainer<U>) -> Result<()> {
        Self::observe(trainer);
        Ok(())
    }

    fn execute(&mut self, trainer: &mut Trainer<U>) -> Result<()> {
        Self::observe(trainer);
        Ok(())
    }
}
