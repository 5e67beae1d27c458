//! Periodic snapshots of the trainer or one of its components.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::Extension;
use crate::error::Result;
use crate::persistence;
use crate::trainer::Trainer;
use crate::trigger::{IntervalTrigger, Trigger};
use crate::updater::Updater;

/// What a [`Snapshot`] serializes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotTarget {
    /// The full [`TrainerState`](crate::trainer::TrainerState), resumable
    /// with [`Trainer::resume`].
    #[default]
    Trainer,
    Updater,
    /// The state record of the extension registered under this name.
    Extension(String),
}

/// Writes a JSON snapshot into the output directory each time it fires.
///
/// The file is written atomically, so an interrupted write never replaces
/// an earlier snapshot with a partial one.
#[derive(Debug, Clone)]
pub struct Snapshot {
    target: SnapshotTarget,
    filename: String,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::new(SnapshotTarget::Trainer, "snapshot_iter_{iteration}.json")
    }
}

impl Snapshot {
    /// `filename` may contain `{iteration}` and `{epoch}`.
    pub fn new(target: SnapshotTarget, filename: impl Into<String>) -> Self {
        Self {
            target,
            filename: filename.into(),
        }
    }

    pub fn target(&self) -> &SnapshotTarget {
        &self.target
    }
}

impl<U: Updater> Extension<U> for Snapshot {
    fn default_trigger(&self) -> Box<dyn Trigger> {
        Box::new(IntervalTrigger::every_epoch())
    }

    fn execute(&mut self, trainer: &mut Trainer<U>) -> Result<()> {
        let record = match &self.target {
            SnapshotTarget::Trainer => serde_json::to_value(trainer.state()?)?,
            SnapshotTarget::Updater => trainer.updater().state()?,
            SnapshotTarget::Extension(name) => trainer.get_extension(name)?.state(),
        };
        let filename =
            persistence::render_filename(&self.filename, trainer.iteration(), trainer.epoch());
        let path = trainer.out().join(&filename);
        persistence::atomic_write_json(&path, &record)?;
        info!(path = %path.display(), iteration = trainer.iteration(), "snapshot written");
        Ok(())
    }
}
