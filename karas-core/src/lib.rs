//! # Karas Core
//!
//! Building blocks for iterative training loops.
//! Provides the trainer, triggers, extensions, the observation reporter,
//! data iterators, updater traits, configuration and resumable snapshots.

pub mod config;
pub mod error;
pub mod extension;
pub mod iterator;
pub mod persistence;
pub mod reporter;
pub mod trainer;
pub mod trigger;
pub mod updater;

// Re-export commonly used types at the crate root.
pub use config::{TrainerConfig, load_config};
pub use error::{KarasError, Result};
pub use extension::{
    Evaluator, EventWriter, ExtendOptions, Extension, LogReport, LrObserver, LrScheduler,
    PRIORITY_EDITOR, PRIORITY_READER, PRIORITY_WRITER, PrintReport, Snapshot, SnapshotTarget,
    StepLr,
};
pub use iterator::{DataIterator, DataLoader, VecLoader};
pub use reporter::{Observation, Reporter, Value};
pub use trainer::{FailurePolicy, Loaders, TRAIN, Trainer, TrainerState};
pub use trigger::{
    BestValueTrigger, Compare, EarlyStoppingTrigger, IntervalTrigger, StopMode, Trigger,
    TriggerContext, TriggerSpec, Unit,
};
pub use updater::{Device, Evaluate, Mode, Optimizer, Sgd, Updater, UpdaterBase};
