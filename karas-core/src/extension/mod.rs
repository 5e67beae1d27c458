//! Extensions: named, prioritized callbacks run by the trainer.
//!
//! Within one step the trainer walks its extensions from the highest
//! priority to the lowest, evaluates each extension's trigger exactly once,
//! and calls [`Extension::execute`] when it fires. Extensions that write
//! observations should outrank the ones that read them.

pub mod evaluator;
pub mod event_writer;
pub mod log_report;
pub mod lr_observer;
pub mod lr_scheduler;
pub mod print_report;
pub mod snapshot;

use std::any::Any;

use crate::error::Result;
use crate::trainer::Trainer;
use crate::trigger::{IntervalTrigger, Trigger};
use crate::updater::Updater;

pub use evaluator::Evaluator;
pub use event_writer::{EventSink, EventWriter, JsonlSink};
pub use log_report::{LogEntry, LogReport};
pub use lr_observer::LrObserver;
pub use lr_scheduler::{LrSchedule, LrScheduler, StepLr};
pub use print_report::PrintReport;
pub use snapshot::{Snapshot, SnapshotTarget};

/// Extensions that produce observations other extensions consume.
pub const PRIORITY_WRITER: i32 = 300;
/// Extensions that modify observations in place.
pub const PRIORITY_EDITOR: i32 = 200;
/// Extensions that only read observations.
pub const PRIORITY_READER: i32 = 100;

/// A callback attached to a [`Trainer`].
///
/// Only [`execute`](Self::execute) is required. The lifecycle hooks default
/// to no-ops: `initialize` runs once before the first step inside the `test`
/// scope, `finalize` once after the loop ends, whether it succeeded or not.
pub trait Extension<U: Updater>: Any {
    /// Registration name used when [`ExtendOptions`] gives none.
    fn default_name(&self) -> String {
        short_type_name(std::any::type_name::<Self>()).to_string()
    }

    fn default_trigger(&self) -> Box<dyn Trigger> {
        Box::new(IntervalTrigger::every_iteration())
    }

    fn default_priority(&self) -> i32 {
        PRIORITY_READER
    }

    fn initialize(&mut self, _trainer: &mut Trainer<U>) -> Result<()> {
        Ok(())
    }

    fn execute(&mut self, trainer: &mut Trainer<U>) -> Result<()>;

    fn finalize(&mut self, _trainer: &mut Trainer<U>) -> Result<()> {
        Ok(())
    }

    /// Plain record of the extension's state for snapshots. Live resources
    /// such as open files never belong here.
    fn state(&self) -> serde_json::Value {
        serde_json::Value::Null
    }

    fn load_state(&mut self, _state: serde_json::Value) -> Result<()> {
        Ok(())
    }
}

/// Overrides applied when registering an extension.
#[derive(Default)]
pub struct ExtendOptions {
    pub(crate) name: Option<String>,
    pub(crate) trigger: Option<Box<dyn Trigger>>,
    pub(crate) priority: Option<i32>,
}

impl ExtendOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn trigger(mut self, trigger: impl Trigger + 'static) -> Self {
        self.trigger = Some(Box::new(trigger));
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }
}

/// `karas_core::extension::log_report::LogReport` becomes `LogReport`.
fn short_type_name(full: &str) -> &str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
