//! Windowed averaging of observations into a JSON log.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Extension;
use crate::error::Result;
use crate::persistence;
use crate::reporter::{DictSummary, compare_key};
use crate::trainer::Trainer;
use crate::trigger::{IntervalTrigger, Trigger};
use crate::updater::Updater;

/// One row of the log: averaged observations plus `epoch`, `iteration` and
/// `elapsed_time` stamps.
pub type LogEntry = BTreeMap<String, serde_json::Value>;

type Postprocess = Box<dyn FnMut(&mut LogEntry)>;

/// Accumulates observations every time it runs and, when its own flush
/// trigger fires, appends the window means to the log and rewrites the log
/// file atomically.
///
/// The extension trigger decides when observations are sampled (every
/// iteration by default); the flush trigger given to [`LogReport::new`]
/// decides when a row is emitted.
pub struct LogReport {
    keys: Option<Vec<String>>,
    trigger: Box<dyn Trigger>,
    postprocess: Option<Postprocess>,
    log_name: Option<String>,
    log: Vec<LogEntry>,
    summary: DictSummary,
}

#[derive(Serialize, Deserialize)]
struct LogReportState {
    log: Vec<LogEntry>,
    summary: DictSummary,
    #[serde(default)]
    trigger: serde_json::Value,
}

impl Default for LogReport {
    fn default() -> Self {
        Self::new(IntervalTrigger::every_epoch())
    }
}

impl LogReport {
    /// Flush on `trigger`, log every reported key, write to `log`.
    pub fn new(trigger: impl Trigger + 'static) -> Self {
        Self {
            keys: None,
            trigger: Box::new(trigger),
            postprocess: None,
            log_name: Some("log".to_string()),
            log: Vec::new(),
            summary: DictSummary::new(),
        }
    }

    /// Only accumulate tags matching one of `keys` (see [`compare_key`]).
    /// Matching values are logged under the query key.
    pub fn keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keys = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    /// Log file name under the output directory; `{iteration}` and
    /// `{epoch}` are interpolated. `None` keeps the log in memory only.
    pub fn log_name(mut self, log_name: Option<&str>) -> Self {
        self.log_name = log_name.map(str::to_string);
        self
    }

    /// Callback that may edit each row before it is stored.
    pub fn postprocess(mut self, f: impl FnMut(&mut LogEntry) + 'static) -> Self {
        self.postprocess = Some(Box::new(f));
        self
    }

    /// Every row emitted so far.
    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    fn accumulate<U: Updater>(&mut self, trainer: &Trainer<U>) -> Result<()> {
        let observation = trainer.observation();
        match &self.keys {
            None => self.summary.add(observation)?,
            Some(keys) => {
                for (tag, value) in observation {
                    for key in keys.iter().filter(|key| compare_key(key, tag)) {
                        self.summary.add([(key.as_str(), value)])?;
                    }
                }
            }
        }
        Ok(())
    }

    fn flush<U: Updater>(&mut self, trainer: &Trainer<U>) -> Result<()> {
        let mut entry: LogEntry = self
            .summary
            .compute_mean()
            .into_iter()
            .map(|(name, mean)| (name, serde_json::Value::from(mean)))
            .collect();
        entry.insert("epoch".into(), trainer.epoch().into());
        entry.insert("iteration".into(), trainer.iteration().into());
        entry.insert("elapsed_time".into(), trainer.elapsed_time()?.into());
        if let Some(postprocess) = self.postprocess.as_mut() {
            postprocess(&mut entry);
        }
        self.log.push(entry);

        if let Some(template) = &self.log_name {
            let name = persistence::render_filename(template, trainer.iteration(), trainer.epoch());
            persistence::atomic_write_json(&trainer.out().join(name), &self.log)?;
        }
        debug!(
            iteration = trainer.iteration(),
            rows = self.log.len(),
            "log report flushed"
        );

        self.summary = DictSummary::new();
        Ok(())
    }
}

impl<U: Updater> Extension<U> for LogReport {
    fn execute(&mut self, trainer: &mut Trainer<U>) -> Result<()> {
        self.accumulate(trainer)?;
        if self.trigger.fires(&trainer.trigger_context())? {
            self.flush(trainer)?;
        }
        Ok(())
    }

    fn state(&self) -> serde_json::Value {
        serde_json::to_value(LogReportState {
            log: self.log.clone(),
            summary: self.summary.clone(),
            trigger: self.trigger.state(),
        })
        .unwrap_or(serde_json::Value::Null)
    }

    fn load_state(&mut self, state: serde_json::Value) -> Result<()> {
        if state.is_null() {
            return Ok(());
        }
        let state: LogReportState = serde_json::from_value(state)?;
        self.trigger.load_state(state.trigger)?;
        self.log = state.log;
        self.summary = state.summary;
        Ok(())
    }
}
