//! The training loop.
//!
//! A [`Trainer`] owns the updater, the reporter, one [`DataIterator`] per
//! named loader and the registered extensions. [`Trainer::run`] drives the
//! loop until the stop trigger fires or the training data runs out, then
//! finalizes every extension no matter how the loop ended.

use std::any::Any;
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::{KarasError, Result};
use crate::extension::{ExtendOptions, Extension};
use crate::iterator::{DataIterator, DataLoader, IteratorState};
use crate::persistence;
use crate::reporter::{Observation, Reporter};
use crate::trigger::{Trigger, TriggerContext};
use crate::updater::Updater;

/// Name of the mandatory training loader.
pub const TRAIN: &str = "train";

/// Data loaders keyed by split name.
pub type Loaders<B> = BTreeMap<String, Arc<dyn DataLoader<Batch = B>>>;

/// What [`Trainer::run`] does with a failure raised inside the loop.
///
/// Extensions are finalized in both cases. Configuration errors are always
/// returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Log the failure and end training normally.
    #[default]
    Contain,
    /// Return the failure to the caller.
    Propagate,
}

struct ExtensionEntry<U: Updater> {
    name: String,
    priority: i32,
    trigger: Box<dyn Trigger>,
    // Taken out while the extension runs so it can borrow the trainer.
    extension: Option<Box<dyn Extension<U>>>,
}

/// Snapshot record of one registered extension.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtensionRecord {
    #[serde(default)]
    pub trigger: serde_json::Value,
    #[serde(default)]
    pub state: serde_json::Value,
}

/// Everything needed to continue a run as if it had never stopped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerState {
    pub iterators: BTreeMap<String, IteratorState>,
    pub observation: Observation,
    pub elapsed_time: f64,
    #[serde(default)]
    pub stop_trigger: serde_json::Value,
    #[serde(default)]
    pub updater: serde_json::Value,
    #[serde(default)]
    pub extensions: BTreeMap<String, ExtensionRecord>,
}

/// Mutable views of the trainer's parts that extensions often need at once.
pub struct TrainerParts<'a, U: Updater> {
    pub updater: &'a mut U,
    pub reporter: &'a mut Reporter,
    /// Every iterator except the training one.
    pub iterators: &'a mut BTreeMap<String, DataIterator<U::Batch>>,
}

pub struct Trainer<U: Updater> {
    updater: U,
    reporter: Reporter,
    stop_trigger: Box<dyn Trigger>,
    loaders: Loaders<U::Batch>,
    train: DataIterator<U::Batch>,
    iterators: BTreeMap<String, DataIterator<U::Batch>>,
    extensions: Vec<ExtensionEntry<U>>,
    out: PathBuf,
    failure_policy: FailurePolicy,
    done: bool,
    start_at: Option<Instant>,
    snapshot_elapsed: f64,
    final_elapsed: Option<f64>,
}

impl<U: Updater> Trainer<U> {
    /// The `train` loader is mandatory and its iterator repeats; every other
    /// loader gets a single-pass iterator.
    pub fn new(
        updater: U,
        stop_trigger: impl Trigger + 'static,
        loaders: Loaders<U::Batch>,
        out: impl Into<PathBuf>,
    ) -> Result<Self> {
        let train_loader = loaders
            .get(TRAIN)
            .ok_or_else(|| KarasError::config("loaders have no 'train' entry"))?;
        let train = DataIterator::new(Arc::clone(train_loader), true)?;

        let mut iterators = BTreeMap::new();
        for (name, loader) in loaders.iter().filter(|(name, _)| name.as_str() != TRAIN) {
            iterators.insert(name.clone(), DataIterator::new(Arc::clone(loader), false)?);
        }

        Ok(Self {
            updater,
            reporter: Reporter::new(),
            stop_trigger: Box::new(stop_trigger),
            loaders,
            train,
            iterators,
            extensions: Vec::new(),
            out: out.into(),
            failure_policy: FailurePolicy::default(),
            done: false,
            start_at: None,
            snapshot_elapsed: 0.0,
            final_elapsed: None,
        })
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn set_failure_policy(&mut self, policy: FailurePolicy) {
        self.failure_policy = policy;
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    /// Register an extension and return the name it was stored under.
    ///
    /// A name that is already taken gets the first free `_1`, `_2`, …
    /// suffix; existing registrations are never replaced.
    pub fn extend(&mut self, extension: impl Extension<U>, options: ExtendOptions) -> String {
        let base = options.name.unwrap_or_else(|| extension.default_name());
        let mut name = base.clone();
        let mut ordinal = 0;
        while self.extensions.iter().any(|entry| entry.name == name) {
            ordinal += 1;
            name = format!("{base}_{ordinal}");
        }

        let trigger = options
            .trigger
            .unwrap_or_else(|| extension.default_trigger());
        let priority = options
            .priority
            .unwrap_or_else(|| extension.default_priority());
        debug!(extension = %name, priority, "registered extension");

        self.extensions.push(ExtensionEntry {
            name: name.clone(),
            priority,
            trigger,
            extension: Some(Box::new(extension)),
        });
        name
    }

    /// Run the loop to completion. Can be called once per trainer; load a
    /// snapshot to continue a finished run in a fresh trainer.
    pub fn run(&mut self) -> Result<()> {
        if self.done {
            return Err(KarasError::config("trainer has already finished"));
        }
        fs::create_dir_all(&self.out)?;

        // Stable: equal priorities keep registration order.
        self.extensions.sort_by_key(|entry| Reverse(entry.priority));
        info!(
            out = %self.out.display(),
            extensions = self.extensions.len(),
            iteration = self.train.iteration(),
            "starting training"
        );

        let mut outcome = self.initialize_extensions();
        self.start_at = Some(Instant::now());
        if outcome.is_ok() {
            outcome = self.train_loop();
        }
        if let Err(err) = &outcome {
            error!(
                error = %err,
                iteration = self.train.iteration(),
                "training loop failed, finalizing extensions"
            );
        }

        self.finalize_extensions();
        self.final_elapsed = Some(self.running_elapsed());
        self.done = true;
        info!(
            iteration = self.train.iteration(),
            epoch = self.train.epoch(),
            elapsed_time = self.final_elapsed,
            "training finished"
        );

        match outcome {
            Err(err) if err.is_config() || self.failure_policy == FailurePolicy::Propagate => {
                Err(err)
            }
            _ => Ok(()),
        }
    }

    fn train_loop(&mut self) -> Result<()> {
        loop {
            let ctx = TriggerContext::new(&self.train, self.reporter.observation());
            if self.stop_trigger.fires(&ctx)? || !self.train.has_next() {
                return Ok(());
            }

            let batch = self.train.advance()?;

            let token = self.reporter.push_scope("train");
            let result = self.updater.update(batch, &mut self.reporter);
            self.reporter.pop_scope(token);
            result?;

            let token = self.reporter.push_scope("test");
            let result = self.run_extensions();
            self.reporter.pop_scope(token);
            result?;
        }
    }

    fn run_extensions(&mut self) -> Result<()> {
        for index in 0..self.extensions.len() {
            let entry = &mut self.extensions[index];
            let ctx = TriggerContext::new(&self.train, self.reporter.observation());
            let fired = entry
                .trigger
                .fires(&ctx)
                .map_err(|err| KarasError::extension(entry.name.clone(), err))?;
            if fired {
                self.with_extension(index, |extension, trainer| extension.execute(trainer))?;
            }
        }
        Ok(())
    }

    fn initialize_extensions(&mut self) -> Result<()> {
        for index in 0..self.extensions.len() {
            let token = self.reporter.push_scope("test");
            let result =
                self.with_extension(index, |extension, trainer| extension.initialize(trainer));
            self.reporter.pop_scope(token);
            result?;
        }
        Ok(())
    }

    fn finalize_extensions(&mut self) {
        for index in 0..self.extensions.len() {
            if let Err(err) =
                self.with_extension(index, |extension, trainer| extension.finalize(trainer))
            {
                warn!(error = %err, "extension finalize failed");
            }
        }
    }

    fn with_extension<F>(&mut self, index: usize, f: F) -> Result<()>
    where
        F: FnOnce(&mut dyn Extension<U>, &mut Self) -> Result<()>,
    {
        let name = self.extensions[index].name.clone();
        let Some(mut extension) = self.extensions[index].extension.take() else {
            return Err(KarasError::config(format!(
                "extension '{name}' is already running"
            )));
        };
        let result = f(extension.as_mut(), self);
        self.extensions[index].extension = Some(extension);
        result.map_err(|err| {
            if err.is_config() {
                err
            } else {
                KarasError::extension(name, err)
            }
        })
    }

    /// Seconds spent training, including time carried over from a snapshot.
    ///
    /// Frozen once the run is finished; an error before `run` starts.
    pub fn elapsed_time(&self) -> Result<f64> {
        if let Some(elapsed) = self.final_elapsed {
            return Ok(elapsed);
        }
        if self.start_at.is_none() {
            return Err(KarasError::NotStarted);
        }
        Ok(self.running_elapsed())
    }

    fn running_elapsed(&self) -> f64 {
        self.start_at
            .map_or(0.0, |start| start.elapsed().as_secs_f64())
            + self.snapshot_elapsed
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn iteration(&self) -> u64 {
        self.train.iteration()
    }

    pub fn epoch(&self) -> u64 {
        self.train.epoch()
    }

    pub fn epoch_detail(&self) -> f64 {
        self.train.epoch_detail()
    }

    pub fn previous_epoch_detail(&self) -> Option<f64> {
        self.train.previous_epoch_detail()
    }

    pub fn position(&self) -> usize {
        self.train.position()
    }

    /// Progress of the training iterator with the current observations.
    pub fn trigger_context(&self) -> TriggerContext<'_> {
        TriggerContext::new(&self.train, self.reporter.observation())
    }

    pub fn updater(&self) -> &U {
        &self.updater
    }

    pub fn updater_mut(&mut self) -> &mut U {
        &mut self.updater
    }

    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    pub fn reporter_mut(&mut self) -> &mut Reporter {
        &mut self.reporter
    }

    pub fn observation(&self) -> &Observation {
        self.reporter.observation()
    }

    pub fn out(&self) -> &Path {
        &self.out
    }

    pub fn stop_trigger(&self) -> &dyn Trigger {
        self.stop_trigger.as_ref()
    }

    pub fn loader(&self, name: &str) -> Result<Arc<dyn DataLoader<Batch = U::Batch>>> {
        self.loaders
            .get(name)
            .map(Arc::clone)
            .ok_or_else(|| KarasError::not_found(format!("loader '{name}'")))
    }

    pub fn iterator(&self, name: &str) -> Result<&DataIterator<U::Batch>> {
        if name == TRAIN {
            return Ok(&self.train);
        }
        self.iterators
            .get(name)
            .ok_or_else(|| KarasError::not_found(format!("iterator '{name}'")))
    }

    pub fn iterator_mut(&mut self, name: &str) -> Result<&mut DataIterator<U::Batch>> {
        if name == TRAIN {
            return Ok(&mut self.train);
        }
        self.iterators
            .get_mut(name)
            .ok_or_else(|| KarasError::not_found(format!("iterator '{name}'")))
    }

    /// Split borrows of the updater, reporter and evaluation iterators.
    pub fn parts_mut(&mut self) -> TrainerParts<'_, U> {
        TrainerParts {
            updater: &mut self.updater,
            reporter: &mut self.reporter,
            iterators: &mut self.iterators,
        }
    }

    /// Registered names; in execution order once `run` has started.
    pub fn extension_names(&self) -> impl Iterator<Item = &str> {
        self.extensions.iter().map(|entry| entry.name.as_str())
    }

    pub fn get_extension(&self, name: &str) -> Result<&dyn Extension<U>> {
        let entry = self
            .extensions
            .iter()
            .find(|entry| entry.name == name)
            .ok_or_else(|| KarasError::not_found(format!("extension '{name}'")))?;
        entry.extension.as_deref().ok_or_else(|| {
            KarasError::config(format!("extension '{name}' is running and cannot be borrowed"))
        })
    }

    pub fn get_extension_mut(&mut self, name: &str) -> Result<&mut dyn Extension<U>> {
        let entry = self
            .extensions
            .iter_mut()
            .find(|entry| entry.name == name)
            .ok_or_else(|| KarasError::not_found(format!("extension '{name}'")))?;
        match entry.extension.as_deref_mut() {
            Some(extension) => Ok(extension),
            None => Err(KarasError::config(format!(
                "extension '{name}' is running and cannot be borrowed"
            ))),
        }
    }

    /// Look up a registered extension by name and concrete type.
    pub fn extension<T: Extension<U>>(&self, name: &str) -> Result<&T> {
        let extension: &dyn Any = self.get_extension(name)?;
        extension.downcast_ref::<T>().ok_or_else(|| {
            KarasError::config(format!(
                "extension '{name}' is not a {}",
                std::any::type_name::<T>()
            ))
        })
    }

    pub fn extension_mut<T: Extension<U>>(&mut self, name: &str) -> Result<&mut T> {
        let extension: &mut dyn Any = self.get_extension_mut(name)?;
        extension.downcast_mut::<T>().ok_or_else(|| {
            KarasError::config(format!(
                "extension '{name}' is not a {}",
                std::any::type_name::<T>()
            ))
        })
    }

    pub fn state(&self) -> Result<TrainerState> {
        let mut iterators = BTreeMap::new();
        iterators.insert(TRAIN.to_string(), self.train.state());
        for (name, iterator) in &self.iterators {
            iterators.insert(name.clone(), iterator.state());
        }

        let extensions = self
            .extensions
            .iter()
            .map(|entry| {
                let record = ExtensionRecord {
                    trigger: entry.trigger.state(),
                    state: entry
                        .extension
                        .as_ref()
                        .map_or(serde_json::Value::Null, |extension| extension.state()),
                };
                (entry.name.clone(), record)
            })
            .collect();

        Ok(TrainerState {
            iterators,
            observation: self.reporter.state(),
            elapsed_time: self.elapsed_time().unwrap_or(self.snapshot_elapsed),
            stop_trigger: self.stop_trigger.state(),
            updater: self.updater.state()?,
            extensions,
        })
    }

    /// Restore a snapshot into this trainer. Every iterator and extension
    /// named in `state` must exist here; extensions are matched by their
    /// registered name. The trainer can be run again afterwards.
    pub fn load_state(&mut self, mut state: TrainerState) -> Result<()> {
        for name in state.iterators.keys() {
            if name != TRAIN && !self.iterators.contains_key(name) {
                return Err(KarasError::snapshot(format!(
                    "snapshot has unknown iterator '{name}'"
                )));
            }
        }
        for name in state.extensions.keys() {
            if !self.extensions.iter().any(|entry| &entry.name == name) {
                return Err(KarasError::snapshot(format!(
                    "snapshot has unknown extension '{name}'"
                )));
            }
        }

        for (name, iterator_state) in state.iterators {
            match self.iterators.get_mut(&name) {
                Some(iterator) => iterator.load_state(iterator_state)?,
                None => self.train.load_state(iterator_state)?,
            }
        }
        self.reporter.load_state(state.observation);
        self.stop_trigger.load_state(state.stop_trigger)?;
        self.updater.load_state(state.updater)?;

        for entry in &mut self.extensions {
            let Some(record) = state.extensions.remove(&entry.name) else {
                continue;
            };
            entry.trigger.load_state(record.trigger)?;
            if let Some(extension) = entry.extension.as_mut() {
                extension.load_state(record.state)?;
            }
        }

        self.snapshot_elapsed = state.elapsed_time;
        self.start_at = None;
        self.final_elapsed = None;
        self.done = false;
        info!(
            iteration = self.train.iteration(),
            elapsed_time = self.snapshot_elapsed,
            "restored trainer state"
        );
        Ok(())
    }

    /// Write the whole trainer state to `path` atomically.
    pub fn save_snapshot(&self, path: &Path) -> Result<()> {
        persistence::atomic_write_json(path, &self.state()?)?;
        info!(path = %path.display(), iteration = self.train.iteration(), "snapshot written");
        Ok(())
    }

    /// Load a snapshot written by [`save_snapshot`](Self::save_snapshot) or
    /// the [`Snapshot`](crate::extension::Snapshot) extension.
    pub fn resume(&mut self, path: &Path) -> Result<()> {
        let state: TrainerState = persistence::load_json(path)?.ok_or_else(|| {
            KarasError::snapshot(format!("no snapshot at {}", path.display()))
        })?;
        self.load_state(state)
    }
}


#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::test_support::{CountingUpdater, loaders};
    use super::*;
    use crate::extension::{PRIORITY_EDITOR, PRIORITY_WRITER};
    use crate::trigger::IntervalTrigger;

    type Calls = Rc<RefCell<Vec<String>>>;

    /// Records `(label, iteration)` on every call.
    struct Probe {
        label: &'static str,
        calls: Calls,
        fail: bool,
    }

    impl Probe {
        fn new(label: &'static str, calls: &Calls) -> Self {
            Self {
                label,
                calls: Rc::clone(calls),
                fail: false,
            }
        }
    }

    impl Extension<CountingUpdater> for Probe {
        fn initialize(&mut self, trainer: &mut Trainer<CountingUpdater>) -> Result<()> {
            assert_eq!(trainer.reporter().namespace(), "test");
            self.calls.borrow_mut().push(format!("init:{}", self.label));
            Ok(())
        }

        fn execute(&mut self, trainer: &mut Trainer<CountingUpdater>) -> Result<()> {
            self.calls
                .borrow_mut()
                .push(format!("{}@{}", self.label, trainer.iteration()));
            if self.fail {
                return Err(KarasError::step("extension failure"));
            }
            Ok(())
        }

        fn finalize(&mut self, _trainer: &mut Trainer<CountingUpdater>) -> Result<()> {
            self.calls.borrow_mut().push(format!("fin:{}", self.label));
            Ok(())
        }
    }

    fn trainer(stop: u64, out: &Path) -> Trainer<CountingUpdater> {
        Trainer::new(
            CountingUpdater::new(),
            IntervalTrigger::iterations(stop).unwrap(),
            loaders(vec![1.0, 2.0, 3.0, 4.0]),
            out,
        )
        .unwrap()
    }

    #[test]
    fn test_missing_train_loader() {
        let err = Trainer::new(
            CountingUpdater::new(),
            IntervalTrigger::every_epoch(),
            Loaders::new(),
            "out",
        )
        .err()
        .unwrap();
        assert!(err.is_config());
    }

    #[test]
    fn test_runs_until_stop_trigger() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = trainer(6, dir.path());
        t.run().unwrap();
        assert!(t.is_done());
        assert_eq!(t.iteration(), 6);
        assert_eq!(t.updater().steps, 6);
        assert_eq!(t.epoch(), 1);
        assert_eq!(t.reporter().namespace(), "");
        assert!(t.observation().contains_key("train/scalar/loss"));
    }

    #[test]
    fn test_elapsed_time_before_run() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = trainer(1, dir.path());
        assert!(matches!(t.elapsed_time(), Err(KarasError::NotStarted)));
        t.run().unwrap();
        let frozen = t.elapsed_time().unwrap();
        assert_eq!(t.elapsed_time().unwrap(), frozen);
    }

    #[test]
    fn test_run_twice_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = trainer(2, dir.path());
        t.run().unwrap();
        assert!(t.run().unwrap_err().is_config());
    }

    #[test]
    fn test_priority_order_and_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Calls::default();
        let mut t = trainer(2, dir.path());
        t.extend(Probe::new("reader", &calls), ExtendOptions::new().name("reader"));
        t.extend(
            Probe::new("writer", &calls),
            ExtendOptions::new().name("writer").priority(PRIORITY_WRITER),
        );
        t.extend(
            Probe::new("editor", &calls),
            ExtendOptions::new().name("editor").priority(PRIORITY_EDITOR),
        );
        t.run().unwrap();

        let expected = [
            "init:writer",
            "init:editor",
            "init:reader",
            "writer@1",
            "editor@1",
            "reader@1",
            "writer@2",
            "editor@2",
            "reader@2",
            "fin:writer",
            "fin:editor",
            "fin:reader",
        ];
        assert_eq!(*calls.borrow(), expected);
    }

    #[test]
    fn test_name_collisions_get_suffixes() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Calls::default();
        let mut t = trainer(1, dir.path());
        assert_eq!(t.extend(Probe::new("a", &calls), ExtendOptions::new()), "Probe");
        assert_eq!(t.extend(Probe::new("b", &calls), ExtendOptions::new()), "Probe_1");
        assert_eq!(t.extend(Probe::new("c", &calls), ExtendOptions::new()), "Probe_2");
        assert_eq!(t.extension::<Probe>("Probe_1").unwrap().label, "b");
    }

    #[test]
    fn test_extension_trigger_gates_execution() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Calls::default();
        let mut t = trainer(6, dir.path());
        t.extend(
            Probe::new("p", &calls),
            ExtendOptions::new().trigger(IntervalTrigger::iterations(3).unwrap()),
        );
        t.run().unwrap();
        let executed: Vec<_> = calls
            .borrow()
            .iter()
            .filter(|c| c.starts_with("p@"))
            .cloned()
            .collect();
        assert_eq!(executed, ["p@3", "p@6"]);
    }

    #[test]
    fn test_unknown_extension_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let t = trainer(1, dir.path());
        assert!(matches!(
            t.get_extension("missing"),
            Err(KarasError::NotFound(_))
        ));
    }

    #[test]
    fn test_wrong_extension_type() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Calls::default();
        let mut t = trainer(1, dir.path());
        t.extend(Probe::new("a", &calls), ExtendOptions::new());
        let err = t
            .extension::<crate::extension::LogReport>("Probe")
            .err()
            .unwrap();
        assert!(err.is_config());
    }

    #[test]
    fn test_contained_failure_still_finalizes() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Calls::default();
        let mut t = trainer(10, dir.path());
        let mut failing = Probe::new("bad", &calls);
        failing.fail = true;
        t.extend(failing, ExtendOptions::new());
        t.run().unwrap();
        assert_eq!(t.iteration(), 1);
        assert_eq!(*calls.borrow(), ["init:bad", "bad@1", "fin:bad"]);
    }

    #[test]
    fn test_propagated_failure_still_finalizes() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Calls::default();
        let mut t = trainer(10, dir.path()).with_failure_policy(FailurePolicy::Propagate);
        t.updater_mut().fail_at = Some(3);
        t.extend(Probe::new("p", &calls), ExtendOptions::new());
        let err = t.run().unwrap_err();
        assert!(matches!(err, KarasError::Step(_)));
        assert!(calls.borrow().last().unwrap() == "fin:p");
        assert!(t.is_done());
        assert_eq!(t.reporter().namespace(), "");
    }

    #[test]
    fn test_state_rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Calls::default();
        let mut source = trainer(1, dir.path());
        source.extend(Probe::new("a", &calls), ExtendOptions::new().name("extra"));
        let state = source.state().unwrap();

        let mut target = trainer(1, dir.path());
        assert!(matches!(
            target.load_state(state),
            Err(KarasError::Snapshot(_))
        ));
    }

    #[test]
    fn test_snapshot_roundtrip_restores_progress() {
        let dir = tempfile::tempdir().unwrap();
        let mut first = trainer(5, dir.path());
        first.run().unwrap();
        let path = dir.path().join("trainer.json");
        first.save_snapshot(&path).unwrap();

        let mut second = trainer(7, dir.path());
        second.resume(&path).unwrap();
        assert_eq!(second.iteration(), 5);
        assert!(second.observation().contains_key("train/scalar/loss"));
        second.run().unwrap();
        assert_eq!(second.iteration(), 7);
        assert_eq!(second.updater().steps, 2);
        assert!(second.elapsed_time().unwrap() >= first.elapsed_time().unwrap());
    }

    #[test]
    fn test_resume_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = trainer(1, dir.path());
        assert!(matches!(
            t.resume(&dir.path().join("nope.json")),
            Err(KarasError::Snapshot(_))
        ));
    }
}
