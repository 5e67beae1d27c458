//! Layered trainer configuration.
//!
//! Uses `figment`: defaults -> user config file -> workspace `karas.toml` ->
//! `KARAS_` environment variables -> explicit overrides. The user file lives
//! at `~/.config/karas/config.toml` (platform equivalent via `directories`).

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::error::{KarasError, Result};
use crate::extension::{
    EventWriter, Evaluator, ExtendOptions, LogReport, LrObserver, PrintReport, Snapshot,
    SnapshotTarget,
};
use crate::trainer::{FailurePolicy, Trainer};
use crate::trigger::{IntervalTrigger, TriggerSpec, Unit};
use crate::updater::{Evaluate, Updater};

/// Name of the workspace-level configuration file.
pub const WORKSPACE_CONFIG: &str = "karas.toml";

/// Everything needed to set up a standard training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Output directory for logs, snapshots and events.
    pub out: PathBuf,
    /// When to stop training.
    pub stop: TriggerSpec,
    pub failure_policy: FailurePolicy,
    pub log: LogConfig,
    pub print: PrintConfig,
    pub snapshot: SnapshotConfig,
    pub evaluation: EvaluationConfig,
    pub events: EventConfig,
    /// Report optimizer learning rates every iteration.
    pub observe_lr: bool,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            out: PathBuf::from("result"),
            stop: TriggerSpec::new(20.0, Unit::Epoch),
            failure_policy: FailurePolicy::default(),
            log: LogConfig::default(),
            print: PrintConfig::default(),
            snapshot: SnapshotConfig::default(),
            evaluation: EvaluationConfig::default(),
            events: EventConfig::default(),
            observe_lr: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// When a log row is emitted.
    pub trigger: TriggerSpec,
    /// Keys to log; every observation when unset.
    pub keys: Option<Vec<String>>,
    /// File name under `out`; in-memory only when unset.
    pub file: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            trigger: TriggerSpec::new(1.0, Unit::Epoch),
            keys: None,
            file: Some("log".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrintConfig {
    pub enabled: bool,
    pub entries: Vec<String>,
}

impl Default for PrintConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            entries: [
                "epoch",
                "iteration",
                "train/scalar/loss",
                "test/scalar/accuracy",
                "elapsed_time",
            ]
            .map(String::from)
            .to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    pub enabled: bool,
    pub trigger: TriggerSpec,
    /// May contain `{iteration}` and `{epoch}`.
    pub filename: String,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            trigger: TriggerSpec::new(1.0, Unit::Epoch),
            filename: "snapshot_iter_{iteration}.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    pub enabled: bool,
    pub trigger: TriggerSpec,
    /// Name of the held-out loader.
    pub loader: String,
    pub key: String,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            trigger: TriggerSpec::new(1.0, Unit::Epoch),
            loader: "test".to_string(),
            key: "accuracy".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    pub enabled: bool,
    pub file: PathBuf,
    pub keys: Option<Vec<String>>,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            file: PathBuf::from("events.jsonl"),
            keys: None,
        }
    }
}

impl TrainerConfig {
    pub fn stop_trigger(&self) -> Result<IntervalTrigger> {
        self.stop.build()
    }

    /// Check every trigger period without building anything else.
    pub fn validate(&self) -> Result<()> {
        for spec in [
            &self.stop,
            &self.log.trigger,
            &self.snapshot.trigger,
            &self.evaluation.trigger,
        ] {
            spec.build()?;
        }
        Ok(())
    }

    /// Register the configured reporting extensions on `trainer` and apply
    /// its failure policy. The snapshot is registered last. The evaluator is added by
    /// [`install_evaluator`](Self::install_evaluator).
    pub fn install<U: Updater>(&self, trainer: &mut Trainer<U>) -> Result<()> {
        trainer.set_failure_policy(self.failure_policy);

        let mut log = LogReport::new(self.log.trigger.build()?).log_name(self.log.file.as_deref());
        if let Some(keys) = &self.log.keys {
            log = log.keys(keys.iter().cloned());
        }
        trainer.extend(log, ExtendOptions::new());

        if self.observe_lr {
            trainer.extend(LrObserver, ExtendOptions::new());
        }
        if self.print.enabled {
            trainer.extend(
                PrintReport::new(self.print.entries.iter().cloned()),
                ExtendOptions::new(),
            );
        }
        if self.events.enabled {
            let mut events = EventWriter::new(self.events.file.clone());
            if let Some(keys) = &self.events.keys {
                events = events.keys(keys.iter().cloned());
            }
            trainer.extend(events, ExtendOptions::new());
        }
        // Last among the readers, so a snapshot taken at iteration k already
        // holds everything the other readers did at k.
        if self.snapshot.enabled {
            trainer.extend(
                Snapshot::new(SnapshotTarget::Trainer, self.snapshot.filename.clone()),
                ExtendOptions::new().trigger(self.snapshot.trigger.build()?),
            );
        }
        Ok(())
    }

    pub fn install_evaluator<U: Evaluate>(&self, trainer: &mut Trainer<U>) -> Result<()> {
        if self.evaluation.enabled {
            trainer.extend(
                Evaluator::new(self.evaluation.loader.clone()).key(self.evaluation.key.clone()),
                ExtendOptions::new().trigger(self.evaluation.trigger.build()?),
            );
        }
        Ok(())
    }
}

/// Path of the user-level config file, if a home directory is known.
pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "karas", "karas")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (`KARAS_STOP__PERIOD=5`, `KARAS_OUT=runs/a`, ...)
/// 3. Workspace config (`karas.toml`)
/// 4. User config (`~/.config/karas/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&TrainerConfig>,
) -> Result<TrainerConfig> {
    let mut figment = Figment::from(Serialized::defaults(TrainerConfig::default()));

    if let Some(user_config) = user_config_path().filter(|path| path.exists()) {
        figment = figment.merge(Toml::file(user_config));
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(WORKSPACE_CONFIG);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(ws_config));
        }
    }

    figment = figment.merge(Env::prefixed("KARAS_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    let config: TrainerConfig = figment
        .extract()
        .map_err(|e| KarasError::config(e.to_string()))?;
    config.validate()?;
    Ok(config)
}
