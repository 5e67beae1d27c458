//! The update-step collaborator driven by the trainer.
//!
//! An [`Updater`] owns the model and its optimizers. The trainer hands it
//! one batch per iteration together with the reporter, inside the `train`
//! scope, and never looks at the model itself.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{KarasError, Result};
use crate::reporter::Reporter;

/// Whether a model behaves as in training or as in inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Train,
    Eval,
}

/// Compute device an updater is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    #[default]
    Cpu,
    Cuda(usize),
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => f.write_str("cpu"),
            Device::Cuda(index) => write!(f, "cuda:{index}"),
        }
    }
}

/// A first-order optimizer over flat host-memory parameters.
///
/// The training loop itself only reads and writes the learning rate;
/// updaters call [`step`](Self::step).
pub trait Optimizer {
    fn learning_rate(&self) -> f64;

    fn set_learning_rate(&mut self, learning_rate: f64);

    /// Apply one update to `params` given their gradients.
    fn step(&mut self, params: &mut [f64], grads: &[f64]);

    /// Plain record of any additional optimizer state (e.g. momentum buffers).
    fn state(&self) -> serde_json::Value {
        serde_json::Value::Null
    }

    fn load_state(&mut self, _state: serde_json::Value) -> Result<()> {
        Ok(())
    }
}

/// Plain stochastic gradient descent with optional momentum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sgd {
    pub learning_rate: f64,
    pub momentum: f64,
    #[serde(default, with = "crate::persistence::float::vec")]
    velocity: Vec<f64>,
}

impl Sgd {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            momentum: 0.0,
            velocity: Vec::new(),
        }
    }

    pub fn with_momentum(mut self, momentum: f64) -> Self {
        self.momentum = momentum;
        self
    }
}

impl Optimizer for Sgd {
    fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, learning_rate: f64) {
        self.learning_rate = learning_rate;
    }

    fn step(&mut self, params: &mut [f64], grads: &[f64]) {
        if self.velocity.len() != params.len() {
            self.velocity = vec![0.0; params.len()];
        }
        for ((p, g), v) in params.iter_mut().zip(grads).zip(&mut self.velocity) {
            *v = self.momentum * *v + g;
            *p -= self.learning_rate * *v;
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

/// Device assignment and named optimizers shared by every updater.
pub struct UpdaterBase {
    device: Device,
    optimizers: BTreeMap<String, Box<dyn Optimizer>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OptimizerRecord {
    learning_rate: f64,
    #[serde(default)]
    state: serde_json::Value,
}

impl UpdaterBase {
    /// Fails with a configuration error when `optimizers` is empty.
    pub fn new(device: Device, optimizers: BTreeMap<String, Box<dyn Optimizer>>) -> Result<Self> {
        if optimizers.is_empty() {
            return Err(KarasError::config("an updater needs at least one optimizer"));
        }
        Ok(Self { device, optimizers })
    }

    /// Convenience for the common single-optimizer case.
    pub fn single(device: Device, name: &str, optimizer: impl Optimizer + 'static) -> Self {
        let mut optimizers: BTreeMap<String, Box<dyn Optimizer>> = BTreeMap::new();
        optimizers.insert(name.to_string(), Box::new(optimizer));
        Self { device, optimizers }
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn optimizer(&self, name: &str) -> Result<&dyn Optimizer> {
        self.optimizers
            .get(name)
            .map(|opt| opt.as_ref())
            .ok_or_else(|| KarasError::not_found(format!("optimizer '{name}'")))
    }

    pub fn optimizer_mut(&mut self, name: &str) -> Result<&mut (dyn Optimizer + 'static)> {
        self.optimizers
            .get_mut(name)
            .map(|opt| opt.as_mut())
            .ok_or_else(|| KarasError::not_found(format!("optimizer '{name}'")))
    }

    pub fn optimizers(&self) -> impl Iterator<Item = (&str, &dyn Optimizer)> {
        self.optimizers
            .iter()
            .map(|(name, opt)| (name.as_str(), opt.as_ref()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.optimizers.keys().map(String::as_str)
    }

    /// Learning rate and extra state of every optimizer, keyed by name.
    pub fn state(&self) -> Result<serde_json::Value> {
        let records: BTreeMap<&str, OptimizerRecord> = self
            .optimizers
            .iter()
            .map(|(name, opt)| {
                let record = OptimizerRecord {
                    learning_rate: opt.learning_rate(),
                    state: opt.state(),
                };
                (name.as_str(), record)
            })
            .collect();
        Ok(serde_json::to_value(records)?)
    }

    pub fn load_state(&mut self, state: serde_json::Value) -> Result<()> {
        if state.is_null() {
            return Ok(());
        }
        let records: BTreeMap<String, OptimizerRecord> = serde_json::from_value(state)?;
        for (name, record) in records {
            let opt = self.optimizers.get_mut(&name).ok_or_else(|| {
                KarasError::snapshot(format!("snapshot has unknown optimizer '{name}'"))
            })?;
            opt.load_state(record.state)?;
            opt.set_learning_rate(record.learning_rate);
        }
        Ok(())
    }
}

impl fmt::Debug for UpdaterBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdaterBase")
            .field("device", &self.device)
            .field("optimizers", &self.optimizers.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Performs one optimization step per batch.
pub trait Updater: 'static {
    type Batch: 'static;

    /// Run forward, backward and optimizer step on `batch`, reporting any
    /// observations through `reporter` (already scoped to `train`).
    fn update(&mut self, batch: Self::Batch, reporter: &mut Reporter) -> Result<()>;

    fn base(&self) -> &UpdaterBase;

    fn base_mut(&mut self) -> &mut UpdaterBase;

    fn device(&self) -> Device {
        self.base().device()
    }

    fn optimizer(&self, name: &str) -> Result<&dyn Optimizer> {
        self.base().optimizer(name)
    }

    fn optimizer_mut(&mut self, name: &str) -> Result<&mut (dyn Optimizer + 'static)> {
        self.base_mut().optimizer_mut(name)
    }

    /// Snapshot record. The default covers the optimizers only; updaters
    /// owning model parameters should extend it.
    fn state(&self) -> Result<serde_json::Value> {
        self.base().state()
    }

    fn load_state(&mut self, state: serde_json::Value) -> Result<()> {
        self.base_mut().load_state(state)
    }
}

/// An updater whose model can also be scored on held-out data.
pub trait Evaluate: Updater {
    /// Switch the model between training and inference behaviour.
    fn set_mode(&mut self, mode: Mode);

    fn set_grad_enabled(&mut self, _enabled: bool) {}

    /// Number of correct predictions and number of samples in `batch`.
    fn count_matches(&mut self, batch: &Self::Batch) -> Result<(usize, usize)>;
}
