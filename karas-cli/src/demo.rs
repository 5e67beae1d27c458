//! Self-contained demonstration job: logistic regression on two seeded
//! point clouds, trained with every built-in extension.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Context;
use karas_core::extension::{ExtendOptions, LrScheduler, StepLr};
use karas_core::reporter::{ArrayValue, Reporter};
use karas_core::updater::{Device, Evaluate, Mode, Optimizer, Sgd, Updater, UpdaterBase};
use karas_core::{Loaders, TRAIN, Trainer, TrainerConfig, VecLoader};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

const OPTIMIZER: &str = "main";

/// A labelled 2-D point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub x: [f64; 2],
    pub label: bool,
}

pub type Batch = Vec<Sample>;

/// Knobs of the demo data set and optimizer.
#[derive(Debug, Clone)]
pub struct DemoOptions {
    pub samples: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub momentum: f64,
    /// Learning rate is halved every `decay_every` epochs.
    pub decay_every: u64,
    pub seed: u64,
}

impl Default for DemoOptions {
    fn default() -> Self {
        Self {
            samples: 512,
            batch_size: 16,
            learning_rate: 0.5,
            momentum: 0.9,
            decay_every: 5,
            seed: 42,
        }
    }
}

/// Two noisy clusters centred on (-1, -1) and (1, 1), shuffled.
pub fn make_blobs(samples: usize, seed: u64) -> Vec<Sample> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut data: Vec<Sample> = (0..samples)
        .map(|i| {
            let label = i % 2 == 1;
            let centre = if label { 1.0 } else { -1.0 };
            let x = [
                centre + rng.gen_range(-1.2..1.2),
                centre + rng.gen_range(-1.2..1.2),
            ];
            Sample { x, label }
        })
        .collect();
    data.shuffle(&mut rng);
    data
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Binary logistic regression `p = sigmoid(w0*x0 + w1*x1 + b)`.
pub struct LogisticRegression {
    base: UpdaterBase,
    weights: Vec<f64>,
    mode: Mode,
    grad_enabled: bool,
}

#[derive(Serialize, Deserialize)]
struct ModelState {
    #[serde(with = "karas_core::persistence::float::vec")]
    weights: Vec<f64>,
    optimizers: serde_json::Value,
}

impl LogisticRegression {
    pub fn new(optimizer: impl Optimizer + 'static) -> Self {
        Self {
            base: UpdaterBase::single(Device::Cpu, OPTIMIZER, optimizer),
            weights: vec![0.0; 3],
            mode: Mode::Train,
            grad_enabled: true,
        }
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    fn predict(&self, sample: &Sample) -> f64 {
        let [w0, w1, b] = [self.weights[0], self.weights[1], self.weights[2]];
        sigmoid(w0 * sample.x[0] + w1 * sample.x[1] + b)
    }
}

impl Updater for LogisticRegression {
    type Batch = Batch;

    fn update(&mut self, batch: Batch, reporter: &mut Reporter) -> karas_core::Result<()> {
        if batch.is_empty() {
            return Err(karas_core::KarasError::step("empty batch"));
        }
        let n = batch.len() as f64;
        let mut grads = vec![0.0; 3];
        let mut loss = 0.0;
        let mut correct = 0usize;
        for sample in &batch {
            let p = self.predict(sample).clamp(1e-12, 1.0 - 1e-12);
            let y = if sample.label { 1.0 } else { 0.0 };
            loss -= y * p.ln() + (1.0 - y) * (1.0 - p).ln();
            if (p >= 0.5) == sample.label {
                correct += 1;
            }
            let err = p - y;
            grads[0] += err * sample.x[0] / n;
            grads[1] += err * sample.x[1] / n;
            grads[2] += err / n;
        }
        if !loss.is_finite() {
            return Err(karas_core::KarasError::step(format!("loss is {loss}")));
        }

        if self.mode == Mode::Train && self.grad_enabled {
            self.base
                .optimizer_mut(OPTIMIZER)?
                .step(&mut self.weights, &grads);
        }

        let mut scalar = reporter.scope("scalar");
        scalar.report_value("loss", loss / n);
        scalar.report_value("accuracy", correct as f64 / n);
        drop(scalar);
        let weights = self.weights.iter().map(|&w| w as f32).collect();
        reporter
            .scope("images")
            .report_value("weights", ArrayValue::new(vec![1, 3], weights)?);
        Ok(())
    }

    fn base(&self) -> &UpdaterBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut UpdaterBase {
        &mut self.base
    }

    fn state(&self) -> karas_core::Result<serde_json::Value> {
        Ok(serde_json::to_value(ModelState {
            weights: self.weights.clone(),
            optimizers: self.base.state()?,
        })?)
    }

    fn load_state(&mut self, state: serde_json::Value) -> karas_core::Result<()> {
        if state.is_null() {
            return Ok(());
        }
        let state: ModelState = serde_json::from_value(state)?;
        if state.weights.len() != self.weights.len() {
            return Err(karas_core::KarasError::snapshot(format!(
                "expected {} weights, snapshot has {}",
                self.weights.len(),
                state.weights.len()
            )));
        }
        self.weights = state.weights;
        self.base.load_state(state.optimizers)
    }
}

impl Evaluate for LogisticRegression {
    fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    fn set_grad_enabled(&mut self, enabled: bool) {
        self.grad_enabled = enabled;
    }

    fn count_matches(&mut self, batch: &Batch) -> karas_core::Result<(usize, usize)> {
        let correct = batch
            .iter()
            .filter(|sample| (self.predict(sample) >= 0.5) == sample.label)
            .count();
        Ok((correct, batch.len()))
    }
}

/// Train on the first 80% of the blobs, evaluate on the rest.
fn loaders(options: &DemoOptions) -> anyhow::Result<Loaders<Batch>> {
    let mut data = make_blobs(options.samples, options.seed);
    let test = data.split_off(data.len() * 4 / 5);
    let mut loaders: Loaders<Batch> = BTreeMap::new();
    loaders.insert(
        TRAIN.to_string(),
        Arc::new(VecLoader::from_samples(data, options.batch_size)?),
    );
    loaders.insert(
        "test".to_string(),
        Arc::new(VecLoader::from_samples(test, options.batch_size)?),
    );
    Ok(loaders)
}

/// Build the demo trainer with the extensions `config` asks for plus a
/// step learning-rate schedule.
pub fn build_trainer(
    config: &TrainerConfig,
    options: &DemoOptions,
) -> anyhow::Result<Trainer<LogisticRegression>> {
    let model = LogisticRegression::new(
        Sgd::new(options.learning_rate).with_momentum(options.momentum),
    );
    let mut trainer = Trainer::new(
        model,
        config.stop_trigger()?,
        loaders(options)?,
        &config.out,
    )
    .context("failed to set up the trainer")?;

    config.install(&mut trainer)?;
    config.install_evaluator(&mut trainer)?;
    trainer.extend(
        LrScheduler::new(OPTIMIZER, StepLr::new(options.decay_every, 0.5)?),
        ExtendOptions::new(),
    );
    Ok(trainer)
}
