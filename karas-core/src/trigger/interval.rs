//! Fixed-period triggers over iterations or (fractional) epochs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{Trigger, TriggerContext};
use crate::error::{KarasError, Result};

/// Unit an interval is measured in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    Iteration,
    Epoch,
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::Iteration => f.write_str("iteration"),
            Unit::Epoch => f.write_str("epoch"),
        }
    }
}

/// Fires once every `period` iterations or epochs.
///
/// Iteration intervals fire on iterations `N, 2N, 3N, …`. Epoch intervals
/// fire whenever the epoch detail crosses a multiple of the period between
/// the previous and the current step, which allows sub-epoch periods such as
/// `0.5`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntervalTrigger {
    period: f64,
    unit: Unit,
}

impl IntervalTrigger {
    pub fn new(period: f64, unit: Unit) -> Result<Self> {
        if !(period.is_finite() && period > 0.0) {
            return Err(KarasError::config(format!(
                "interval period must be positive, got {period}"
            )));
        }
        if unit == Unit::Iteration && period.fract() != 0.0 {
            return Err(KarasError::config(format!(
                "iteration intervals must be whole numbers, got {period}"
            )));
        }
        Ok(Self { period, unit })
    }

    pub fn iterations(n: u64) -> Result<Self> {
        Self::new(n as f64, Unit::Iteration)
    }

    pub fn epochs(n: f64) -> Result<Self> {
        Self::new(n, Unit::Epoch)
    }

    pub const fn every_iteration() -> Self {
        Self::fixed(1.0, Unit::Iteration)
    }

    pub const fn every_epoch() -> Self {
        Self::fixed(1.0, Unit::Epoch)
    }

    // Callers guarantee a valid period.
    pub(crate) const fn fixed(period: f64, unit: Unit) -> Self {
        Self { period, unit }
    }

    pub fn period(&self) -> f64 {
        self.period
    }

    pub fn unit(&self) -> Unit {
        self.unit
    }

    /// Length of training this trigger describes when used as a stop trigger.
    pub fn training_length(&self) -> (f64, Unit) {
        (self.period, self.unit)
    }

    /// Stateless check against the given progress.
    pub fn check(&self, ctx: &TriggerContext<'_>) -> bool {
        match self.unit {
            Unit::Iteration => {
                let n = self.period as u64;
                ctx.iteration > 0 && ctx.iteration % n == 0
            }
            Unit::Epoch => match ctx.previous_epoch_detail {
                Some(previous) => {
                    self.periods_before(previous) != self.periods_before(ctx.epoch_detail)
                }
                None => false,
            },
        }
    }
}

impl IntervalTrigger {
    // Number of whole periods in `epoch_detail`. Quotients that land a hair
    // below an integer (0.3 / 0.1 == 2.9999999999999996) count as reaching it.
    fn periods_before(&self, epoch_detail: f64) -> f64 {
        (epoch_detail / self.period + EPOCH_EPSILON).floor()
    }
}

const EPOCH_EPSILON: f64 = 1e-9;

impl Trigger for IntervalTrigger {
    fn fires(&mut self, ctx: &TriggerContext<'_>) -> Result<bool> {
        Ok(self.check(ctx))
    }
}

/// Serializable description of an [`IntervalTrigger`], e.g. `10 epoch`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TriggerSpec {
    pub period: f64,
    pub unit: Unit,
}

impl TriggerSpec {
    pub fn new(period: f64, unit: Unit) -> Self {
        Self { period, unit }
    }

    pub fn build(&self) -> Result<IntervalTrigger> {
        IntervalTrigger::new(self.period, self.unit)
    }
}

impl TryFrom<TriggerSpec> for IntervalTrigger {
    type Error = KarasError;

    fn try_from(spec: TriggerSpec) -> Result<Self> {
        spec.build()
    }
}

impl From<IntervalTrigger> for TriggerSpec {
    fn from(trigger: IntervalTrigger) -> Self {
        Self::new(trigger.period, trigger.unit)
    }
}

impl fmt::Display for TriggerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.period, self.unit)
    }
}

impl FromStr for TriggerSpec {
    type Err = KarasError;

    /// Parses `"<period> <unit>"`, accepting plural units (`5 epochs`).
    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split_whitespace();
        let (Some(period), Some(unit), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(KarasError::config(format!(
                "expected '<period> <iteration|epoch>', got '{s}'"
            )));
        };
        let period: f64 = period
            .parse()
            .map_err(|_| KarasError::config(format!("invalid trigger period '{period}'")))?;
        let unit = match unit.trim_end_matches('s') {
            "iteration" => Unit::Iteration,
            "epoch" => Unit::Epoch,
            other => {
                return Err(KarasError::config(format!("unknown trigger unit '{other}'")));
            }
        };
        let spec = Self::new(period, unit);
        spec.build()?;
        Ok(spec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::Observation;
    use crate::trigger::test_support::context_at;

    fn firing_iterations(trigger: &mut IntervalTrigger, len: u64, steps: u64) -> Vec<u64> {
        let obs = Observation::new();
        (1..=steps)
            .filter(|&it| trigger.fires(&context_at(it, len, &obs)).unwrap())
            .collect()
    }

    #[test]
    fn test_iteration_interval() {
        let mut t = IntervalTrigger::iterations(3).unwrap();
        assert_eq!(firing_iterations(&mut t, 100, 10), vec![3, 6, 9]);
    }

    #[test]
    fn test_never_fires_at_start() {
        let obs = Observation::new();
        let mut it = IntervalTrigger::every_iteration();
        let mut ep = IntervalTrigger::every_epoch();
        assert!(!it.fires(&context_at(0, 5, &obs)).unwrap());
        assert!(!ep.fires(&context_at(0, 5, &obs)).unwrap());
    }

    #[test]
    fn test_epoch_interval() {
        let mut t = IntervalTrigger::epochs(2.0).unwrap();
        assert_eq!(firing_iterations(&mut t, 4, 20), vec![8, 16]);
    }

    #[test]
    fn test_fractional_epoch_interval() {
        let mut t = IntervalTrigger::epochs(0.5).unwrap();
        assert_eq!(firing_iterations(&mut t, 4, 8), vec![2, 4, 6, 8]);
    }

    #[test]
    fn test_tenth_epoch_interval_fires_every_batch() {
        let mut t = IntervalTrigger::epochs(0.1).unwrap();
        assert_eq!(firing_iterations(&mut t, 10, 30), (1..=30).collect::<Vec<_>>());

        let mut t = IntervalTrigger::epochs(0.3).unwrap();
        assert_eq!(firing_iterations(&mut t, 10, 20), vec![3, 6, 9, 12, 15, 18]);
    }

    #[test]
    fn test_invalid_periods() {
        assert!(IntervalTrigger::iterations(0).is_err());
        assert!(IntervalTrigger::epochs(-1.0).is_err());
        assert!(IntervalTrigger::new(1.5, Unit::Iteration).is_err());
        assert!(IntervalTrigger::epochs(f64::NAN).is_err());
    }

    #[test]
    fn test_spec_parse() {
        let spec: TriggerSpec = "100 iterations".parse().unwrap();
        assert_eq!(spec, TriggerSpec::new(100.0, Unit::Iteration));
        let spec: TriggerSpec = "0.5 epoch".parse().unwrap();
        assert_eq!(spec.build().unwrap().training_length(), (0.5, Unit::Epoch));
        assert!("ten epochs".parse::<TriggerSpec>().is_err());
        assert!("10 minutes".parse::<TriggerSpec>().is_err());
        assert!("10".parse::<TriggerSpec>().is_err());
    }

    #[test]
    fn test_spec_serde() {
        let spec: TriggerSpec = serde_json::from_str(r#"{"period": 1, "unit": "epoch"}"#).unwrap();
        assert_eq!(spec.to_string(), "1 epoch");
    }
}
