//! Fixed-width console table of the rows a [`LogReport`] has emitted.

use std::io::{self, Write};

use super::{Extension, LogReport};
use crate::error::{KarasError, Result};
use crate::trainer::Trainer;
use crate::updater::Updater;

const MIN_WIDTH: usize = 10;

enum LogSource {
    Named(String),
    Owned(LogReport),
}

/// Prints selected entries of each new log row.
///
/// Columns are at least ten characters wide; an entry missing from a row
/// is left blank. The header is printed once per run, and the count of
/// printed rows is not part of the snapshot, so a resumed run prints the
/// whole log again.
pub struct PrintReport {
    entries: Vec<String>,
    widths: Vec<usize>,
    source: LogSource,
    out: Box<dyn Write>,
    printed: usize,
    header_shown: bool,
}

impl PrintReport {
    /// Read the log of the extension registered as `LogReport`.
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entries: Vec<String> = entries.into_iter().map(Into::into).collect();
        let widths = entries.iter().map(|e| e.len().max(MIN_WIDTH)).collect();
        Self {
            entries,
            widths,
            source: LogSource::Named("LogReport".to_string()),
            out: Box::new(io::stdout()),
            printed: 0,
            header_shown: false,
        }
    }

    /// Read the log of the extension registered under `name`.
    pub fn log_report_name(mut self, name: impl Into<String>) -> Self {
        self.source = LogSource::Named(name.into());
        self
    }

    /// Drive a private [`LogReport`] instead of a registered one.
    pub fn with_log_report(mut self, report: LogReport) -> Self {
        self.source = LogSource::Owned(report);
        self
    }

    pub fn with_writer(mut self, out: impl Write + 'static) -> Self {
        self.out = Box::new(out);
        self
    }

    fn header(&self) -> String {
        let cells: Vec<String> = self
            .entries
            .iter()
            .zip(&self.widths)
            .map(|(entry, &width)| format!("{entry:<width$}"))
            .collect();
        cells.join("  ").trim_end().to_string()
    }

    fn write_rows(&mut self, rows: &[super::LogEntry]) -> io::Result<()> {
        if !self.header_shown {
            writeln!(self.out, "{}", self.header())?;
            self.header_shown = true;
        }
        for row in rows {
            let mut line = String::new();
            for (entry, &width) in self.entries.iter().zip(&self.widths) {
                match row.get(entry) {
                    Some(value) => {
                        let text = match value.as_f64() {
                            Some(number) => format_general(number),
                            None => value.to_string(),
                        };
                        line.push_str(&format!("{text:<width$}  "));
                    }
                    None => line.push_str(&" ".repeat(width + 2)),
                }
            }
            writeln!(self.out, "{}", line.trim_end())?;
        }
        self.out.flush()
    }
}

impl<U: Updater> Extension<U> for PrintReport {
    fn execute(&mut self, trainer: &mut Trainer<U>) -> Result<()> {
        let rows = match &mut self.source {
            LogSource::Named(name) => {
                let report = trainer.extension::<LogReport>(name)?;
                report.log().get(self.printed..).unwrap_or_default().to_vec()
            }
            LogSource::Owned(report) => {
                Extension::<U>::execute(report, trainer)?;
                report.log().get(self.printed..).unwrap_or_default().to_vec()
            }
        };
        self.printed += rows.len();
        self.write_rows(&rows).map_err(KarasError::from)
    }

    fn state(&self) -> serde_json::Value {
        match &self.source {
            LogSource::Owned(report) => Extension::<U>::state(report),
            LogSource::Named(_) => serde_json::Value::Null,
        }
    }

    fn load_state(&mut self, state: serde_json::Value) -> Result<()> {
        match &mut self.source {
            LogSource::Owned(report) => Extension::<U>::load_state(report, state),
            LogSource::Named(_) => Ok(()),
        }
    }
}

/// Render like C's `%g`: six significant digits, trailing zeros removed,
/// exponent notation outside `1e-4 <= |x| < 1e6`.
pub fn format_general(x: f64) -> String {
    const PRECISION: i32 = 6;
    if x == 0.0 || !x.is_finite() {
        let text = match x {
            x if x.is_nan() => "nan",
            x if x.is_infinite() && x > 0.0 => "inf",
            x if x.is_infinite() => "-inf",
            x if x.is_sign_negative() => "-0",
            _ => "0",
        };
        return text.to_string();
    }

    // Exponent after rounding to the target precision.
    let sci = format!("{:.*e}", (PRECISION - 1) as usize, x);
    let (mantissa, exponent) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if exponent < -4 || exponent >= PRECISION {
        let mantissa = trim_fraction(mantissa);
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exponent.abs())
    } else {
        let decimals = (PRECISION - 1 - exponent).max(0) as usize;
        trim_fraction(&format!("{x:.decimals$}")).to_string()
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}
