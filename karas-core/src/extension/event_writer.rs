//! Structured event stream for external dashboards.
//!
//! [`EventWriter`] turns every `scalar` and `images` observation into an
//! event and hands it to an [`EventSink`]. The sink is a live resource: it
//! is opened in `initialize`, closed in `finalize`, and never serialized.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::json;

use super::Extension;
use crate::error::{KarasError, Result};
use crate::reporter::{ArrayValue, Value, compare_key};
use crate::trainer::Trainer;
use crate::updater::Updater;

/// Destination for scalar and image events.
pub trait EventSink {
    fn add_scalar(&mut self, tag: &str, value: f64, step: u64) -> Result<()>;

    fn add_image(&mut self, tag: &str, image: &ArrayValue, step: u64) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Serialize)]
struct Event<'a, T: Serialize> {
    wall_time: f64,
    step: u64,
    tag: &'a str,
    kind: &'static str,
    value: T,
}

/// Appends one JSON object per event to a file.
pub struct JsonlSink {
    writer: BufWriter<File>,
}

impl JsonlSink {
    /// Open `path` for appending, so a resumed run continues the stream.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }

    fn write<T: Serialize>(&mut self, event: &Event<'_, T>) -> Result<()> {
        serde_json::to_writer(&mut self.writer, event)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }
}

fn wall_time() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0.0, |d| d.as_secs_f64())
}

impl EventSink for JsonlSink {
    fn add_scalar(&mut self, tag: &str, value: f64, step: u64) -> Result<()> {
        self.write(&Event {
            wall_time: wall_time(),
            step,
            tag,
            kind: "scalar",
            value,
        })
    }

    fn add_image(&mut self, tag: &str, image: &ArrayValue, step: u64) -> Result<()> {
        self.write(&Event {
            wall_time: wall_time(),
            step,
            tag,
            kind: "image",
            value: json!({ "shape": image.shape, "data": image.data }),
        })
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

type SinkFactory = Box<dyn Fn(&Path) -> Result<Box<dyn EventSink>>>;

/// Forwards observations to an [`EventSink`] each time it runs.
///
/// Tags containing `test` are stepped by epoch, everything else by
/// iteration. Only tags with a `scalar` or `images` segment are written.
pub struct EventWriter {
    keys: Option<Vec<String>>,
    path: PathBuf,
    open_sink: SinkFactory,
    sink: Option<Box<dyn EventSink>>,
}

impl Default for EventWriter {
    fn default() -> Self {
        Self::new("events.jsonl")
    }
}

impl EventWriter {
    /// Write JSON lines to `path`, relative to the trainer's output directory.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            keys: None,
            path: path.into(),
            open_sink: Box::new(|path: &Path| -> Result<Box<dyn EventSink>> {
                Ok(Box::new(JsonlSink::open(path)?))
            }),
            sink: None,
        }
    }

    /// Use another sink; `open` receives the resolved output path.
    pub fn with_sink_factory(
        mut self,
        open: impl Fn(&Path) -> Result<Box<dyn EventSink>> + 'static,
    ) -> Self {
        self.open_sink = Box::new(open);
        self
    }

    /// Only forward tags matching one of `keys`.
    pub fn keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keys = Some(keys.into_iter().map(Into::into).collect());
        self
    }

    fn selected(&self, tag: &str) -> bool {
        self.keys
            .as_ref()
            .is_none_or(|keys| keys.iter().any(|key| compare_key(key, tag)))
    }
}

impl<U: Updater> Extension<U> for EventWriter {
    fn initialize(&mut self, trainer: &mut Trainer<U>) -> Result<()> {
        let path = trainer.out().join(&self.path);
        self.sink = Some((self.open_sink)(&path)?);
        Ok(())
    }

    fn execute(&mut self, trainer: &mut Trainer<U>) -> Result<()> {
        let (epoch, iteration) = (trainer.epoch(), trainer.iteration());
        let tags: Vec<(&String, &Value)> = trainer
            .observation()
            .iter()
            .filter(|(tag, _)| self.selected(tag))
            .collect();
        let sink = self
            .sink
            .as_mut()
            .ok_or_else(|| KarasError::config("event sink is not open"))?;

        for (tag, value) in tags {
            let step = if tag.contains("test") { epoch } else { iteration };
            if tag.contains("scalar") {
                if let Some(scalar) = value.as_scalar() {
                    sink.add_scalar(tag, scalar, step)?;
                }
            } else if tag.contains("images") {
                if let Value::Array(image) = value {
                    sink.add_image(tag, image, step)?;
                }
            }
        }
        sink.flush()
    }

    fn finalize(&mut self, _trainer: &mut Trainer<U>) -> Result<()> {
        match self.sink.take() {
            Some(mut sink) => sink.flush(),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::extension::ExtendOptions;
    use crate::reporter::Reporter;
    use crate::trainer::test_support::loaders;
    use crate::trigger::IntervalTrigger;
    use crate::updater::{Device, Sgd, UpdaterBase};

    type Events = Rc<RefCell<Vec<(String, String, u64)>>>;

    struct RecordingSink(Events);

    impl EventSink for RecordingSink {
        fn add_scalar(&mut self, tag: &str, _value: f64, step: u64) -> Result<()> {
            self.0.borrow_mut().push(("scalar".into(), tag.into(), step));
            Ok(())
        }

        fn add_image(&mut self, tag: &str, _image: &ArrayValue, step: u64) -> Result<()> {
            self.0.borrow_mut().push(("image".into(), tag.into(), step));
            Ok(())
        }
    }

    /// Reports a loss and a 2x2 image every step.
    struct ImageUpdater(UpdaterBase);

    impl Updater for ImageUpdater {
        type Batch = f64;

        fn update(&mut self, batch: f64, reporter: &mut Reporter) -> Result<()> {
            reporter.scope("scalar").report_value("loss", batch);
            let image = ArrayValue::new(vec![2, 2], vec![0.0, 0.25, 0.5, 1.0])?;
            reporter.scope("images").report_value("input", image);
            Ok(())
        }

        fn base(&self) -> &UpdaterBase {
            &self.0
        }

        fn base_mut(&mut self) -> &mut UpdaterBase {
            &mut self.0
        }
    }

    fn trainer(out: &Path) -> Trainer<ImageUpdater> {
        Trainer::new(
            ImageUpdater(UpdaterBase::single(Device::Cpu, "main", Sgd::new(0.1))),
            IntervalTrigger::iterations(3).unwrap(),
            loaders(vec![1.0, 2.0]),
            out,
        )
        .unwrap()
    }

    #[test]
    fn test_events_use_epoch_step_for_test_tags() {
        let dir = tempfile::tempdir().unwrap();
        let events = Events::default();
        let recorded = Rc::clone(&events);
        let mut t = trainer(dir.path());
        t.reporter_mut().scope("test").scope("scalar").report_value("accuracy", 0.5);
        t.extend(
            EventWriter::default()
                .keys(["loss", "test/accuracy", "images/input"])
                .with_sink_factory(move |_| Ok(Box::new(RecordingSink(Rc::clone(&recorded))))),
            ExtendOptions::new().trigger(IntervalTrigger::iterations(3).unwrap()),
        );
        t.run().unwrap();

        let expected = vec![
            ("scalar".to_string(), "test/scalar/accuracy".to_string(), 1),
            ("image".to_string(), "train/images/input".to_string(), 3),
            ("scalar".to_string(), "train/scalar/loss".to_string(), 3),
        ];
        assert_eq!(*events.borrow(), expected);
    }

    #[test]
    fn test_jsonl_sink_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let mut t = trainer(dir.path());
        t.extend(EventWriter::default(), ExtendOptions::new());
        t.run().unwrap();

        let text = std::fs::read_to_string(dir.path().join("events.jsonl")).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        // Two events per step for three steps.
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[0]["kind"], json!("image"));
        assert_eq!(lines[0]["value"]["shape"], json!([2, 2]));
        assert_eq!(lines[1]["tag"], json!("train/scalar/loss"));
        assert_eq!(lines[5]["step"], json!(3));
    }
}
