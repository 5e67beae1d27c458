//! Durable artifact writes: atomic JSON files and filename templates.
//!
//! Every checkpoint and log file goes through [`atomic_write`], which writes
//! into a temporary sibling and renames it over the target, so the previously
//! committed file is never left half-written.

use std::io;
use std::path::{Path, PathBuf};

/// Atomically write JSON data to a file.
///
/// Serializes `data` to pretty-printed JSON and hands it to [`atomic_write`].
pub fn atomic_write_json<T: serde::Serialize>(path: &Path, data: &T) -> io::Result<()> {
    let json = serde_json::to_string_pretty(data).map_err(io::Error::other)?;
    atomic_write(path, json.as_bytes())
}

/// Atomically write raw bytes to a file.
///
/// Writes to a temporary sibling, then renames it onto the target path. On
/// failure the temporary file is removed and the target is untouched.
/// Creates parent directories if they don't exist.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let tmp = temp_path(path);
    let result = std::fs::write(&tmp, data).and_then(|_| std::fs::rename(&tmp, path));
    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result
}

/// Load and deserialize JSON from a file.
///
/// Returns `Ok(None)` if the file doesn't exist.
pub fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> io::Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read_to_string(path)?;
    let value =
        serde_json::from_str(&data).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(Some(value))
}

/// Interpolate `{iteration}` and `{epoch}` placeholders in a filename template.
pub fn render_filename(template: &str, iteration: u64, epoch: u64) -> String {
    template
        .replace("{iteration}", &iteration.to_string())
        .replace("{epoch}", &epoch.to_string())
}

/// Serde helpers that keep non-finite floats intact in JSON.
///
/// JSON has no NaN or infinity, and `serde_json` writes them as `null`. These
/// helpers write `"NaN"`, `"Infinity"` and `"-Infinity"` instead and read
/// them back. A bare `null` reads as NaN, which is what older files hold.
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct Window {
///     #[serde(with = "karas_core::persistence::float")]
///     sum: f64,
/// }
/// ```
pub mod float {
    use std::fmt;

    use serde::de::{self, Visitor};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// An `f64` that survives a JSON round trip even when non-finite.
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct JsonFloat(pub f64);

    impl Serialize for JsonFloat {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            let x = self.0;
            if x.is_finite() {
                serializer.serialize_f64(x)
            } else if x.is_nan() {
                serializer.serialize_str("NaN")
            } else if x > 0.0 {
                serializer.serialize_str("Infinity")
            } else {
                serializer.serialize_str("-Infinity")
            }
        }
    }

    struct FloatVisitor;

    impl Visitor<'_> for FloatVisitor {
        type Value = JsonFloat;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a number, \"NaN\", \"Infinity\" or \"-Infinity\"")
        }

        fn visit_f64<E: de::Error>(self, v: f64) -> Result<JsonFloat, E> {
            Ok(JsonFloat(v))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<JsonFloat, E> {
            Ok(JsonFloat(v as f64))
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<JsonFloat, E> {
            Ok(JsonFloat(v as f64))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<JsonFloat, E> {
            match v {
                "NaN" => Ok(JsonFloat(f64::NAN)),
                "Infinity" => Ok(JsonFloat(f64::INFINITY)),
                "-Infinity" => Ok(JsonFloat(f64::NEG_INFINITY)),
                _ => Err(E::invalid_value(de::Unexpected::Str(v), &self)),
            }
        }

        fn visit_unit<E: de::Error>(self) -> Result<JsonFloat, E> {
            Ok(JsonFloat(f64::NAN))
        }
    }

    impl<'de> Deserialize<'de> for JsonFloat {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            deserializer.deserialize_any(FloatVisitor)
        }
    }

    pub fn serialize<S: Serializer>(x: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        JsonFloat(*x).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        JsonFloat::deserialize(deserializer).map(|x| x.0)
    }

    /// `Option<f64>`: `None` stays `null`.
    pub mod option {
        use serde::{Deserialize, Deserializer, Serialize, Serializer};

        use super::JsonFloat;

        pub fn serialize<S: Serializer>(x: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error> {
            x.map(JsonFloat).serialize(serializer)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<f64>, D::Error> {
            Ok(Option::<JsonFloat>::deserialize(deserializer)?.map(|x| x.0))
        }
    }

    /// `Vec<f64>`, e.g. parameters or optimizer buffers of a diverged run.
    pub mod vec {
        use serde::{Deserialize, Deserializer, Serializer};

        use super::JsonFloat;

        pub fn serialize<S: Serializer>(xs: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
            serializer.collect_seq(xs.iter().copied().map(JsonFloat))
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
            let xs = Vec::<JsonFloat>::deserialize(deserializer)?;
            Ok(xs.into_iter().map(|x| x.0).collect())
        }
    }
}

// `.tmp` is appended to the full name so `log` and `log.json` never share a temp file.
fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{}.tmp", std::process::id()));
    path.with_file_name(name)
}
