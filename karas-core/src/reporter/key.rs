//! Pattern-style matching of namespaced observation tags.
//!
//! Tags follow `{mode}/{type}/{key}`. A query may omit the mode (defaults to
//! `train`) and the type (matches any type), so `test/accuracy` matches
//! `test/scalar/accuracy` and `loss` matches `train/scalar/loss`.

use std::fmt;

/// Training phase a tag belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    Train,
    Test,
}

impl Mode {
    fn parse(segment: &str) -> Option<Self> {
        match segment {
            "train" => Some(Mode::Train),
            "test" => Some(Mode::Test),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Train => "train",
            Mode::Test => "test",
        }
    }
}

/// Kind of observation stored under a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    Scalar,
    Images,
    Others,
}

impl KeyType {
    fn parse(segment: &str) -> Option<Self> {
        match segment {
            "scalar" => Some(KeyType::Scalar),
            "images" => Some(KeyType::Images),
            "others" => Some(KeyType::Others),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::Scalar => "scalar",
            KeyType::Images => "images",
            KeyType::Others => "others",
        }
    }
}

/// A parsed tag: `(mode, type, key)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEntry {
    pub mode: Mode,
    /// `None` when the tag carries no type segment.
    pub key_type: Option<KeyType>,
    pub key: String,
}

impl KeyEntry {
    pub fn parse(tag: &str) -> Self {
        let mut segments: Vec<&str> = tag.split('/').collect();
        let mode = match Mode::parse(segments[0]) {
            Some(mode) => {
                segments.remove(0);
                mode
            }
            None => Mode::Train,
        };

        let key_type = segments.first().and_then(|s| KeyType::parse(s));
        if key_type.is_some() {
            segments.remove(0);
        }

        Self {
            mode,
            key_type,
            key: segments.join("/"),
        }
    }

    /// Whether the tag `other` satisfies this entry used as a query.
    ///
    /// Mode and key must be equal; the type only has to match when this
    /// entry specifies one.
    pub fn matches(&self, other: &KeyEntry) -> bool {
        if self.mode != other.mode || self.key != other.key {
            return false;
        }
        match self.key_type {
            Some(t) => other.key_type == Some(t),
            None => true,
        }
    }
}

impl fmt::Display for KeyEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.key_type {
            Some(t) => write!(f, "{}/{}/{}", self.mode.as_str(), t.as_str(), self.key),
            None => write!(f, "{}/{}", self.mode.as_str(), self.key),
        }
    }
}

/// Returns true if the observation `tag` matches the `query` pattern.
pub fn compare_key(query: &str, tag: &str) -> bool {
    KeyEntry::parse(query).matches(&KeyEntry::parse(tag))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_tag() {
        let entry = KeyEntry::parse("test/scalar/accuracy");
        assert_eq!(entry.mode, Mode::Test);
        assert_eq!(entry.key_type, Some(KeyType::Scalar));
        assert_eq!(entry.key, "accuracy");
    }

    #[test]
    fn test_parse_defaults_mode_to_train() {
        let entry = KeyEntry::parse("loss");
        assert_eq!(entry.mode, Mode::Train);
        assert_eq!(entry.key_type, None);
        assert_eq!(entry.key, "loss");
    }

    #[test]
    fn test_parse_nested_key() {
        let entry = KeyEntry::parse("test/scalar/net/lr");
        assert_eq!(entry.key, "net/lr");
        assert_eq!(entry.to_string(), "test/scalar/net/lr");
    }

    #[test]
    fn test_parse_mode_only() {
        let entry = KeyEntry::parse("train");
        assert_eq!(entry.mode, Mode::Train);
        assert_eq!(entry.key, "");
    }

    #[test]
    fn test_untyped_query_matches_any_type() {
        assert!(compare_key("test/accuracy", "test/scalar/accuracy"));
        assert!(compare_key("loss", "train/scalar/loss"));
        assert!(compare_key("test/net/lr", "test/scalar/net/lr"));
    }

    #[test]
    fn test_typed_query_requires_type() {
        assert!(compare_key("test/scalar/accuracy", "test/scalar/accuracy"));
        assert!(!compare_key("test/images/accuracy", "test/scalar/accuracy"));
    }

    #[test]
    fn test_mode_mismatch() {
        assert!(!compare_key("accuracy", "test/scalar/accuracy"));
        assert!(!compare_key("test/loss", "train/scalar/loss"));
    }

    #[test]
    fn test_matching_is_not_symmetric() {
        // A typed tag used as the query does not match an untyped one.
        assert!(compare_key("test/accuracy", "test/scalar/accuracy"));
        assert!(!compare_key("test/scalar/accuracy", "test/accuracy"));
    }
}
