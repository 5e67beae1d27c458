//! Scoped collection of observations for the current training step.
//!
//! The trainer owns one [`Reporter`] and passes it down explicitly: the
//! updater receives `&mut Reporter`, extensions reach it through the
//! trainer. Reported keys are the `/`-join of the active scopes and the key.
//!
//! ```
//! use karas_core::reporter::Reporter;
//!
//! let mut reporter = Reporter::new();
//! {
//!     let mut train = reporter.scope("train");
//!     let mut scalar = train.scope("scalar");
//!     scalar.report([("loss", 0.5)]);
//! }
//! assert!(reporter.observation().contains_key("train/scalar/loss"));
//! assert_eq!(reporter.namespace(), "");
//! ```

pub mod key;
pub mod summary;
pub mod value;

use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};

pub use key::{KeyEntry, KeyType, Mode, compare_key};
pub use summary::{DictSummary, Summary};
pub use value::{ArrayValue, Value};

/// Flat map from namespaced tag to value.
pub type Observation = BTreeMap<String, Value>;

pub const SEPARATOR: char = '/';

/// Restores the namespace depth captured by [`Reporter::push_scope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "a scope token must be handed back to pop_scope"]
pub struct ScopeToken(usize);

/// Observation collector with nested namespaces.
#[derive(Debug, Clone, Default)]
pub struct Reporter {
    scopes: Vec<String>,
    observation: Observation,
}

impl Reporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current scope path; empty at the root.
    pub fn namespace(&self) -> String {
        self.scopes.join("/")
    }

    /// Enter scope `name`. The returned token restores the previous
    /// namespace when passed to [`pop_scope`](Self::pop_scope).
    pub fn push_scope(&mut self, name: &str) -> ScopeToken {
        let token = ScopeToken(self.scopes.len());
        self.scopes.push(name.to_string());
        token
    }

    pub fn pop_scope(&mut self, token: ScopeToken) {
        self.scopes.truncate(token.0);
    }

    /// Enter scope `name` until the returned guard is dropped.
    ///
    /// The namespace is restored on every exit path, including unwinding.
    pub fn scope(&mut self, name: &str) -> ScopeGuard<'_> {
        let token = self.push_scope(name);
        ScopeGuard {
            reporter: self,
            token,
        }
    }

    /// Record values under the current namespace.
    pub fn report<K, V, I>(&mut self, values: I)
    where
        K: AsRef<str>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        for (key, value) in values {
            let name = self.qualify(key.as_ref());
            self.observation.insert(name, value.into());
        }
    }

    /// Record a single value under the current namespace.
    pub fn report_value(&mut self, key: &str, value: impl Into<Value>) {
        let name = self.qualify(key);
        self.observation.insert(name, value.into());
    }

    pub fn observation(&self) -> &Observation {
        &self.observation
    }

    pub fn get(&self, tag: &str) -> Option<&Value> {
        self.observation.get(tag)
    }

    /// Clear every observation and return to the root namespace.
    pub fn reset(&mut self) {
        self.scopes.clear();
        self.observation.clear();
    }

    /// Snapshot form: the observation map only, namespace excluded.
    pub fn state(&self) -> Observation {
        self.observation.clone()
    }

    /// Restore observations from a snapshot; the namespace returns to root.
    pub fn load_state(&mut self, observation: Observation) {
        self.scopes.clear();
        self.observation = observation;
    }

    fn qualify(&self, key: &str) -> String {
        if self.scopes.is_empty() {
            key.to_string()
        } else {
            let mut name = self.namespace();
            name.push(SEPARATOR);
            name.push_str(key);
            name
        }
    }
}

/// RAII scope returned by [`Reporter::scope`].
pub struct ScopeGuard<'a> {
    reporter: &'a mut Reporter,
    token: ScopeToken,
}

impl Deref for ScopeGuard<'_> {
    type Target = Reporter;

    fn deref(&self) -> &Reporter {
        self.reporter
    }
}

impl DerefMut for ScopeGuard<'_> {
    fn deref_mut(&mut self) -> &mut Reporter {
        self.reporter
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        self.reporter.pop_scope(self.token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_report_at_root() {
        let mut reporter = Reporter::new();
        reporter.report([("x", 1)]);
        assert_eq!(reporter.get("x"), Some(&Value::Scalar(1.0)));
    }

    #[test]
    fn test_nested_scopes_join_keys() {
        let mut reporter = Reporter::new();
        {
            let mut test = reporter.scope("test");
            {
                let mut scalar = test.scope("scalar");
                scalar.report([("accuracy", 0.9)]);
                assert_eq!(scalar.namespace(), "test/scalar");
            }
            assert_eq!(test.namespace(), "test");
            test.report_value("raw", 1.0);
        }
        assert_eq!(reporter.namespace(), "");
        let keys: Vec<_> = reporter.observation().keys().cloned().collect();
        assert_eq!(keys, vec!["test/raw".to_string(), "test/scalar/accuracy".to_string()]);
    }

    #[test]
    fn test_push_pop_tokens() {
        let mut reporter = Reporter::new();
        let outer = reporter.push_scope("train");
        let inner = reporter.push_scope("scalar");
        reporter.report([("loss", 0.1)]);
        reporter.pop_scope(inner);
        assert_eq!(reporter.namespace(), "train");
        reporter.pop_scope(outer);
        assert_eq!(reporter.namespace(), "");
        assert!(reporter.get("train/scalar/loss").is_some());
    }

    #[test]
    fn test_scope_restored_on_panic() {
        let mut reporter = Reporter::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut scope = reporter.scope("train");
            scope.report([("loss", 1.0)]);
            panic!("step failed");
        }));
        assert!(result.is_err());
        assert_eq!(reporter.namespace(), "");
        assert!(reporter.get("train/loss").is_some());
    }

    #[test]
    fn test_reset_and_state() {
        let mut reporter = Reporter::new();
        let _token = reporter.push_scope("test");
        reporter.report([("a", 1.0)]);

        let state = reporter.state();
        reporter.reset();
        assert!(reporter.observation().is_empty());
        assert_eq!(reporter.namespace(), "");

        let _token = reporter.push_scope("stale");
        reporter.load_state(state);
        assert_eq!(reporter.namespace(), "");
        assert!(reporter.get("test/a").is_some());
    }
}
