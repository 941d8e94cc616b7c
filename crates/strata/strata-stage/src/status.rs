use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Liveness state a stage publishes under its `<PREFIX>STAT` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    Waiting,
    Blocked,
    Processing,
    Stopped,
}

impl StageState {
    pub fn as_str(self) -> &'static str {
        match self {
            StageState::Waiting => "waiting",
            StageState::Blocked => "blocked",
            StageState::Processing => "processing",
            StageState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Process-wide key/value status map shared by all stages.
///
/// Cloning yields another handle to the same map.
#[derive(Clone, Debug, Default)]
pub struct StatusBoard {
    inner: Arc<RwLock<HashMap<String, String>>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, key: impl Into<String>, value: impl ToString) {
        self.inner.write().insert(key.into(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.read().get(key).cloned()
    }

    /// Value parsed as `T`; `None` when absent or unparsable.
    pub fn get_parsed<T: FromStr>(&self, key: &str) -> Option<T> {
        self.inner.read().get(key).and_then(|v| v.parse().ok())
    }

    /// Sorted copy of every key.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.inner
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}
