use std::collections::HashMap;

#[derive(Debug, thiserror::Error)]
pub enum KvError {
    #[error("reply for '{key}' is not an array")]
    NotAnArray { key: String },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Read-only view of the external key/value store.
pub trait KvStore {
    /// Every field of hash `key` as (field, value) pairs in reply order.
    /// A missing key yields an empty list.
    fn hgetall(&mut self, key: &str) -> Result<Vec<(String, String)>, KvError>;
}

impl<S: KvStore + ?Sized> KvStore for Box<S> {
    fn hgetall(&mut self, key: &str) -> Result<Vec<(String, String)>, KvError> {
        (**self).hgetall(key)
    }
}

enum Value {
    Hash(Vec<(String, String)>),
    Plain(String),
}

/// In-process store; records every key it was asked for.
#[derive(Default)]
pub struct MemoryStore {
    values: HashMap<String, Value>,
    requests: Vec<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_hash<K, V>(&mut self, key: &str, fields: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<String>,
        V: Into<String>,
    {
        let fields = fields.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self.values.insert(key.to_string(), Value::Hash(fields));
    }

    /// Stores a non-hash value; `hgetall` on it fails like a type mismatch.
    pub fn set_plain(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(key.to_string(), Value::Plain(value.into()));
    }

    pub fn requests(&self) -> &[String] {
        &self.requests
    }
}

impl KvStore for MemoryStore {
    fn hgetall(&mut self, key: &str) -> Result<Vec<(String, String)>, KvError> {
        self.requests.push(key.to_string());
        match self.values.get(key) {
            Some(Value::Hash(fields)) => Ok(fields.clone()),
            Some(Value::Plain(_)) => Err(KvError::NotAnArray {
                key: key.to_string(),
            }),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_behaves_like_hgetall() {
        let mut s = MemoryStore::new();
        s.set_hash("GPSPRIM", [("LAT", "37.3"), ("LON", "-121.6")]);
        s.set_plain("VERSION", "3");

        assert_eq!(
            s.hgetall("GPSPRIM").unwrap(),
            vec![("LAT".into(), "37.3".into()), ("LON".into(), "-121.6".into())]
        );
        assert!(s.hgetall("absent").unwrap().is_empty());
        assert!(matches!(s.hgetall("VERSION"), Err(KvError::NotAnArray { .. })));
        assert_eq!(s.requests(), ["GPSPRIM", "absent", "VERSION"]);
    }
}
