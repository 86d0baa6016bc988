use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use thiserror::Error;

/// Why a source did not yield a value. Every variant is a soft miss to the resolver.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// The capability backing the source is not present in this runtime.
    #[error("{provider} is not available in this runtime")]
    Unavailable { provider: &'static str },
    /// The source is reachable but holds no entry for the key.
    #[error("secret not found: {key}")]
    NotFound { key: String },
    /// The notebook has not been granted access to the secret.
    #[error("notebook access denied for secret: {key}")]
    AccessDenied { key: String },
    /// Transport, decoding or storage failure inside the source.
    #[error("backend error: {reason}")]
    Backend { reason: String },
}

impl SourceError {
    pub fn backend(reason: impl ToString) -> Self {
        SourceError::Backend {
            reason: reason.to_string(),
        }
    }

    pub fn not_found(key: &str) -> Self {
        SourceError::NotFound {
            key: key.to_string(),
        }
    }
}

/// A place secrets can be fetched from by name (notebook stores, dotenv files, keyrings).
pub trait SecretSource: Send + Sync {
    /// Short name used for logging and the failure summary.
    fn name(&self) -> &'static str;

    /// Look up `key`. Absence of the capability and absence of the key are both errors here;
    /// callers decide how soft they are.
    fn fetch(&self, key: &str) -> Result<String, SourceError>;
}

impl<S: SecretSource + ?Sized> SecretSource for Box<S> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn fetch(&self, key: &str) -> Result<String, SourceError> {
        (**self).fetch(key)
    }
}

impl<S: SecretSource + ?Sized> SecretSource for Arc<S> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn fetch(&self, key: &str) -> Result<String, SourceError> {
        (**self).fetch(key)
    }
}

/// Map-backed source for tests and embedding hosts that already hold their secrets.
#[derive(Debug, Clone)]
pub struct InMemorySource {
    name: &'static str,
    inner: Arc<Mutex<HashMap<String, String>>>,
}

impl InMemorySource {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inner: Arc::default(),
        }
    }

    pub fn with_secret(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.insert(key.into(), value.into());
    }
}

impl SecretSource for InMemorySource {
    fn name(&self) -> &'static str {
        self.name
    }

    fn fetch(&self, key: &str) -> Result<String, SourceError> {
        let map = self
            .inner
            .lock()
            .map_err(|err| SourceError::backend(format!("lock poisoned: {err}")))?;

        map.get(key)
            .cloned()
            .ok_or_else(|| SourceError::not_found(key))
    }
}

/// Source whose capability is absent; every fetch reports `Unavailable`.
#[derive(Debug, Clone, Copy)]
pub struct UnavailableSource(pub &'static str);

impl SecretSource for UnavailableSource {
    fn name(&self) -> &'static str {
        self.0
    }

    fn fetch(&self, _key: &str) -> Result<String, SourceError> {
        Err(SourceError::Unavailable { provider: self.0 })
    }
}
