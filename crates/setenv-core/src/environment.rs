//! The variable table the resolver reads and publishes into.

use std::{
    collections::HashMap,
    env,
    sync::{Arc, Mutex},
};

use thiserror::Error;

/// Errors produced when writing to an environment table.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnvError {
    /// Empty, or contains `=` or NUL.
    #[error("invalid environment variable name: {name:?}")]
    InvalidName { name: String },
    /// Contains NUL.
    #[error("invalid value for environment variable {name}")]
    InvalidValue { name: String },
    #[error("environment table unavailable: {reason}")]
    Poisoned { reason: String },
}

/// Name -> value table. Implementations take no lock across calls; concurrent
/// writers race and the last write wins.
pub trait Environment: Send + Sync {
    /// Current value, `None` when unset (or not valid unicode for the process table).
    fn get(&self, name: &str) -> Option<String>;

    fn set(&self, name: &str, value: &str) -> Result<(), EnvError>;

    /// Remove the variable (idempotent).
    fn remove(&self, name: &str) -> Result<(), EnvError>;
}

impl<E: Environment + ?Sized> Environment for &E {
    fn get(&self, name: &str) -> Option<String> {
        (**self).get(name)
    }

    fn set(&self, name: &str, value: &str) -> Result<(), EnvError> {
        (**self).set(name, value)
    }

    fn remove(&self, name: &str) -> Result<(), EnvError> {
        (**self).remove(name)
    }
}

/// The real process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnv;

impl Environment for ProcessEnv {
    fn get(&self, name: &str) -> Option<String> {
        if !is_valid_name(name) {
            return None;
        }
        env::var(name).ok()
    }

    fn set(&self, name: &str, value: &str) -> Result<(), EnvError> {
        check_name(name)?;
        if value.contains('\0') {
            return Err(EnvError::InvalidValue {
                name: name.to_string(),
            });
        }
        env::set_var(name, value);
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), EnvError> {
        check_name(name)?;
        env::remove_var(name);
        Ok(())
    }
}

/// In-memory table for tests and hosts that publish somewhere other than the process.
#[derive(Debug, Default, Clone)]
pub struct MemoryEnv {
    inner: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_var(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        if let Ok(mut map) = self.inner.lock() {
            map.insert(name.into(), value.into());
        }
        self
    }
}

impl Environment for MemoryEnv {
    fn get(&self, name: &str) -> Option<String> {
        self.inner.lock().ok()?.get(name).cloned()
    }

    fn set(&self, name: &str, value: &str) -> Result<(), EnvError> {
        check_name(name)?;
        let mut map = self.inner.lock().map_err(|err| EnvError::Poisoned {
            reason: err.to_string(),
        })?;
        map.insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), EnvError> {
        let mut map = self.inner.lock().map_err(|err| EnvError::Poisoned {
            reason: err.to_string(),
        })?;
        map.remove(name);
        Ok(())
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && !name.contains('=') && !name.contains('\0')
}

fn check_name(name: &str) -> Result<(), EnvError> {
    if is_valid_name(name) {
        Ok(())
    } else {
        Err(EnvError::InvalidName {
            name: name.to_string(),
        })
    }
}
