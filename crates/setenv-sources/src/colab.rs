//! Colab notebook userdata.
//!
//! Colab serves userdata over the notebook kernel channel, so a Rust process can
//! only reach it through a bridge registered by the hosting kernel. Without one
//! the store reports itself unavailable, which the resolver treats like a
//! missing secret.

use std::{env, fmt, sync::Arc};

use setenv_core::source::{SecretSource, SourceError};
use thiserror::Error;
use tracing::{instrument, trace};

/// Variable the Colab runtime sets in every VM.
pub const RUNTIME_MARKER: &str = "COLAB_RELEASE_TAG";

/// Failures reported by a userdata bridge.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UserdataError {
    #[error("secret {0} does not exist")]
    SecretNotFound(String),
    /// The user has not granted this notebook access to the secret.
    #[error("notebook access to secret {0} is not granted")]
    NotebookAccess(String),
    #[error("userdata request failed: {0}")]
    Request(String),
}

/// Bridge into the notebook's userdata service.
pub trait UserdataBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<String, UserdataError>;
}

impl<F> UserdataBackend for F
where
    F: Fn(&str) -> Result<String, UserdataError> + Send + Sync,
{
    fn get(&self, key: &str) -> Result<String, UserdataError> {
        self(key)
    }
}

/// Hosted notebook store A.
#[derive(Clone, Default)]
pub struct ColabUserdata {
    backend: Option<Arc<dyn UserdataBackend>>,
}

impl ColabUserdata {
    /// A store with no bridge; every fetch is `Unavailable`.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backend(backend: impl UserdataBackend + 'static) -> Self {
        Self {
            backend: Some(Arc::new(backend)),
        }
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }
}

impl fmt::Debug for ColabUserdata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColabUserdata")
            .field("backend", &self.backend.is_some())
            .finish()
    }
}

/// Whether this process runs inside a Colab VM.
pub fn in_colab_runtime() -> bool {
    env::var_os(RUNTIME_MARKER).is_some()
}

impl SecretSource for ColabUserdata {
    fn name(&self) -> &'static str {
        "colab"
    }

    #[instrument(level = "trace", skip(self))]
    fn fetch(&self, key: &str) -> Result<String, SourceError> {
        let Some(backend) = &self.backend else {
            if in_colab_runtime() {
                trace!("colab runtime detected but no userdata bridge is registered");
            } else {
                trace!("not in colab");
            }
            return Err(SourceError::Unavailable { provider: "colab" });
        };

        backend.get(key).map_err(|err| match err {
            UserdataError::SecretNotFound(key) => SourceError::NotFound { key },
            UserdataError::NotebookAccess(key) => SourceError::AccessDenied { key },
            UserdataError::Request(reason) => SourceError::Backend { reason },
        })
    }
}
