use setenv_core::source::{SecretSource, SourceError};
use tracing::instrument;

/// OS keyring-backed source. Secrets live under `(service, key)` entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyringSource {
    service: String,
}

impl KeyringSource {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }
}

impl SecretSource for KeyringSource {
    fn name(&self) -> &'static str {
        "keyring"
    }

    #[instrument(level = "trace", skip(self), fields(service = %self.service))]
    fn fetch(&self, key: &str) -> Result<String, SourceError> {
        keyring::Entry::new(&self.service, key)
            .and_then(|entry| entry.get_password())
            .map_err(|err| map_keyring_error(err, key))
    }
}

fn map_keyring_error(err: keyring::Error, key: &str) -> SourceError {
    match err {
        keyring::Error::NoEntry => SourceError::not_found(key),
        keyring::Error::NoStorageAccess(_) | keyring::Error::PlatformFailure(_) => {
            SourceError::Unavailable {
                provider: "keyring",
            }
        }
        other => SourceError::backend(other),
    }
}
