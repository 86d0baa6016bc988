use std::path::PathBuf;

use crate::DEFAULT_TARGET;

/// One resolution call: which variable to set, which key to look up, and how.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveRequest {
    /// Environment variable that should end up set.
    pub target: String,
    /// Key looked up in each source; defaults to `target`.
    pub source: Option<String>,
    /// Explicit dotenv file; when absent the file is discovered.
    pub env_file: Option<PathBuf>,
    /// Clear an existing value before resolving, restoring it if nothing resolves.
    pub override_existing: bool,
    /// Emit TRACE diagnostics for this call.
    pub verbose: bool,
}

impl ResolveRequest {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            source: None,
            env_file: None,
            override_existing: false,
            verbose: false,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_env_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.env_file = Some(path.into());
        self
    }

    pub fn override_existing(mut self, enabled: bool) -> Self {
        self.override_existing = enabled;
        self
    }

    pub fn verbose(mut self, enabled: bool) -> Self {
        self.verbose = enabled;
        self
    }

    /// Key to look up in each source.
    pub fn source_name(&self) -> &str {
        self.source.as_deref().unwrap_or(&self.target)
    }
}

impl Default for ResolveRequest {
    fn default() -> Self {
        Self::new(DEFAULT_TARGET)
    }
}
