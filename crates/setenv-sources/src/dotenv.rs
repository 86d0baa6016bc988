//! Dotenv file discovery and lookup.
//!
//! Discovery walks from a start directory up through its ancestors looking for
//! a file with one of the candidate names. Names are tried in order, each with a
//! full upward walk, so a `.env` in a parent directory wins over a `dotenv`
//! next to the caller.

use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use setenv_core::source::{SecretSource, SourceError};
use tracing::{debug, instrument, trace};

/// Candidate file names, in priority order.
pub const DEFAULT_NAMES: [&str; 3] = [".env", "dotenv", "env"];

/// Search `start` and its ancestors for the first file named after `names`.
pub fn find_dotenv<S: AsRef<str>>(start: &Path, names: &[S]) -> Option<PathBuf> {
    for name in names {
        let name = name.as_ref();
        if name.is_empty() {
            continue;
        }
        if let Some(found) = start
            .ancestors()
            .map(|dir| dir.join(name))
            .find(|candidate| candidate.is_file())
        {
            trace!(path = %found.display(), "found dotenv file");
            return Some(found);
        }
    }
    None
}

/// Use `explicit` when given, otherwise discover from `start`.
pub fn locate<S: AsRef<str>>(
    explicit: Option<&Path>,
    start: &Path,
    names: &[S],
) -> Option<PathBuf> {
    match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => find_dotenv(start, names),
    }
}

/// A dotenv file used as a secret source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DotenvFile {
    path: PathBuf,
}

impl DotenvFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse every well-formed `KEY=VALUE` line; malformed lines are skipped and
    /// later duplicates win.
    pub fn entries(&self) -> Result<HashMap<String, String>, SourceError> {
        let contents = fs::read_to_string(&self.path).map_err(|err| {
            SourceError::backend(format!("read {}: {err}", self.path.display()))
        })?;
        Ok(parse_entries(&contents))
    }
}

/// Each line is parsed on its own so an unterminated quote cannot swallow the
/// lines after it.
fn parse_entries(contents: &str) -> HashMap<String, String> {
    contents
        .lines()
        .enumerate()
        .flat_map(|(index, line)| {
            dotenvy::from_read_iter(line.as_bytes()).filter_map(move |item| match item {
                Ok(pair) => Some(pair),
                Err(err) => {
                    trace!(line = index + 1, "skipping dotenv line: {err}");
                    None
                }
            })
        })
        .collect()
}

impl SecretSource for DotenvFile {
    fn name(&self) -> &'static str {
        "dotenv"
    }

    #[instrument(level = "trace", skip(self), fields(path = %self.path.display()))]
    fn fetch(&self, key: &str) -> Result<String, SourceError> {
        debug!("loading dotenv file");
        self.entries()?
            .remove(key)
            .ok_or_else(|| SourceError::not_found(key))
    }
}
