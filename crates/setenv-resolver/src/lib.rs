//! Secret resolution: consult notebook stores, then a dotenv file, then any
//! configured fallbacks, stopping as soon as the target variable holds a
//! non-empty value.
//!
//! Resolution is total. Every failure inside a source is a soft miss; when
//! nothing yields a value a single warning is logged and `None` comes back.

use std::{env, fmt, path::PathBuf};

use setenv_core::{
    environment::{Environment, ProcessEnv},
    source::SecretSource,
};
use setenv_sources::{
    dotenv::{self, DotenvFile, DEFAULT_NAMES},
    ColabUserdata, KaggleSecrets,
};
use tracing::{instrument, trace, warn};

pub use setenv_core::{request::ResolveRequest, DEFAULT_TARGET};

/// Resolve with the runtime's notebook stores over the process environment.
pub fn resolve(request: &ResolveRequest) -> Option<String> {
    Resolver::from_runtime().resolve(request)
}

/// Fixed-priority resolver over an environment table.
pub struct Resolver<E: Environment = ProcessEnv> {
    env: E,
    notebook_stores: Vec<Box<dyn SecretSource>>,
    dotenv_names: Vec<String>,
    search_root: Option<PathBuf>,
    fallbacks: Vec<Box<dyn SecretSource>>,
}

impl Resolver<ProcessEnv> {
    /// Colab userdata, then Kaggle user secrets, then dotenv discovery from the
    /// working directory.
    pub fn from_runtime() -> Self {
        Self::new(ProcessEnv)
            .with_notebook_store(ColabUserdata::new())
            .with_notebook_store(KaggleSecrets::from_env())
    }
}

impl<E: Environment> Resolver<E> {
    /// A resolver with no notebook stores and default dotenv names.
    pub fn new(env: E) -> Self {
        Self {
            env,
            notebook_stores: Vec::new(),
            dotenv_names: DEFAULT_NAMES.iter().map(|name| name.to_string()).collect(),
            search_root: None,
            fallbacks: Vec::new(),
        }
    }

    /// Append a notebook store; stores are tried in insertion order.
    pub fn with_notebook_store(mut self, store: impl SecretSource + 'static) -> Self {
        self.notebook_stores.push(Box::new(store));
        self
    }

    pub fn with_dotenv_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dotenv_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Directory dotenv discovery starts from (defaults to the working directory).
    pub fn with_search_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.search_root = Some(root.into());
        self
    }

    /// Append a source tried after the dotenv file.
    pub fn with_fallback(mut self, source: impl SecretSource + 'static) -> Self {
        self.fallbacks.push(Box::new(source));
        self
    }

    pub fn env(&self) -> &E {
        &self.env
    }

    /// Names of the sources in lookup order.
    pub fn source_names(&self) -> Vec<&'static str> {
        self.notebook_stores
            .iter()
            .map(|s| s.name())
            .chain(std::iter::once("dotenv"))
            .chain(self.fallbacks.iter().map(|s| s.name()))
            .collect()
    }

    /// Resolve `request.target`, publishing the value into the environment table.
    pub fn resolve(&self, request: &ResolveRequest) -> Option<String> {
        if request.verbose {
            tracing::subscriber::with_default(verbose_subscriber(), || self.run(request))
        } else {
            self.run(request)
        }
    }

    #[instrument(level = "trace", skip_all, fields(var = %request.target, key = %request.source_name()))]
    fn run(&self, request: &ResolveRequest) -> Option<String> {
        let target = request.target.as_str();
        let key = request.source_name();

        let saved = if request.override_existing {
            self.take_existing(target)
        } else {
            None
        };

        let mut misses = Misses::default();
        if target.is_empty() {
            misses.push("request", "target variable name is empty");
        } else if let Some(value) = self.walk_chain(request, &mut misses) {
            return Some(value);
        }

        warn!("unable to set {target} from {key}: {misses}");

        if let Some(previous) = saved {
            match self.env.set(target, &previous) {
                Ok(()) => trace!("restored previous value of {target}"),
                Err(err) => trace!("could not restore {target}: {err}"),
            }
        }

        self.env.get(target)
    }

    fn walk_chain(&self, request: &ResolveRequest, misses: &mut Misses) -> Option<String> {
        let target = request.target.as_str();
        let key = request.source_name();

        for store in &self.notebook_stores {
            if let Some(value) = self.try_source(store.as_ref(), target, key, misses) {
                return Some(value);
            }
        }

        match self.dotenv_file(request) {
            Some(file) => {
                if let Some(value) = self.try_source(&file, target, key, misses) {
                    return Some(value);
                }
            }
            None => {
                misses.push(
                    "dotenv",
                    format!(
                        "no {} file in the working directory or its parents",
                        self.dotenv_names.join("/")
                    ),
                );
                if let Some(value) = self.env.get(target).filter(|value| !value.is_empty()) {
                    return Some(value);
                }
            }
        }

        for source in &self.fallbacks {
            if let Some(value) = self.try_source(source.as_ref(), target, key, misses) {
                return Some(value);
            }
        }
        None
    }

    /// Fetch `key` from one source and publish a non-empty result. Returns the
    /// target's value when it is non-empty afterwards, whoever set it.
    fn try_source(
        &self,
        source: &dyn SecretSource,
        target: &str,
        key: &str,
        misses: &mut Misses,
    ) -> Option<String> {
        match source.fetch(key) {
            Ok(value) if value.is_empty() => {
                trace!(source = source.name(), "empty value for {key}");
                misses.push(source.name(), "empty value");
            }
            Ok(value) => match self.env.set(target, &value) {
                Ok(()) => trace!(source = source.name(), "set {target} from {key}"),
                Err(err) => {
                    trace!(source = source.name(), "{err}");
                    misses.push(source.name(), err.to_string());
                }
            },
            Err(err) => {
                trace!(source = source.name(), "{err}");
                misses.push(source.name(), err.to_string());
            }
        }
        self.env.get(target).filter(|value| !value.is_empty())
    }

    fn dotenv_file(&self, request: &ResolveRequest) -> Option<DotenvFile> {
        let start = self
            .search_root
            .clone()
            .or_else(|| env::current_dir().ok())
            .unwrap_or_default();
        let path = dotenv::locate(request.env_file.as_deref(), &start, &self.dotenv_names)?;
        trace!(path = %path.display(), "using dotenv file");
        Some(DotenvFile::new(path))
    }

    fn take_existing(&self, target: &str) -> Option<String> {
        let previous = self.env.get(target)?;
        if let Err(err) = self.env.remove(target) {
            trace!("could not clear {target}: {err}");
        }
        trace!("override: cleared {target}");
        Some(previous)
    }
}

impl<E: Environment + fmt::Debug> fmt::Debug for Resolver<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("env", &self.env)
            .field("sources", &self.source_names())
            .field("dotenv_names", &self.dotenv_names)
            .field("search_root", &self.search_root)
            .finish()
    }
}

/// Per-source miss reasons, rendered into the failure warning.
#[derive(Debug, Default)]
struct Misses(Vec<(&'static str, String)>);

impl Misses {
    fn push(&mut self, source: &'static str, reason: impl Into<String>) {
        self.0.push((source, reason.into()));
    }
}

impl fmt::Display for Misses {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (source, reason)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{source}: {reason}")?;
        }
        Ok(())
    }
}

fn verbose_subscriber() -> impl tracing::Subscriber + Send + Sync + 'static {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_writer(std::io::stderr)
        .with_target(false)
        .finish()
}

#[cfg(test)]
mod tests {
    use std::{
        fs,
        path::Path,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
    };

    use serial_test::serial;
    use setenv_core::{
        environment::MemoryEnv,
        source::{InMemorySource, SourceError, UnavailableSource},
    };
    use tracing::{Event, Level, Subscriber};
    use tracing_subscriber::{layer::Context, prelude::*, Layer};

    use super::*;

    /// Counts fetches so tests can assert later sources were skipped.
    #[derive(Clone)]
    struct Counting {
        inner: InMemorySource,
        calls: Arc<AtomicUsize>,
    }

    impl Counting {
        fn new(inner: InMemorySource) -> Self {
            Self {
                inner,
                calls: Arc::default(),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl SecretSource for Counting {
        fn name(&self) -> &'static str {
            self.inner.name()
        }

        fn fetch(&self, key: &str) -> Result<String, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.fetch(key)
        }
    }

    struct WarnCounter(Arc<AtomicUsize>);

    impl<S: Subscriber> Layer<S> for WarnCounter {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == Level::WARN {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn count_warnings<T>(f: impl FnOnce() -> T) -> (T, usize) {
        let count = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(WarnCounter(count.clone()));
        let out = tracing::subscriber::with_default(subscriber, f);
        (out, count.load(Ordering::SeqCst))
    }

    fn no_notebooks(env: MemoryEnv, root: &Path) -> Resolver<MemoryEnv> {
        Resolver::new(env)
            .with_notebook_store(UnavailableSource("colab"))
            .with_notebook_store(UnavailableSource("kaggle"))
            .with_search_root(root)
    }

    fn write_dotenv(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).expect("write dotenv");
        path
    }

    #[test]
    fn first_store_wins_and_stops_the_chain() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_dotenv(dir.path(), ".env", "HF_TOKEN=from-file\n");
        let kaggle = Counting::new(InMemorySource::new("kaggle").with_secret("HF_TOKEN", "k"));
        let resolver = Resolver::new(MemoryEnv::new())
            .with_notebook_store(InMemorySource::new("colab").with_secret("HF_TOKEN", "c"))
            .with_notebook_store(kaggle.clone())
            .with_search_root(dir.path());

        let value = resolver.resolve(&ResolveRequest::new("HF_TOKEN"));

        assert_eq!(value.as_deref(), Some("c"));
        assert_eq!(resolver.env().get("HF_TOKEN").as_deref(), Some("c"));
        assert_eq!(kaggle.calls(), 0);
    }

    #[test]
    fn falls_through_to_second_store() {
        let dir = tempfile::tempdir().expect("tempdir");
        let resolver = Resolver::new(MemoryEnv::new())
            .with_notebook_store(InMemorySource::new("colab"))
            .with_notebook_store(InMemorySource::new("kaggle").with_secret("SRC", "from-kaggle"))
            .with_search_root(dir.path());

        let value = resolver.resolve(&ResolveRequest::new("DEST").with_source("SRC"));

        assert_eq!(value.as_deref(), Some("from-kaggle"));
        assert_eq!(resolver.env().get("DEST").as_deref(), Some("from-kaggle"));
        assert_eq!(resolver.env().get("SRC"), None);
    }

    #[test]
    fn explicit_dotenv_file_sets_target() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_dotenv(dir.path(), "dotenv", "MY_KEY=hello\n");
        let resolver = no_notebooks(MemoryEnv::new(), dir.path());

        let request = ResolveRequest::new("TARGET")
            .with_source("MY_KEY")
            .with_env_file(path);
        let value = resolver.resolve(&request);

        assert_eq!(value.as_deref(), Some("hello"));
        assert_eq!(resolver.env().get("TARGET").as_deref(), Some("hello"));
    }

    #[test]
    fn discovers_dotenv_in_parent_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let nested = dir.path().join("notebooks").join("week1");
        fs::create_dir_all(&nested).expect("mkdir");
        write_dotenv(dir.path(), "env", "HF_TOKEN=hf_parent\n");
        let resolver = no_notebooks(MemoryEnv::new(), &nested);

        let value = resolver.resolve(&ResolveRequest::default());
        assert_eq!(value.as_deref(), Some("hf_parent"));
    }

    #[test]
    fn empty_dotenv_value_is_a_miss() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_dotenv(dir.path(), ".env", "HF_TOKEN=\n");
        let resolver = no_notebooks(MemoryEnv::new(), dir.path());

        let (value, warnings) = count_warnings(|| resolver.resolve(&ResolveRequest::default()));

        assert_eq!(value, None);
        assert_eq!(warnings, 1);
        assert_eq!(resolver.env().get("HF_TOKEN"), None);
    }

    #[test]
    fn existing_value_survives_when_no_source_touches_it() {
        let dir = tempfile::tempdir().expect("tempdir");
        let resolver = no_notebooks(MemoryEnv::new().with_var("HF_TOKEN", "X"), dir.path());

        let (value, warnings) = count_warnings(|| resolver.resolve(&ResolveRequest::default()));

        assert_eq!(value.as_deref(), Some("X"));
        assert_eq!(warnings, 0);
    }

    #[test]
    fn existing_value_returns_without_warning_when_chain_is_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let resolver =
            Resolver::new(MemoryEnv::new().with_var("HF_TOKEN", "X")).with_search_root(dir.path());

        let (value, warnings) = count_warnings(|| resolver.resolve(&ResolveRequest::default()));

        assert_eq!(value.as_deref(), Some("X"));
        assert_eq!(warnings, 0);
    }

    #[test]
    fn existing_value_is_overwritten_by_a_source() {
        let dir = tempfile::tempdir().expect("tempdir");
        let resolver = Resolver::new(MemoryEnv::new().with_var("HF_TOKEN", "X"))
            .with_notebook_store(InMemorySource::new("colab").with_secret("HF_TOKEN", "Y"))
            .with_search_root(dir.path());

        let value = resolver.resolve(&ResolveRequest::default());
        assert_eq!(value.as_deref(), Some("Y"));
    }

    #[test]
    fn override_restores_previous_value_on_failure() {
        let dir = tempfile::tempdir().expect("tempdir");
        let resolver = no_notebooks(MemoryEnv::new().with_var("HF_TOKEN", "X"), dir.path());

        let request = ResolveRequest::default().override_existing(true);
        let (value, warnings) = count_warnings(|| resolver.resolve(&request));

        assert_eq!(value.as_deref(), Some("X"));
        assert_eq!(resolver.env().get("HF_TOKEN").as_deref(), Some("X"));
        assert_eq!(warnings, 1);
    }

    #[test]
    fn override_keeps_freshly_resolved_value() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_dotenv(dir.path(), ".env", "HF_TOKEN=Y\n");
        let resolver = no_notebooks(MemoryEnv::new().with_var("HF_TOKEN", "X"), dir.path());

        let request = ResolveRequest::default()
            .override_existing(true)
            .with_env_file(path);
        let value = resolver.resolve(&request);

        assert_eq!(value.as_deref(), Some("Y"));
        assert_eq!(resolver.env().get("HF_TOKEN").as_deref(), Some("Y"));
    }

    #[test]
    fn nothing_found_returns_none_with_one_warning() {
        let dir = tempfile::tempdir().expect("tempdir");
        let resolver = no_notebooks(MemoryEnv::new(), dir.path());

        let (value, warnings) =
            count_warnings(|| resolver.resolve(&ResolveRequest::new("MISSING")));

        assert_eq!(value, None);
        assert_eq!(warnings, 1);
        assert_eq!(resolver.env().get("MISSING"), None);
    }

    #[test]
    fn missing_explicit_file_is_a_soft_miss() {
        let dir = tempfile::tempdir().expect("tempdir");
        let resolver = no_notebooks(MemoryEnv::new(), dir.path());

        let request = ResolveRequest::new("T").with_env_file(dir.path().join("nope.env"));
        let (value, warnings) = count_warnings(|| resolver.resolve(&request));

        assert_eq!(value, None);
        assert_eq!(warnings, 1);
    }

    #[test]
    fn fallback_runs_after_dotenv() {
        let dir = tempfile::tempdir().expect("tempdir");
        let resolver = no_notebooks(MemoryEnv::new(), dir.path())
            .with_fallback(InMemorySource::new("keyring").with_secret("HF_TOKEN", "from-keyring"));

        let value = resolver.resolve(&ResolveRequest::default());

        assert_eq!(value.as_deref(), Some("from-keyring"));
        assert_eq!(
            resolver.source_names(),
            vec!["colab", "kaggle", "dotenv", "keyring"]
        );
    }

    #[test]
    fn invalid_targets_never_panic() {
        let dir = tempfile::tempdir().expect("tempdir");
        let resolver = Resolver::new(ProcessEnv)
            .with_notebook_store(InMemorySource::new("colab").with_secret("K", "v"))
            .with_search_root(dir.path());

        for target in ["", "A=B", "NUL\0"] {
            let request = ResolveRequest::new(target)
                .with_source("K")
                .override_existing(true);
            assert_eq!(resolver.resolve(&request), None);
        }
    }

    #[test]
    fn verbose_call_still_resolves() {
        let dir = tempfile::tempdir().expect("tempdir");
        let resolver = Resolver::new(MemoryEnv::new())
            .with_notebook_store(InMemorySource::new("colab").with_secret("HF_TOKEN", "v"))
            .with_search_root(dir.path());

        let value = resolver.resolve(&ResolveRequest::default().verbose(true));
        assert_eq!(value.as_deref(), Some("v"));
    }

    #[test]
    fn misses_render_in_lookup_order() {
        let mut misses = Misses::default();
        misses.push("colab", "colab is not available in this runtime");
        misses.push("dotenv", "no .env file");

        assert_eq!(
            misses.to_string(),
            "colab: colab is not available in this runtime; dotenv: no .env file"
        );
    }

    #[test]
    #[serial]
    fn runtime_resolver_publishes_into_process_env() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_dotenv(dir.path(), "dotenv", "MY_KEY=hello\n");

        temp_env::with_vars_unset(
            ["SETENV_RESOLVER_TARGET", "KAGGLE_USER_SECRETS_TOKEN"],
            || {
                let request = ResolveRequest::new("SETENV_RESOLVER_TARGET")
                    .with_source("MY_KEY")
                    .with_env_file(&path);

                assert_eq!(resolve(&request).as_deref(), Some("hello"));
                assert_eq!(
                    std::env::var("SETENV_RESOLVER_TARGET").as_deref(),
                    Ok("hello")
                );
            },
        );
    }

    #[test]
    #[serial]
    fn runtime_override_restores_process_value() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_dotenv(dir.path(), ".env", "OTHER=1\n");

        temp_env::with_vars(
            [
                ("SETENV_RESOLVER_PREV", Some("X")),
                ("KAGGLE_USER_SECRETS_TOKEN", None),
            ],
            || {
                let request = ResolveRequest::new("SETENV_RESOLVER_PREV")
                    .with_env_file(&path)
                    .override_existing(true);

                assert_eq!(resolve(&request).as_deref(), Some("X"));
                assert_eq!(std::env::var("SETENV_RESOLVER_PREV").as_deref(), Ok("X"));
            },
        );
    }
}
