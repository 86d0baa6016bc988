use std::{
    env,
    process::{self, ExitCode},
};

use color_eyre::Result;
use setenv_core::{environment::ProcessEnv, request::ResolveRequest};
use setenv_resolver::Resolver;
use setenv_sources::{dotenv, ColabUserdata, KaggleSecrets, KeyringSource};
use tracing::{debug, info};

use crate::{cli::ResolveArgs, config::Config};

/// Build the runtime resolver with config overrides applied.
pub fn resolver_from_config(config: &Config) -> Resolver {
    let kaggle = KaggleSecrets::from_env().with_timeout(config.kaggle_timeout());
    let resolver = Resolver::new(ProcessEnv)
        .with_notebook_store(ColabUserdata::new())
        .with_notebook_store(kaggle)
        .with_dotenv_names(config.dotenv_names());

    match &config.keyring {
        Some(keyring) => {
            debug!(service = %keyring.service, "keyring fallback enabled");
            resolver.with_fallback(KeyringSource::new(&keyring.service))
        }
        None => resolver,
    }
}

pub fn request_from_args(args: &ResolveArgs, config: &Config) -> ResolveRequest {
    ResolveRequest {
        target: args
            .target
            .clone()
            .unwrap_or_else(|| config.target().to_string()),
        source: args.source.clone(),
        env_file: args.env_file.clone(),
        override_existing: args.override_existing,
        verbose: args.verbose,
    }
}

/// `setenv get`: resolve and report.
pub fn get(args: &ResolveArgs, reveal: bool, config: &Config) -> Result<ExitCode> {
    let request = request_from_args(args, config);
    let value = resolver_from_config(config).resolve(&request);
    println!("{}", describe(&request.target, value.as_deref(), reveal));
    Ok(if value.is_some() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// `setenv run`: resolve, then hand the updated environment to a child process.
pub fn run(args: &ResolveArgs, command: &[String], config: &Config) -> Result<ExitCode> {
    let (program, rest) = command
        .split_first()
        .ok_or_else(|| color_eyre::eyre::eyre!("no command given"))?;

    let request = request_from_args(args, config);
    let resolved = resolver_from_config(config).resolve(&request).is_some();
    info!(target_var = %request.target, resolved, "launching {program}");

    let status = process::Command::new(program).args(rest).status()?;
    Ok(match status.code() {
        Some(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        None => ExitCode::FAILURE,
    })
}

/// `setenv locate`: show the dotenv file discovery picks from the working directory.
pub fn locate(config: &Config) -> Result<ExitCode> {
    let cwd = env::current_dir()?;
    match dotenv::find_dotenv(&cwd, &config.dotenv_names()) {
        Some(path) => {
            println!("{}", path.display());
            Ok(ExitCode::SUCCESS)
        }
        None => {
            println!(
                "No {} file in {} or its parents.",
                config.dotenv_names().join("/"),
                cwd.display()
            );
            Ok(ExitCode::FAILURE)
        }
    }
}

fn describe(target: &str, value: Option<&str>, reveal: bool) -> String {
    match value {
        Some(value) if reveal => format!("{target}={value}"),
        Some(value) => format!("{target} is set ({} chars)", value.chars().count()),
        None => format!("{target} is not set"),
    }
}
