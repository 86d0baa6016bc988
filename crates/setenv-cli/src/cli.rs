use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// CLI surface definition.
#[derive(Parser, Debug)]
#[command(
    name = "setenv",
    about = "Resolve a secret from notebook stores or a dotenv file into the environment",
    version,
    propagate_version = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Options shared by every command that resolves a secret.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveArgs {
    /// Variable to set; defaults to the configured target (HF_TOKEN).
    pub target: Option<String>,
    /// Key to look up in each source; defaults to TARGET.
    #[arg(short, long)]
    pub source: Option<String>,
    /// Read this dotenv file instead of searching for .env/dotenv/env.
    #[arg(short = 'f', long)]
    pub env_file: Option<PathBuf>,
    /// Ignore an existing value while resolving (restored if nothing resolves).
    #[arg(long = "override")]
    pub override_existing: bool,
    /// Trace every source lookup to stderr.
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Resolve a secret and report whether it is set.
    Get {
        #[command(flatten)]
        args: ResolveArgs,
        /// Print the value itself instead of its length.
        #[arg(long)]
        reveal: bool,
    },
    /// Resolve a secret, then run a command with it in the environment.
    Run {
        #[command(flatten)]
        args: ResolveArgs,
        /// Command and arguments, after `--`.
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
    /// Print the dotenv file discovery would use.
    Locate,
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Print version and exit.
    Version,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
}
