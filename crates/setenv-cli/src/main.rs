mod cli;
mod config;
mod resolve;

use std::process::ExitCode;

use clap::Parser;
use color_eyre::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::{Command, ConfigCommand};

fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    init_tracing();

    let cli = cli::Cli::parse();
    let config = config::load()?;
    match cli.command {
        Command::Get { args, reveal } => resolve::get(&args, reveal, &config),
        Command::Run { args, command } => resolve::run(&args, &command, &config),
        Command::Locate => resolve::locate(&config),
        Command::Config(ConfigCommand::Init) => init_config(),
        Command::Version => {
            print_version();
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn init_tracing() {
    // Respect user-provided filters; otherwise only the resolution failure warning shows.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn print_version() {
    println!("setenv {}", env!("CARGO_PKG_VERSION"));
}

fn init_config() -> Result<ExitCode> {
    let path = config::write_default_if_missing(&config::Config::starter())?;
    println!("Config initialized at {}", path.display());
    Ok(ExitCode::SUCCESS)
}
