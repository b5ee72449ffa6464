//! The `gantlet` command-line entry point.

use clap::{Parser, error::ErrorKind};
use colored::*;
use gantlet::{
    cli::{Cli, RunError, handlers},
    models::OutputLevel,
};
use std::process;

/// The main entry point of the `gantlet` application.
/// It parses arguments, sets up logging, runs the selected mode and maps the
/// outcome to the process exit code.
fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            // Nothing useful can be done if stderr is gone.
            let _ = e.print();
            process::exit(code);
        }
    };

    init_logging(cli.output_level());
    log::debug!("CLI args parsed: {:?}", cli);

    let code = match run_cli(&cli) {
        Ok(status) => status,
        Err(e) => {
            eprintln!("{}: {}", "Error".red().bold(), e);
            e.exit_code()
        }
    };
    process::exit(code);
}

/// Logs warnings by default; `-v` shows debug output and `-s` only errors.
/// `RUST_LOG` takes precedence over both.
fn init_logging(level: OutputLevel) {
    let default_filter = match level {
        OutputLevel::Silent => "error",
        OutputLevel::Quiet | OutputLevel::Normal => "warn",
        OutputLevel::Verbose => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();
}

fn run_cli(cli: &Cli) -> Result<i32, RunError> {
    if cli.list {
        handlers::list::handle(cli)?;
        Ok(0)
    } else {
        handlers::run::handle(cli)
    }
}
