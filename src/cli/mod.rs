//! # Command Line
//!
//! Argument definitions and the failures that decide the exit code.

use crate::{constants::DEFAULT_SCRIPT_FILENAME, core::loader::LoadError, models::OutputLevel};
use clap::Parser;
use thiserror::Error;

pub mod handlers;

/// gantlet: run the targets declared in a build script.
///
/// Targets are named, described units of work declared with
/// `target(name: 'description') { ... }`. With no target arguments the
/// script's default target runs.
#[derive(Parser, Debug)]
#[command(name = "gantlet", author, version, about, long_about = None)]
#[command(disable_help_subcommand = true)]
pub struct Cli {
    /// The script to run; `-` reads it from standard input.
    #[arg(short = 'f', long = "file", value_name = "FILE", default_value = DEFAULT_SCRIPT_FILENAME)]
    pub file: String,

    /// Directories searched by `includeTargets` (path-separator separated).
    #[arg(short = 'l', long = "gantlib", value_name = "DIRS")]
    pub gantlib: Vec<String>,

    /// Extra search path entries, searched after the library directories.
    #[arg(short = 'P', long = "classpath", value_name = "PATHS")]
    pub classpath: Vec<String>,

    /// Define a property, bound as a string in the script (e.g., "mode=release").
    #[arg(short = 'D', long = "define", value_name = "NAME=VALUE")]
    pub defines: Vec<String>,

    /// Cache the compiled script and reuse it while the script is unchanged.
    #[arg(short = 'c', long = "usecache")]
    pub use_cache: bool,

    /// Directory for compiled scripts (defaults to ~/.gantlet/cache).
    #[arg(short = 'd', long = "cachedir", value_name = "DIR")]
    pub cache_dir: Option<String>,

    /// Report what tasks would do without doing it.
    #[arg(short = 'n', long = "dry-run")]
    pub dry_run: bool,

    /// Print less output.
    #[arg(short = 'q', long, conflicts_with_all = ["silent", "verbose"])]
    pub quiet: bool,

    /// Print nothing but the script's own output.
    #[arg(short = 's', long, conflicts_with = "verbose")]
    pub silent: bool,

    /// Print more output, including debug logging.
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// List the documented targets instead of running any.
    #[arg(
        short = 'p',
        long = "projecthelp",
        visible_short_alias = 'T',
        visible_alias = "targets"
    )]
    pub list: bool,

    /// The targets to run, in order.
    #[arg(value_name = "TARGET")]
    pub targets: Vec<String>,
}

impl Cli {
    /// The verbosity selected by `-s`, `-q` or `-v`.
    pub fn output_level(&self) -> OutputLevel {
        if self.silent {
            OutputLevel::Silent
        } else if self.quiet {
            OutputLevel::Quiet
        } else if self.verbose {
            OutputLevel::Verbose
        } else {
            OutputLevel::Normal
        }
    }
}

/// Failures that end a run before or while its script is loaded.
#[derive(Error, Debug)]
pub enum RunError {
    /// Bad settings, unreadable script, invalid cache request.
    #[error(transparent)]
    Configuration(#[from] anyhow::Error),
    /// The script failed to compile or evaluate.
    #[error(transparent)]
    Script(LoadError),
}

impl RunError {
    /// The process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) => 1,
            Self::Script(_) => 2,
        }
    }
}

impl From<LoadError> for RunError {
    fn from(error: LoadError) -> Self {
        match error {
            LoadError::Configuration(message) => Self::Configuration(anyhow::anyhow!(message)),
            other => Self::Script(other),
        }
    }
}
