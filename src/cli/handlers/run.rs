//! The default mode: load the script and dispatch targets.

use crate::{
    cli::{Cli, RunError, handlers::commons},
    core::{dispatcher, settings::RunSettings},
};
use anyhow::Context;
use std::io::{self, Read, Write};

/// Loads the script and runs the requested targets. Returns the dispatch status.
pub fn handle(cli: &Cli) -> Result<i32, RunError> {
    let settings = commons::resolve_settings(cli)?;
    run_with(cli, &settings, Box::new(io::stdout()), io::stdin())
}

/// `handle` with the settings and I/O endpoints given explicitly.
pub fn run_with(
    cli: &Cli,
    settings: &RunSettings,
    out: Box<dyn Write>,
    input: impl Read,
) -> Result<i32, RunError> {
    let mut interp = commons::load(cli, settings, out, input)?;
    let status = dispatcher::dispatch(&mut interp, &cli.targets)
        .context("Failed to write output")?;
    interp.env_mut().flush().context("Failed to write output")?;
    Ok(status)
}
