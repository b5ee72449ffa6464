//! `-p`: load the script and list its documented targets.

use crate::{
    cli::{Cli, RunError, handlers::commons},
    core::{dispatcher, settings::RunSettings},
};
use anyhow::Context;
use std::io::{self, Read, Write};

/// Loads the script and prints its documented targets instead of running them.
pub fn handle(cli: &Cli) -> Result<(), RunError> {
    let settings = commons::resolve_settings(cli)?;
    list_with(cli, &settings, Box::new(io::stdout()), io::stdin())
}

/// `handle` with the settings and I/O endpoints given explicitly.
pub fn list_with(
    cli: &Cli,
    settings: &RunSettings,
    out: Box<dyn Write>,
    input: impl Read,
) -> Result<(), RunError> {
    let mut interp = commons::load(cli, settings, out, input)?;
    dispatcher::list_targets(&mut interp).context("Failed to write output")?;
    Ok(())
}
