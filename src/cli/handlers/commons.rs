//! Shared setup for the handlers: settings resolution and script loading.

use crate::{
    cli::{Cli, RunError},
    constants::STDIN_SCRIPT_ARG,
    core::{
        environment::Environment,
        interpreter::Interpreter,
        loader::{self, CacheSettings, ScriptSource},
        settings::{self, CliSettings, RunSettings},
        value::Value,
    },
    system::tasks::SystemTasks,
};
use anyhow::{Context, anyhow};
use std::{
    env,
    io::{Read, Write},
    path::PathBuf,
};

/// Resolves the run settings from the command line, the process environment
/// and the user configuration file.
pub fn resolve_settings(cli: &Cli) -> Result<RunSettings, RunError> {
    let user = settings::load_default_user_config()?;
    let cli_settings = CliSettings {
        lib: cli.gantlib.clone(),
        classpath: cli.classpath.clone(),
        use_cache: cli.use_cache,
        cache_dir: cli.cache_dir.clone(),
    };
    Ok(settings::resolve(
        &cli_settings,
        |name| env::var(name).ok(),
        user.as_ref(),
    )?)
}

/// Builds the Environment for a run, applies defines and loads the script.
///
/// `input` is only read when the script comes from standard input.
pub fn load(
    cli: &Cli,
    settings: &RunSettings,
    out: Box<dyn Write>,
    mut input: impl Read,
) -> Result<Interpreter, RunError> {
    let base_dir = env::current_dir().context("Failed to determine the current directory")?;
    let tasks = SystemTasks::new(base_dir, cli.dry_run, cli.output_level());
    let mut env = Environment::new(Box::new(tasks), out, cli.output_level());
    env.set_search_path(settings.search_path.clone());
    env.bind(
        "gantLib",
        Value::list(
            settings
                .lib_dirs
                .iter()
                .map(|dir| Value::string(dir.display().to_string()))
                .collect(),
        ),
    );

    for define in &cli.defines {
        let (name, value) = settings::parse_define(define);
        if name.is_empty() {
            return Err(anyhow!("Invalid define '{}': expected NAME=VALUE", define).into());
        }
        log::debug!("Defining '{}' = '{}'", name, value);
        env.tasks_mut().set_property(&name, &value);
        env.bind(&name, Value::string(value));
    }

    let source = if cli.file == STDIN_SCRIPT_ARG {
        let mut text = String::new();
        input
            .read_to_string(&mut text)
            .context("Failed to read the script from standard input")?;
        ScriptSource::Stdin(text)
    } else {
        ScriptSource::File(PathBuf::from(&cli.file))
    };
    let cache = cache_settings(cli, settings, &source)?;

    let mut interp = Interpreter::new(env);
    let outcome = loader::load_script(&mut interp, &source, &cache)?;
    log::debug!("Script loaded: {:?}", outcome);
    Ok(interp)
}

/// A configured cache default applies to script files only; a script read from
/// standard input is cached only when `-c` asks for it, which the loader rejects.
fn cache_settings(
    cli: &Cli,
    settings: &RunSettings,
    source: &ScriptSource,
) -> Result<CacheSettings, RunError> {
    match source {
        ScriptSource::Stdin(_) => Ok(CacheSettings {
            enabled: cli.use_cache,
            dir: PathBuf::new(),
        }),
        ScriptSource::File(_) if settings.use_cache => Ok(CacheSettings {
            enabled: true,
            dir: settings
                .cache_dir()
                .context("Cannot determine the cache directory")?,
        }),
        ScriptSource::File(_) => Ok(CacheSettings::default()),
    }
}
