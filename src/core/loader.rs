//! # Loader
//!
//! Gets a script from its source into the Environment: reads it, consults the
//! compilation cache, compiles when needed and evaluates the result. After a
//! successful load every target of the script is bound and documented targets
//! are in the registry.
//!
//! Also resolves and evaluates target bundles pulled in with `includeTargets`.

use crate::{
    constants::SCRIPT_EXTENSION,
    core::{
        cache::{self, CacheLookup},
        compiler::{self, CompileError},
        interpreter::{Interpreter, ScriptError},
        value::Value,
    },
    models::ScriptUnit,
};
use log::{debug, warn};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

/// Where the main script comes from.
#[derive(Debug, Clone)]
pub enum ScriptSource {
    /// A script file on disk.
    File(PathBuf),
    /// Script text already read from standard input.
    Stdin(String),
}

/// Compilation cache configuration for a run.
#[derive(Debug, Clone, Default)]
pub struct CacheSettings {
    /// Whether to consult and refresh the cache.
    pub enabled: bool,
    /// Where artifacts live; unused when disabled.
    pub dir: PathBuf,
}

/// How the main script was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// A valid cached unit was evaluated without compiling.
    CacheHit,
    /// The source was compiled. `cached` tells whether a fresh artifact was written.
    Compiled {
        /// Whether the artifact was written.
        cached: bool,
    },
    /// The cached artifact was unusable; the source was compiled and evaluated directly.
    Recovered,
}

/// Represents failures to load the main script.
#[derive(Error, Debug)]
pub enum LoadError {
    /// Unreadable script file or an invalid cache request. Exits with 1.
    #[error("{0}")]
    Configuration(String),
    /// The script does not compile. Exits with 2.
    #[error(transparent)]
    Compile(#[from] CompileError),
    /// Evaluating the script failed. Exits with 2.
    #[error(transparent)]
    Script(#[from] ScriptError),
}

/// Loads the main script into `interp`.
pub fn load_script(
    interp: &mut Interpreter,
    source: &ScriptSource,
    cache_settings: &CacheSettings,
) -> Result<LoadOutcome, LoadError> {
    match source {
        ScriptSource::Stdin(text) => {
            if cache_settings.enabled {
                return Err(LoadError::Configuration(
                    "Caching can only be used with a script file, not standard input.".to_string(),
                ));
            }
            let unit = compiler::compile_source(
                text,
                &compiler::source_name_for(None),
                &compiler::derive_class_name(None),
            )?;
            interp.run_unit(&unit)?;
            Ok(LoadOutcome::Compiled { cached: false })
        }
        ScriptSource::File(path) => {
            let text = fs::read_to_string(path).map_err(|e| {
                LoadError::Configuration(format!("Cannot open file {}: {}", path.display(), e))
            })?;
            let script_path = dunce::canonicalize(path).unwrap_or_else(|_| path.clone());
            interp.enter_script(&script_path);
            let result = load_file(interp, path, &text, cache_settings);
            interp.leave_script();
            result
        }
    }
}

fn load_file(
    interp: &mut Interpreter,
    path: &Path,
    text: &str,
    cache_settings: &CacheSettings,
) -> Result<LoadOutcome, LoadError> {
    let class_name = compiler::derive_class_name(Some(path));
    let source_name = compiler::source_name_for(Some(path));

    if !cache_settings.enabled {
        let unit = compiler::compile_source(text, &source_name, &class_name)?;
        interp.run_unit(&unit)?;
        return Ok(LoadOutcome::Compiled { cached: false });
    }

    let lookup = match cache::modified_time(path) {
        Ok(source_modified) => cache::lookup(&cache_settings.dir, &class_name, source_modified),
        Err(e) => CacheLookup::Failed(e),
    };

    let outcome = match lookup {
        CacheLookup::Hit(unit) => {
            interp.run_unit(&unit)?;
            return Ok(LoadOutcome::CacheHit);
        }
        CacheLookup::Stale | CacheLookup::Missing => {
            let unit = compiler::compile_source(text, &source_name, &class_name)?;
            let cached = store_best_effort(&cache_settings.dir, &unit);
            interp.run_unit(&unit)?;
            LoadOutcome::Compiled { cached }
        }
        CacheLookup::Failed(e) => {
            warn!(
                "Ignoring unusable cache entry for '{}': {}",
                source_name, e
            );
            let unit = compiler::compile_source(text, &source_name, &class_name)?;
            store_best_effort(&cache_settings.dir, &unit);
            interp.run_unit(&unit)?;
            LoadOutcome::Recovered
        }
    };
    Ok(outcome)
}

/// Writes the artifact, absorbing failures. Returns whether it was written.
fn store_best_effort(cache_dir: &Path, unit: &ScriptUnit) -> bool {
    match cache::store(cache_dir, unit) {
        Ok(_) => true,
        Err(e) => {
            warn!("Could not write cache entry for '{}': {}", unit.class_name, e);
            false
        }
    }
}

// --- Includes ---

/// Resolves the argument of `includeTargets` to a script file.
///
/// Paths are tried relative to the including script and to the working
/// directory; bare names are looked up as `<dir>/<name>.gant` along the search path.
pub fn resolve_include(interp: &Interpreter, reference: &str) -> Result<PathBuf, ScriptError> {
    let as_path = Path::new(reference);
    let mut candidates = Vec::new();
    if as_path.is_absolute() {
        candidates.push(as_path.to_path_buf());
    } else {
        if let Some(dir) = interp.current_script_dir() {
            candidates.push(dir.join(as_path));
        }
        candidates.push(as_path.to_path_buf());
    }
    let file_name = format!("{}.{}", reference, SCRIPT_EXTENSION);
    candidates.extend(
        interp
            .env()
            .search_path()
            .iter()
            .map(|dir| dir.join(&file_name)),
    );

    debug!("Resolving include '{}' among {:?}", reference, candidates);
    candidates
        .into_iter()
        .find(|candidate| candidate.is_file())
        .map(|found| dunce::canonicalize(&found).unwrap_or(found))
        .ok_or_else(|| {
            ScriptError::Configuration(format!(
                "Cannot find targets script '{}' on the search path",
                reference
            ))
        })
}

/// Compiles (uncached) and evaluates a target bundle into the running
/// Environment. Named parameters are bound first. A bundle that is already
/// being evaluated is skipped.
pub fn include_script(
    interp: &mut Interpreter,
    path: &Path,
    params: BTreeMap<String, Value>,
) -> Result<(), ScriptError> {
    if !interp.enter_script(path) {
        warn!("Skipping recursive include of '{}'", path.display());
        return Ok(());
    }
    let result = evaluate_include(interp, path, params);
    interp.leave_script();
    result
}

fn evaluate_include(
    interp: &mut Interpreter,
    path: &Path,
    params: BTreeMap<String, Value>,
) -> Result<(), ScriptError> {
    for (name, value) in params {
        interp.env_mut().bind(&name, value);
    }
    let text = fs::read_to_string(path).map_err(|source| ScriptError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let unit = compiler::compile_source(
        &text,
        &compiler::source_name_for(Some(path)),
        &compiler::derive_class_name(Some(path)),
    )?;
    debug!("Including targets from '{}'", path.display());
    interp.run_unit(&unit)
}
