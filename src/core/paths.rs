//! # Paths
//!
//! Well-known locations and path list handling.

use crate::constants::{CACHE_DIR_NAME, HOME_DIR_NAME, USER_CONFIG_DIR_NAME, USER_CONFIG_FILENAME};
use anyhow::{Result, anyhow};
use std::{env, path::PathBuf};
use thiserror::Error;

/// Represents failures to locate a well-known directory.
#[derive(Error, Debug)]
pub enum PathError {
    /// The platform reports no home directory.
    #[error("Could not find the home directory.")]
    HomeDirNotFound,
}

/// Returns the default compilation cache directory (`~/.gantlet/cache`).
pub fn default_cache_dir() -> Result<PathBuf, PathError> {
    dirs::home_dir()
        .map(|home| home.join(HOME_DIR_NAME).join(CACHE_DIR_NAME))
        .ok_or(PathError::HomeDirNotFound)
}

/// Returns the path of the optional user configuration file
/// (`<config_dir>/gantlet/config.toml`), if the platform has a config directory.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(USER_CONFIG_DIR_NAME).join(USER_CONFIG_FILENAME))
}

/// Expands `~` and environment variables (`$VAR`, `${VAR}`) in a path.
pub fn expand_path(template: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(template)
        .map_err(|e| anyhow!("Failed to expand path '{}': {}", template, e))?;
    Ok(PathBuf::from(expanded.into_owned()))
}

/// Splits a list of directories joined with the host path separator,
/// dropping empty entries.
pub fn split_path_list(list: &str) -> Vec<PathBuf> {
    env::split_paths(list)
        .filter(|path| !path.as_os_str().is_empty())
        .collect()
}

/// Assembles the include search path: library directories first, then
/// classpath entries, then `<tool_home>/lib` when it exists.
pub fn build_search_path(
    lib_dirs: &[PathBuf],
    classpath: &[PathBuf],
    tool_home: Option<PathBuf>,
) -> Vec<PathBuf> {
    let mut search_path: Vec<PathBuf> = Vec::with_capacity(lib_dirs.len() + classpath.len() + 1);
    for dir in lib_dirs.iter().chain(classpath) {
        if !search_path.contains(dir) {
            search_path.push(dir.clone());
        }
    }
    if let Some(lib) = tool_home.map(|home| home.join("lib"))
        && lib.is_dir()
        && !search_path.contains(&lib)
    {
        search_path.push(lib);
    }
    search_path
}
