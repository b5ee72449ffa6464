//! # Settings
//!
//! Resolves the effective run configuration from its layers, highest priority
//! first: command-line flags, environment variables, the optional user
//! configuration file, built-in defaults.

use crate::core::paths::{self, PathError};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::{fs, path::{Path, PathBuf}};

/// The optional `config.toml` in the user's configuration directory.
#[derive(Deserialize, Debug, Default, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct UserConfig {
    /// Library directories searched by `includeTargets`.
    #[serde(default)]
    pub lib: Vec<String>,
    /// Where compiled scripts are stored.
    pub cache_dir: Option<String>,
    /// Whether the compilation cache is enabled by default.
    pub use_cache: Option<bool>,
}

/// Reads and parses a user configuration file.
pub fn load_user_config(path: &Path) -> Result<UserConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file '{}'", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse configuration file '{}'", path.display()))
}

/// Loads the user configuration from its default location. A missing file is
/// not an error.
pub fn load_default_user_config() -> Result<Option<UserConfig>> {
    match paths::user_config_path() {
        Some(path) if path.is_file() => load_user_config(&path).map(Some),
        _ => Ok(None),
    }
}

/// The settings given on the command line.
#[derive(Debug, Default, Clone)]
pub struct CliSettings {
    /// `-l` values; each may itself hold several path-separator separated dirs.
    pub lib: Vec<String>,
    /// `-P` values, split the same way.
    pub classpath: Vec<String>,
    /// `-c` was given.
    pub use_cache: bool,
    /// `-d` value, before expansion.
    pub cache_dir: Option<String>,
}

/// The fully resolved settings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSettings {
    /// Library directories, bound in scripts as `gantLib`.
    pub lib_dirs: Vec<PathBuf>,
    /// Directories searched by `includeTargets`, in order.
    pub search_path: Vec<PathBuf>,
    /// Whether file-backed scripts go through the compilation cache.
    pub use_cache: bool,
    /// The configured cache directory; `None` means the default one.
    pub cache_dir: Option<PathBuf>,
}

impl RunSettings {
    /// The cache directory to use, falling back to `~/.gantlet/cache`.
    pub fn cache_dir(&self) -> Result<PathBuf, PathError> {
        match &self.cache_dir {
            Some(dir) => Ok(dir.clone()),
            None => paths::default_cache_dir(),
        }
    }
}

/// Merges every layer into the settings of a run.
///
/// `env_var` stands in for the process environment so that the layering can
/// be exercised without touching it.
pub fn resolve(
    cli: &CliSettings,
    env_var: impl Fn(&str) -> Option<String>,
    user: Option<&UserConfig>,
) -> Result<RunSettings> {
    use crate::constants::{LIB_PATH_ENV, TOOL_HOME_ENV};

    let lib_dirs = if !cli.lib.is_empty() {
        cli.lib.iter().flat_map(|list| paths::split_path_list(list)).collect()
    } else if let Some(list) = env_var(LIB_PATH_ENV).filter(|list| !list.is_empty()) {
        paths::split_path_list(&list)
    } else {
        user.map(|config| {
            config
                .lib
                .iter()
                .map(|dir| paths::expand_path(dir))
                .collect::<Result<Vec<_>>>()
        })
        .transpose()?
        .unwrap_or_default()
    };

    let classpath: Vec<PathBuf> = cli
        .classpath
        .iter()
        .flat_map(|list| paths::split_path_list(list))
        .collect();
    let tool_home = env_var(TOOL_HOME_ENV)
        .filter(|home| !home.is_empty())
        .map(PathBuf::from);
    let search_path = paths::build_search_path(&lib_dirs, &classpath, tool_home);

    let use_cache = cli.use_cache || user.and_then(|config| config.use_cache).unwrap_or(false);

    let cache_dir = cli
        .cache_dir
        .as_deref()
        .or_else(|| user.and_then(|config| config.cache_dir.as_deref()))
        .map(paths::expand_path)
        .transpose()?;

    log::debug!(
        "Resolved settings: lib={:?} search_path={:?} use_cache={} cache_dir={:?}",
        lib_dirs,
        search_path,
        use_cache,
        cache_dir
    );

    Ok(RunSettings {
        lib_dirs,
        search_path,
        use_cache,
        cache_dir,
    })
}

/// Splits a `-D name=value` define. A define without `=` binds the empty string.
pub fn parse_define(define: &str) -> (String, String) {
    match define.split_once('=') {
        Some((name, value)) => (name.trim().to_string(), value.to_string()),
        None => (define.trim().to_string(), String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_parse_define() {
        assert_eq!(parse_define("mode=release"), ("mode".to_string(), "release".to_string()));
        assert_eq!(parse_define("url=a=b"), ("url".to_string(), "a=b".to_string()));
        assert_eq!(parse_define("flag"), ("flag".to_string(), String::new()));
    }

    #[test]
    fn test_cli_beats_env_beats_file() {
        let user = UserConfig {
            lib: vec!["/from/file".to_string()],
            cache_dir: Some("/file/cache".to_string()),
            use_cache: Some(true),
        };
        let env = |name: &str| (name == "GANTLET_LIB").then(|| "/from/env".to_string());

        let cli = CliSettings {
            lib: vec!["/from/cli".to_string()],
            cache_dir: Some("/cli/cache".to_string()),
            ..Default::default()
        };
        let settings = resolve(&cli, env, Some(&user)).unwrap();
        assert_eq!(settings.lib_dirs, vec![PathBuf::from("/from/cli")]);
        assert_eq!(settings.cache_dir, Some(PathBuf::from("/cli/cache")));
        assert!(settings.use_cache);

        let settings = resolve(&CliSettings::default(), env, Some(&user)).unwrap();
        assert_eq!(settings.lib_dirs, vec![PathBuf::from("/from/env")]);
        assert_eq!(settings.cache_dir().unwrap(), PathBuf::from("/file/cache"));

        let settings = resolve(&CliSettings::default(), no_env, Some(&user)).unwrap();
        assert_eq!(settings.lib_dirs, vec![PathBuf::from("/from/file")]);
    }

    #[test]
    fn test_defaults() {
        let settings = resolve(&CliSettings::default(), no_env, None).unwrap();
        assert!(settings.lib_dirs.is_empty());
        assert!(settings.search_path.is_empty());
        assert!(!settings.use_cache);
        assert_eq!(settings.cache_dir, None);
        assert!(settings.cache_dir().unwrap().ends_with(".gantlet/cache"));
    }

    #[test]
    fn test_classpath_follows_lib_dirs() {
        let cli = CliSettings {
            lib: vec!["/lib".to_string()],
            classpath: vec!["/cp".to_string()],
            ..Default::default()
        };
        let settings = resolve(&cli, no_env, None).unwrap();
        assert_eq!(settings.search_path, vec![PathBuf::from("/lib"), PathBuf::from("/cp")]);
    }

    #[test]
    fn test_user_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "lib = [\"/a\", \"/b\"]\nuse_cache = true\n").unwrap();
        let config = load_user_config(&path).unwrap();
        assert_eq!(config.lib, vec!["/a", "/b"]);
        assert_eq!(config.use_cache, Some(true));
        assert_eq!(config.cache_dir, None);

        fs::write(&path, "colour = 'blue'\n").unwrap();
        assert!(load_user_config(&path).is_err());
    }
}
