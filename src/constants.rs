//! Names, limits and defaults shared across the crate.

/// The script file looked up when no `--file` option is given.
pub const DEFAULT_SCRIPT_FILENAME: &str = "build.gant";

/// The `--file` value that selects standard input.
pub const STDIN_SCRIPT_ARG: &str = "-";

/// The source name used in diagnostics for scripts read from standard input.
pub const STDIN_SOURCE_NAME: &str = "standard input";

/// The class name given to scripts read from standard input.
pub const STDIN_CLASS_NAME: &str = "standard_input";

/// The file extension of target bundles found on the library search path.
pub const SCRIPT_EXTENSION: &str = "gant";

/// The file extension of compiled script artifacts in the cache directory.
pub const CACHE_ARTIFACT_EXTENSION: &str = "gantc";

/// Directory (inside the home directory) holding the default cache.
pub const HOME_DIR_NAME: &str = ".gantlet";

/// Directory (inside `~/.gantlet`) holding compiled script artifacts.
pub const CACHE_DIR_NAME: &str = "cache";

/// Directory (inside the platform config directory) holding the user configuration.
pub const USER_CONFIG_DIR_NAME: &str = "gantlet";

/// The name of the user configuration file (inside `<config_dir>/gantlet/`).
pub const USER_CONFIG_FILENAME: &str = "config.toml";

/// Environment variable listing default library directories.
pub const LIB_PATH_ENV: &str = "GANTLET_LIB";

/// Environment variable pointing at an external tool installation whose `lib`
/// directory is appended to the search path.
pub const TOOL_HOME_ENV: &str = "GANTLET_TOOL_HOME";

/// The registry and binding name of the default target.
pub const DEFAULT_TARGET_NAME: &str = "default";

/// Suffix of the binding that holds a target's description.
pub const DESCRIPTION_SUFFIX: &str = "_description";

/// Column width used by `message` to right-align its tag.
pub const MESSAGE_TAG_WIDTH: usize = 9;

/// Maximum nesting of target and closure invocations before a run is aborted.
pub const MAX_CALL_DEPTH: usize = 256;

/// Maximum nesting of statements and expressions accepted by the parser.
pub const MAX_NESTING_DEPTH: usize = 128;
