//! # Environment
//!
//! The binding shared by every part of a run: symbol table, target registry and
//! the I/O endpoints (task facade and output sink). One is created per run and
//! passed explicitly; nothing here is process-global.

use crate::{
    constants::{DEFAULT_TARGET_NAME, DESCRIPTION_SUFFIX, MESSAGE_TAG_WIDTH},
    core::{
        interpreter::ScriptError,
        value::{Target, TargetBody, Value, ValueKind},
    },
    models::OutputLevel,
    system::tasks::{TaskError, TaskExecutor, TaskInvocation},
};
use std::{
    cell::RefCell,
    collections::{BTreeMap, BTreeSet},
    fmt,
    io::{self, Write},
    path::PathBuf,
    rc::Rc,
};

/// Formats `text` behind a `[tag]` right-aligned to a fixed column.
pub fn format_message(tag: &str, text: &str) -> String {
    let padding = MESSAGE_TAG_WIDTH.saturating_sub(tag.chars().count());
    format!("{}[{}] {}", " ".repeat(padding), tag, text)
}

/// The per-run binding. Scripts, builtins, the loader and the dispatcher all
/// read and write through it.
pub struct Environment {
    bindings: BTreeMap<String, Value>,
    /// Documented targets: name -> description. Only used for listing.
    registry: BTreeMap<String, String>,
    /// Targets invoked so far in this run; `depends` skips them.
    executed: BTreeSet<String>,
    search_path: Vec<PathBuf>,
    tasks: Box<dyn TaskExecutor>,
    out: Box<dyn Write>,
    level: OutputLevel,
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("bindings", &self.bindings.keys().collect::<Vec<_>>())
            .field("registry", &self.registry)
            .field("search_path", &self.search_path)
            .field("tasks", &self.tasks)
            .field("level", &self.level)
            .finish_non_exhaustive()
    }
}

impl Environment {
    /// Creates an empty binding that drives `tasks` and writes to `out`.
    pub fn new(tasks: Box<dyn TaskExecutor>, out: Box<dyn Write>, level: OutputLevel) -> Self {
        Self {
            bindings: BTreeMap::new(),
            registry: BTreeMap::new(),
            executed: BTreeSet::new(),
            search_path: Vec::new(),
            tasks,
            out,
            level,
        }
    }

    // --- Bindings ---

    /// Binds `name`, silently replacing any previous value.
    pub fn bind(&mut self, name: &str, value: Value) {
        self.bindings.insert(name.to_string(), value);
    }

    /// Looks up a global binding.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.bindings.get(name).cloned()
    }

    /// Removes every target binding and registry entry.
    pub fn clear_targets(&mut self) {
        let names: Vec<String> = self
            .bindings
            .iter()
            .filter(|(_, value)| value.as_target().is_some())
            .map(|(name, _)| name.clone())
            .collect();
        for name in names {
            self.bindings.remove(&name);
            self.bindings.remove(&format!("{}{}", name, DESCRIPTION_SUFFIX));
        }
        self.registry.clear();
    }

    // --- Registration protocol ---

    /// Registers a target from a single `name: description` pair and a body.
    ///
    /// Binds `name` to the target and `name_description` to the description, and
    /// records documented targets in the registry. Re-registration overwrites.
    pub fn register(
        &mut self,
        pair: &BTreeMap<String, Value>,
        body: TargetBody,
    ) -> Result<Value, ScriptError> {
        let mut entries = pair.iter();
        let (name, description) = match (entries.next(), entries.next()) {
            (Some(entry), None) => entry,
            _ => {
                return Err(ScriptError::Configuration(format!(
                    "Target specified without a name or with more than one name: {}",
                    Value::map(pair.clone())
                )));
            }
        };

        let description = match description.kind() {
            ValueKind::Null => None,
            ValueKind::String(s) if s.is_empty() => None,
            _ => Some(description.to_string()),
        };

        match &description {
            Some(text) => {
                self.registry.insert(name.clone(), text.clone());
            }
            None => {
                self.registry.remove(name);
            }
        }
        self.bind(
            &format!("{}{}", name, DESCRIPTION_SUFFIX),
            description.clone().map_or_else(Value::null, Value::string),
        );

        let target = Value::target(Target {
            name: name.clone(),
            description,
            body,
        });
        self.bind(name, target.clone());
        log::debug!("Registered target '{}'", name);
        Ok(target)
    }

    /// Nominates the default target, given either the target itself or its name.
    pub fn set_default(&mut self, reference: &Value) -> Result<(), ScriptError> {
        let name = match reference.kind() {
            ValueKind::String(name) => match self.bindings.get(name.as_str()) {
                Some(value) if value.as_target().is_some() => name.clone(),
                _ => {
                    return Err(ScriptError::Configuration(format!(
                        "Target {} does not exist so cannot be made the default.",
                        name
                    )));
                }
            },
            ValueKind::Target(target) => self
                .bindings
                .iter()
                .filter(|(key, _)| key.as_str() != DEFAULT_TARGET_NAME)
                .find(|(_, value)| value.as_target().is_some_and(|t| Rc::ptr_eq(t, target)))
                .map(|(key, _)| key.clone())
                .ok_or_else(|| {
                    ScriptError::Configuration(format!(
                        "Target {} is not bound so cannot be made the default.",
                        target.name
                    ))
                })?,
            _ => {
                return Err(ScriptError::Configuration(format!(
                    "Parameter to setdefault is of type {}; expected a target or a target name.",
                    reference.type_name()
                )));
            }
        };

        let mut pair = BTreeMap::new();
        pair.insert(DEFAULT_TARGET_NAME.to_string(), Value::string(name.clone()));
        self.register(&pair, TargetBody::Alias(name))?;
        Ok(())
    }

    /// Documented targets and their descriptions, sorted by name.
    pub fn registry(&self) -> &BTreeMap<String, String> {
        &self.registry
    }

    /// Records that the target `name` has been invoked in this run.
    pub fn mark_executed(&mut self, name: &str) {
        self.executed.insert(name.to_string());
    }

    /// Whether the target `name` has already run.
    pub fn has_executed(&self, name: &str) -> bool {
        self.executed.contains(name)
    }

    // --- Search path ---

    /// Directories searched by `includeTargets` and `includeTool`.
    pub fn search_path(&self) -> &[PathBuf] {
        &self.search_path
    }

    /// Replaces the include search path.
    pub fn set_search_path(&mut self, search_path: Vec<PathBuf>) {
        self.search_path = search_path;
    }

    // --- Output ---

    /// The verbosity selected for this run.
    pub fn output_level(&self) -> OutputLevel {
        self.level
    }

    /// Emits a tagged message such as `   [clean] removing build`.
    pub fn message(&mut self, tag: &str, text: &str) -> io::Result<()> {
        let line = format_message(tag, text);
        self.write_line(&line)
    }

    /// Writes `text` and a newline to the output sink.
    pub fn write_line(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.out, "{}", text)
    }

    /// Writes `text` as is.
    pub fn write(&mut self, text: &str) -> io::Result<()> {
        write!(self.out, "{}", text)
    }

    /// Flushes the output sink.
    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }

    // --- Task facade ---

    /// Runs one task through the facade; its output goes to the run's sink.
    pub fn run_task(&mut self, invocation: &TaskInvocation) -> Result<Option<String>, TaskError> {
        self.tasks.execute(invocation, &mut *self.out)
    }

    /// The task facade.
    pub fn tasks(&self) -> &dyn TaskExecutor {
        self.tasks.as_ref()
    }

    /// The task facade, mutably.
    pub fn tasks_mut(&mut self) -> &mut dyn TaskExecutor {
        self.tasks.as_mut()
    }
}

/// An in-memory output sink that can be read back while the Environment still
/// owns a handle to it.
#[derive(Debug, Clone, Default)]
pub struct SharedOutput(Rc<RefCell<Vec<u8>>>);

impl SharedOutput {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for SharedOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::tasks::SystemTasks;

    fn environment() -> (Environment, SharedOutput) {
        let out = SharedOutput::new();
        let env = Environment::new(
            Box::new(SystemTasks::new(".", true, OutputLevel::Normal)),
            Box::new(out.clone()),
            OutputLevel::Normal,
        );
        (env, out)
    }

    fn pair(name: &str, description: Value) -> BTreeMap<String, Value> {
        let mut map = BTreeMap::new();
        map.insert(name.to_string(), description);
        map
    }

    fn alias() -> TargetBody {
        TargetBody::Alias("noop".to_string())
    }

    #[test]
    fn test_format_message_right_aligns_tag() {
        assert_eq!(format_message("clean", "x"), "    [clean] x");
        assert_eq!(format_message("", "x"), "         [] x");
        assert_eq!(format_message("123456789", "x"), "[123456789] x");
        assert_eq!(format_message("1234567890", "x"), "[1234567890] x");
    }

    #[test]
    fn test_register_binds_target_and_description() {
        let (mut env, _) = environment();
        env.register(&pair("clean", Value::string("Remove build output")), alias())
            .unwrap();

        assert!(env.get("clean").unwrap().as_target().is_some());
        assert_eq!(
            env.get("clean_description").unwrap().as_str(),
            Some("Remove build output")
        );
        assert_eq!(
            env.registry().get("clean").map(String::as_str),
            Some("Remove build output")
        );
    }

    #[test]
    fn test_undocumented_targets_stay_out_of_the_registry() {
        let (mut env, _) = environment();
        env.register(&pair("hidden", Value::string("")), alias()).unwrap();
        env.register(&pair("other", Value::null()), alias()).unwrap();

        assert!(env.registry().is_empty());
        assert!(env.get("hidden").is_some());
        assert!(env.get("hidden_description").unwrap().is_null());
    }

    #[test]
    fn test_reregistration_last_write_wins() {
        let (mut env, _) = environment();
        let first = env.register(&pair("build", Value::string("one")), alias()).unwrap();
        let second = env.register(&pair("build", Value::string("two")), alias()).unwrap();

        assert!(!first.equals(&second));
        assert!(env.get("build").unwrap().equals(&second));
        assert_eq!(env.registry().get("build").map(String::as_str), Some("two"));
    }

    #[test]
    fn test_register_rejects_zero_or_many_names() {
        let (mut env, _) = environment();
        assert!(matches!(
            env.register(&BTreeMap::new(), alias()),
            Err(ScriptError::Configuration(_))
        ));
        let mut two = pair("a", Value::string("x"));
        two.insert("b".to_string(), Value::string("y"));
        assert!(matches!(
            env.register(&two, alias()),
            Err(ScriptError::Configuration(_))
        ));
    }

    #[test]
    fn test_set_default_by_reference_and_by_name() {
        let (mut env, _) = environment();
        let build = env.register(&pair("build", Value::string("Build")), alias()).unwrap();

        env.set_default(&build).unwrap();
        assert_eq!(env.registry().get("default").map(String::as_str), Some("build"));
        let default = env.get("default").unwrap();
        let target = default.as_target().unwrap();
        assert!(matches!(&target.body, TargetBody::Alias(name) if name == "build"));

        env.register(&pair("test", Value::string("Test")), alias()).unwrap();
        env.set_default(&Value::string("test")).unwrap();
        assert_eq!(env.registry().get("default").map(String::as_str), Some("test"));
    }

    #[test]
    fn test_set_default_rejects_unknown_names_and_wrong_kinds() {
        let (mut env, _) = environment();
        assert!(matches!(
            env.set_default(&Value::string("nope")),
            Err(ScriptError::Configuration(_))
        ));
        assert!(matches!(
            env.set_default(&Value::int(3)),
            Err(ScriptError::Configuration(_))
        ));
        // A target value that is not bound anywhere.
        let stray = Value::target(Target {
            name: "stray".to_string(),
            description: None,
            body: alias(),
        });
        assert!(matches!(
            env.set_default(&stray),
            Err(ScriptError::Configuration(_))
        ));
    }

    #[test]
    fn test_message_writes_to_sink() {
        let (mut env, out) = environment();
        env.message("clean", "removing build").unwrap();
        assert_eq!(out.contents(), "    [clean] removing build\n");
    }

    #[test]
    fn test_clear_targets_removes_registrations() {
        let (mut env, _) = environment();
        env.bind("version", Value::string("1.0"));
        env.register(&pair("build", Value::string("Build")), alias()).unwrap();
        env.clear_targets();

        assert!(env.get("build").is_none());
        assert!(env.get("build_description").is_none());
        assert!(env.registry().is_empty());
        assert!(env.get("version").is_some());
    }
}
