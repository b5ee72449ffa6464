//! # Tools
//!
//! Built-in tools that `includeTool` binds into a script.

use crate::{
    core::{
        interpreter::{Interpreter, ScriptError},
        value::{BuiltinFn, Value},
    },
    system::tasks::TaskInvocation,
};
use std::path::{Path, PathBuf};

/// A tool that scripts bring into scope with `includeTool("Name")`.
#[derive(Debug)]
pub struct ToolDefinition {
    /// The name the tool is bound under.
    pub name: &'static str,
    /// One line for diagnostics.
    pub description: &'static str,
    methods: &'static [ToolMethod],
}

#[derive(Debug)]
struct ToolMethod {
    name: &'static str,
    handler: BuiltinFn,
}

/// The single source of truth for all built-in tools.
static TOOL_REGISTRY: &[ToolDefinition] = &[
    ToolDefinition {
        name: "Execute",
        description: "Run external commands, through the shell or directly.",
        methods: &[
            ToolMethod {
                name: "executable",
                handler: execute_executable,
            },
            ToolMethod {
                name: "shell",
                handler: execute_shell,
            },
        ],
    },
    ToolDefinition {
        name: "Paths",
        description: "Build and inspect file system paths.",
        methods: &[
            ToolMethod {
                name: "basename",
                handler: paths_basename,
            },
            ToolMethod {
                name: "exists",
                handler: paths_exists,
            },
            ToolMethod {
                name: "isDirectory",
                handler: paths_is_directory,
            },
            ToolMethod {
                name: "join",
                handler: paths_join,
            },
        ],
    },
];

/// Finds a tool by name, case-insensitively.
pub fn find_tool(name: &str) -> Option<&'static ToolDefinition> {
    TOOL_REGISTRY
        .iter()
        .find(|tool| tool.name.eq_ignore_ascii_case(name))
}

/// Names of every built-in tool.
pub fn tool_names() -> impl Iterator<Item = &'static str> {
    TOOL_REGISTRY.iter().map(|tool| tool.name)
}

impl ToolDefinition {
    /// Calls `method` on this tool.
    pub fn call(
        &self,
        interp: &mut Interpreter,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value, ScriptError> {
        let handler = self
            .methods
            .iter()
            .find(|m| m.name == method)
            .map(|m| m.handler)
            .ok_or_else(|| {
                ScriptError::Runtime(format!(
                    "No signature of method: {}.{}() is applicable",
                    self.name, method
                ))
            })?;
        handler(interp, args)
    }
}

fn string_args(method: &str, args: &[Value]) -> Result<Vec<String>, ScriptError> {
    if args.is_empty() {
        return Err(ScriptError::Runtime(format!(
            "{}() requires at least one argument",
            method
        )));
    }
    Ok(args.iter().map(Value::to_string).collect())
}

fn single_path(method: &str, args: &[Value]) -> Result<PathBuf, ScriptError> {
    match string_args(method, args)?.as_slice() {
        [path] => Ok(PathBuf::from(path)),
        _ => Err(ScriptError::Runtime(format!(
            "{}() takes exactly one argument",
            method
        ))),
    }
}

// --- Execute ---

fn run_exec(interp: &mut Interpreter, command: String, shell: bool) -> Result<Value, ScriptError> {
    let invocation = TaskInvocation::new("exec")
        .with_attribute("command", command)
        .with_attribute("failonerror", "true")
        .with_attribute("shell", if shell { "true" } else { "false" });
    interp.env_mut().run_task(&invocation)?;
    Ok(Value::null())
}

fn execute_shell(interp: &mut Interpreter, args: Vec<Value>) -> Result<Value, ScriptError> {
    let command = string_args("shell", &args)?.join(" ");
    run_exec(interp, command, true)
}

fn execute_executable(interp: &mut Interpreter, args: Vec<Value>) -> Result<Value, ScriptError> {
    let command = string_args("executable", &args)?.join(" ");
    run_exec(interp, command, false)
}

// --- Paths ---

fn paths_join(_: &mut Interpreter, args: Vec<Value>) -> Result<Value, ScriptError> {
    let joined: PathBuf = string_args("join", &args)?.iter().collect();
    Ok(Value::string(joined.display().to_string()))
}

fn paths_exists(_: &mut Interpreter, args: Vec<Value>) -> Result<Value, ScriptError> {
    Ok(Value::bool(single_path("exists", &args)?.exists()))
}

fn paths_is_directory(_: &mut Interpreter, args: Vec<Value>) -> Result<Value, ScriptError> {
    Ok(Value::bool(single_path("isDirectory", &args)?.is_dir()))
}

fn paths_basename(_: &mut Interpreter, args: Vec<Value>) -> Result<Value, ScriptError> {
    let path = single_path("basename", &args)?;
    Ok(Path::new(&path)
        .file_name()
        .map_or_else(Value::null, |name| {
            Value::string(name.to_string_lossy().into_owned())
        }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_tool_ignores_case() {
        assert_eq!(find_tool("execute").map(|t| t.name), Some("Execute"));
        assert_eq!(find_tool("Paths").map(|t| t.name), Some("Paths"));
        assert!(find_tool("Maven").is_none());
    }

    #[test]
    fn test_registry_is_sorted_and_unique() {
        let names: Vec<&str> = tool_names().collect();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(names, sorted);
        for tool in TOOL_REGISTRY {
            let methods: Vec<&str> = tool.methods.iter().map(|m| m.name).collect();
            let mut sorted = methods.clone();
            sorted.sort_unstable();
            sorted.dedup();
            assert_eq!(methods, sorted, "methods of {} must be sorted", tool.name);
        }
    }
}
