//! # Tasks
//!
//! The task library scripts drive through `ant`, and the trait it sits behind.

use crate::{core::environment::format_message, models::OutputLevel, system::executor};
use std::{
    collections::BTreeMap,
    fmt,
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    time::SystemTime,
};
use thiserror::Error;
use walkdir::WalkDir;

use super::executor::ExecutionError;

/// Represents failures of a single task.
#[derive(Error, Debug)]
pub enum TaskError {
    /// No task has this name.
    #[error("Problem: failed to create task or type {0}")]
    UnknownTask(String),
    /// A required attribute was not given.
    #[error("{task} task requires attribute '{attribute}'")]
    MissingAttribute {
        /// The task being run.
        task: String,
        /// The attribute it needs.
        attribute: String,
    },
    /// A file operation failed.
    #[error("{task} failed for '{path}': {source}")]
    Io {
        /// The task being run.
        task: String,
        /// The file it was working on.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// An `exec` task could not run its command, or the command failed.
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    /// Raised by the `fail` task.
    #[error("{0}")]
    Failed(String),
    /// Writing task chatter to the output sink failed.
    #[error("Failed to write task output: {0}")]
    Output(#[source] io::Error),
}

/// A single task call: `ant.mkdir(dir: "build")` becomes the invocation `mkdir`
/// with attribute `dir = "build"`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskInvocation {
    /// The task name, e.g. `mkdir`.
    pub name: String,
    /// Named arguments, stringified.
    pub attributes: BTreeMap<String, String>,
    /// A positional string argument, used as nested text (`ant.echo("hi")`).
    pub text: Option<String>,
}

impl TaskInvocation {
    /// An invocation of `name` without attributes.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Adds an attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// The attribute `key`, if given.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// The attribute `key`, failing the task when it is absent.
    pub fn required(&self, key: &str) -> Result<&str, TaskError> {
        self.attribute(key).ok_or_else(|| TaskError::MissingAttribute {
            task: self.name.clone(),
            attribute: key.to_string(),
        })
    }

    fn flag(&self, key: &str, default: bool) -> bool {
        self.attribute(key)
            .map_or(default, |v| matches!(v, "true" | "yes" | "on"))
    }
}

/// The narrow interface through which scripts reach the task-execution library.
pub trait TaskExecutor: fmt::Debug {
    /// Runs one task, writing its chatter to `out`. Some tasks produce a value.
    fn execute(
        &mut self,
        invocation: &TaskInvocation,
        out: &mut dyn Write,
    ) -> Result<Option<String>, TaskError>;

    /// Sets a property, overwriting any previous value.
    fn set_property(&mut self, name: &str, value: &str);

    /// Reads a property.
    fn property(&self, name: &str) -> Option<&str>;

    /// Every property, sorted by name.
    fn properties(&self) -> &BTreeMap<String, String>;
}

/// The built-in task library: file operations and process execution on the
/// local system.
#[derive(Debug)]
pub struct SystemTasks {
    base_dir: PathBuf,
    dry_run: bool,
    level: OutputLevel,
    properties: BTreeMap<String, String>,
}

impl SystemTasks {
    /// Tasks resolve relative paths against `base_dir`. With `dry_run` nothing
    /// touches the file system or spawns processes.
    pub fn new(base_dir: impl Into<PathBuf>, dry_run: bool, level: OutputLevel) -> Self {
        Self {
            base_dir: base_dir.into(),
            dry_run,
            level,
            properties: BTreeMap::new(),
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    fn say(
        &self,
        out: &mut dyn Write,
        min_level: OutputLevel,
        tag: &str,
        text: &str,
    ) -> Result<(), TaskError> {
        if self.level < min_level {
            return Ok(());
        }
        for line in text.lines() {
            writeln!(out, "{}", format_message(tag, line)).map_err(TaskError::Output)?;
        }
        Ok(())
    }

    /// In dry-run mode, reports the task instead of running it and returns `true`.
    fn skipped(
        &self,
        invocation: &TaskInvocation,
        out: &mut dyn Write,
        summary: &str,
    ) -> Result<bool, TaskError> {
        if !self.dry_run {
            return Ok(false);
        }
        log::debug!("Dry run: skipping task '{}'", invocation.name);
        self.say(
            out,
            OutputLevel::Normal,
            &invocation.name,
            &format!("(dry run) {}", summary),
        )?;
        Ok(true)
    }

    fn echo(&self, inv: &TaskInvocation, out: &mut dyn Write) -> Result<Option<String>, TaskError> {
        let message = inv
            .attribute("message")
            .or(inv.text.as_deref())
            .unwrap_or_default();
        self.say(out, OutputLevel::Quiet, "echo", message)?;
        Ok(None)
    }

    fn mkdir(&self, inv: &TaskInvocation, out: &mut dyn Write) -> Result<Option<String>, TaskError> {
        let dir = self.resolve(inv.required("dir")?);
        if dir.is_dir() || self.skipped(inv, out, &format!("mkdir {}", dir.display()))? {
            return Ok(None);
        }
        fs::create_dir_all(&dir).map_err(|source| io_error(inv, &dir, source))?;
        self.say(
            out,
            OutputLevel::Normal,
            "mkdir",
            &format!("Created dir: {}", dir.display()),
        )?;
        Ok(None)
    }

    fn delete(&self, inv: &TaskInvocation, out: &mut dyn Write) -> Result<Option<String>, TaskError> {
        let target = match (inv.attribute("dir"), inv.attribute("file")) {
            (Some(dir), _) => self.resolve(dir),
            (None, Some(file)) => self.resolve(file),
            (None, None) => return Err(missing(inv, "dir")),
        };
        if !target.exists() || self.skipped(inv, out, &format!("delete {}", target.display()))? {
            return Ok(None);
        }
        let removed = if target.is_dir() {
            self.say(
                out,
                OutputLevel::Normal,
                "delete",
                &format!("Deleting directory {}", target.display()),
            )?;
            fs::remove_dir_all(&target)
        } else {
            self.say(
                out,
                OutputLevel::Normal,
                "delete",
                &format!("Deleting: {}", target.display()),
            )?;
            fs::remove_file(&target)
        };
        removed.map_err(|source| io_error(inv, &target, source))?;
        Ok(None)
    }

    fn copy(&self, inv: &TaskInvocation, out: &mut dyn Write) -> Result<Option<String>, TaskError> {
        let copies = self.copy_plan(inv)?;
        if self.skipped(inv, out, &format!("copy {} file(s)", copies.len()))? {
            return Ok(None);
        }
        let Some((_, first_dest)) = copies.first() else {
            return Ok(None);
        };
        let dest_dir = first_dest
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        self.say(
            out,
            OutputLevel::Normal,
            "copy",
            &format!(
                "Copying {} file{} to {}",
                copies.len(),
                if copies.len() == 1 { "" } else { "s" },
                dest_dir.display()
            ),
        )?;
        for (from, to) in &copies {
            if let Some(parent) = to.parent() {
                fs::create_dir_all(parent).map_err(|source| io_error(inv, parent, source))?;
            }
            fs::copy(from, to).map_err(|source| io_error(inv, from, source))?;
        }
        Ok(None)
    }

    /// Resolves the `(source, destination)` file pairs of a copy or move.
    fn copy_plan(&self, inv: &TaskInvocation) -> Result<Vec<(PathBuf, PathBuf)>, TaskError> {
        if let Some(file) = inv.attribute("file") {
            let from = self.resolve(file);
            let to = match (inv.attribute("tofile"), inv.attribute("todir")) {
                (Some(tofile), _) => self.resolve(tofile),
                (None, Some(todir)) => {
                    let name = from.file_name().unwrap_or_default();
                    self.resolve(todir).join(name)
                }
                (None, None) => return Err(missing(inv, "tofile")),
            };
            if !from.is_file() {
                return Err(io_error(
                    inv,
                    &from,
                    io::Error::new(io::ErrorKind::NotFound, "source file does not exist"),
                ));
            }
            return Ok(vec![(from, to)]);
        }

        let from_dir = self.resolve(inv.required("dir")?);
        let to_dir = self.resolve(inv.required("todir")?);
        let mut pairs = Vec::new();
        for entry in WalkDir::new(&from_dir).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_default();
                io_error(inv, &path, io::Error::other(e.to_string()))
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Ok(relative) = entry.path().strip_prefix(&from_dir) {
                pairs.push((entry.path().to_path_buf(), to_dir.join(relative)));
            }
        }
        Ok(pairs)
    }

    fn move_file(&self, inv: &TaskInvocation, out: &mut dyn Write) -> Result<Option<String>, TaskError> {
        let moves = self.copy_plan(inv)?;
        if self.skipped(inv, out, &format!("move {} file(s)", moves.len()))? {
            return Ok(None);
        }
        for (from, to) in &moves {
            self.say(
                out,
                OutputLevel::Normal,
                "move",
                &format!("Moving {} to {}", from.display(), to.display()),
            )?;
            if let Some(parent) = to.parent() {
                fs::create_dir_all(parent).map_err(|source| io_error(inv, parent, source))?;
            }
            if fs::rename(from, to).is_err() {
                fs::copy(from, to).map_err(|source| io_error(inv, from, source))?;
                fs::remove_file(from).map_err(|source| io_error(inv, from, source))?;
            }
        }
        Ok(None)
    }

    fn touch(&self, inv: &TaskInvocation, out: &mut dyn Write) -> Result<Option<String>, TaskError> {
        let file = self.resolve(inv.required("file")?);
        if self.skipped(inv, out, &format!("touch {}", file.display()))? {
            return Ok(None);
        }
        if !file.exists() {
            self.say(
                out,
                OutputLevel::Normal,
                "touch",
                &format!("Creating {}", file.display()),
            )?;
        }
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&file)
            .and_then(|f| f.set_modified(SystemTime::now()))
            .map_err(|source| io_error(inv, &file, source))?;
        Ok(None)
    }

    fn exec(&mut self, inv: &TaskInvocation, out: &mut dyn Write) -> Result<Option<String>, TaskError> {
        let command_line = match (inv.attribute("executable"), inv.attribute("command")) {
            (Some(executable), _) => {
                let mut line = shlex::try_quote(executable)
                    .map(|q| q.into_owned())
                    .map_err(|_| ExecutionError::CommandParse(executable.to_string()))?;
                if let Some(args) = inv.attribute("args").or(inv.text.as_deref()) {
                    line.push(' ');
                    line.push_str(args);
                }
                line
            }
            (None, Some(command)) => command.to_string(),
            (None, None) => return Err(missing(inv, "executable")),
        };
        let cwd = inv
            .attribute("dir")
            .map_or_else(|| self.base_dir.clone(), |d| self.resolve(d));
        if self.skipped(inv, out, &command_line)? {
            return Ok(None);
        }
        self.say(out, OutputLevel::Verbose, "exec", &command_line)?;
        out.flush().map_err(TaskError::Output)?;

        if let Some(property) = inv.attribute("outputproperty") {
            let output = executor::execute_and_capture_output(&command_line, &cwd)?;
            let value = output.trim_end().to_string();
            self.properties.insert(property.to_string(), value.clone());
            return Ok(Some(value));
        }
        let fail_on_error = inv.flag("failonerror", false);
        if inv.flag("shell", false) {
            executor::execute_shell(&command_line, &cwd, fail_on_error)?;
        } else {
            executor::execute_command(&command_line, &cwd, fail_on_error)?;
        }
        Ok(None)
    }

    fn property_task(&mut self, inv: &TaskInvocation) -> Result<Option<String>, TaskError> {
        let name = inv.required("name")?;
        let value = inv.required("value")?;
        // Properties are immutable once set.
        let current = self
            .properties
            .entry(name.to_string())
            .or_insert_with(|| value.to_string());
        Ok(Some(current.clone()))
    }
}

impl TaskExecutor for SystemTasks {
    fn execute(
        &mut self,
        invocation: &TaskInvocation,
        out: &mut dyn Write,
    ) -> Result<Option<String>, TaskError> {
        log::debug!(
            "Executing task '{}' with {:?}",
            invocation.name,
            invocation.attributes
        );
        match invocation.name.as_str() {
            "echo" => self.echo(invocation, out),
            "mkdir" => self.mkdir(invocation, out),
            "delete" => self.delete(invocation, out),
            "copy" => self.copy(invocation, out),
            "move" => self.move_file(invocation, out),
            "touch" => self.touch(invocation, out),
            "exec" => self.exec(invocation, out),
            "property" => self.property_task(invocation),
            "fail" => Err(TaskError::Failed(
                invocation
                    .attribute("message")
                    .or(invocation.text.as_deref())
                    .unwrap_or("No message")
                    .to_string(),
            )),
            other => Err(TaskError::UnknownTask(other.to_string())),
        }
    }

    fn set_property(&mut self, name: &str, value: &str) {
        self.properties.insert(name.to_string(), value.to_string());
    }

    fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }
}

fn io_error(inv: &TaskInvocation, path: &Path, source: io::Error) -> TaskError {
    TaskError::Io {
        task: inv.name.clone(),
        path: path.to_path_buf(),
        source,
    }
}

fn missing(inv: &TaskInvocation, attribute: &str) -> TaskError {
    TaskError::MissingAttribute {
        task: inv.name.clone(),
        attribute: attribute.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(tasks: &mut SystemTasks, inv: TaskInvocation) -> (Result<Option<String>, TaskError>, String) {
        let mut out = Vec::new();
        let result = tasks.execute(&inv, &mut out);
        (result, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_mkdir_touch_copy_delete() {
        let dir = tempfile::tempdir().unwrap();
        let mut tasks = SystemTasks::new(dir.path(), false, OutputLevel::Normal);

        let (result, output) = run(&mut tasks, TaskInvocation::new("mkdir").with_attribute("dir", "build/classes"));
        result.unwrap();
        assert!(dir.path().join("build/classes").is_dir());
        assert!(output.starts_with("    [mkdir] Created dir: "));

        run(&mut tasks, TaskInvocation::new("touch").with_attribute("file", "build/classes/A.txt"))
            .0
            .unwrap();
        assert!(dir.path().join("build/classes/A.txt").is_file());

        let (result, output) = run(
            &mut tasks,
            TaskInvocation::new("copy")
                .with_attribute("dir", "build")
                .with_attribute("todir", "dist"),
        );
        result.unwrap();
        assert!(dir.path().join("dist/classes/A.txt").is_file());
        assert!(output.contains("[copy] Copying 1 file to "));

        let (result, output) = run(&mut tasks, TaskInvocation::new("delete").with_attribute("dir", "build"));
        result.unwrap();
        assert!(!dir.path().join("build").exists());
        assert!(output.contains("[delete] Deleting directory "));

        // Deleting something that is already gone is not an error.
        run(&mut tasks, TaskInvocation::new("delete").with_attribute("dir", "build"))
            .0
            .unwrap();
    }

    #[test]
    fn test_move_file_to_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "x").unwrap();
        let mut tasks = SystemTasks::new(dir.path(), false, OutputLevel::Quiet);

        let (result, output) = run(
            &mut tasks,
            TaskInvocation::new("move")
                .with_attribute("file", "a.txt")
                .with_attribute("todir", "out"),
        );
        result.unwrap();
        assert!(output.is_empty());
        assert!(!dir.path().join("a.txt").exists());
        assert_eq!(fs::read_to_string(dir.path().join("out/a.txt")).unwrap(), "x");
    }

    #[test]
    fn test_dry_run_skips_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let mut tasks = SystemTasks::new(dir.path(), true, OutputLevel::Normal);

        let (result, output) = run(&mut tasks, TaskInvocation::new("mkdir").with_attribute("dir", "build"));
        result.unwrap();
        assert!(!dir.path().join("build").exists());
        assert!(output.contains("(dry run)"));
    }

    #[test]
    fn test_echo_respects_output_level() {
        let dir = tempfile::tempdir().unwrap();
        let mut quiet = SystemTasks::new(dir.path(), false, OutputLevel::Quiet);
        let (_, output) = run(&mut quiet, TaskInvocation::new("echo").with_attribute("message", "hi"));
        assert_eq!(output, "     [echo] hi\n");

        let mut silent = SystemTasks::new(dir.path(), false, OutputLevel::Silent);
        let (_, output) = run(&mut silent, TaskInvocation::new("echo").with_attribute("message", "hi"));
        assert!(output.is_empty());
    }

    #[test]
    fn test_properties_are_immutable_through_the_task() {
        let dir = tempfile::tempdir().unwrap();
        let mut tasks = SystemTasks::new(dir.path(), false, OutputLevel::Normal);
        tasks.set_property("version", "1.0");

        let (result, _) = run(
            &mut tasks,
            TaskInvocation::new("property")
                .with_attribute("name", "version")
                .with_attribute("value", "2.0"),
        );
        assert_eq!(result.unwrap(), Some("1.0".to_string()));
        assert_eq!(tasks.property("version"), Some("1.0"));
    }

    #[test]
    fn test_fail_unknown_and_missing_attribute() {
        let dir = tempfile::tempdir().unwrap();
        let mut tasks = SystemTasks::new(dir.path(), false, OutputLevel::Normal);

        let (result, _) = run(&mut tasks, TaskInvocation::new("fail").with_attribute("message", "boom"));
        assert_eq!(result.unwrap_err().to_string(), "boom");

        let (result, _) = run(&mut tasks, TaskInvocation::new("javac"));
        assert!(matches!(result, Err(TaskError::UnknownTask(ref n)) if n == "javac"));

        let (result, _) = run(&mut tasks, TaskInvocation::new("mkdir"));
        assert!(matches!(result, Err(TaskError::MissingAttribute { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_exec_captures_output_property() {
        let dir = tempfile::tempdir().unwrap();
        let mut tasks = SystemTasks::new(dir.path(), false, OutputLevel::Normal);
        let (result, _) = run(
            &mut tasks,
            TaskInvocation::new("exec")
                .with_attribute("executable", "echo")
                .with_attribute("args", "hello world")
                .with_attribute("outputproperty", "greeting"),
        );
        assert_eq!(result.unwrap(), Some("hello world".to_string()));
        assert_eq!(tasks.property("greeting"), Some("hello world"));
    }
}
