//! # Builtins
//!
//! The functions and objects bound into every script.

use crate::{
    core::{
        environment::Environment,
        interpreter::{Interpreter, ScriptError},
        loader, tools,
        value::{NativeObject, TargetBody, Value, ValueKind},
    },
    models::OutputLevel,
    system::tasks::TaskInvocation,
};
use log::warn;
use std::{collections::BTreeMap, ffi::OsString};

/// Binds the builtin functions and objects every script sees.
pub fn install(env: &mut Environment) {
    env.bind("target", Value::builtin("target", target));
    env.bind("task", Value::builtin("task", task));
    env.bind("setdefault", Value::builtin("setdefault", set_default));
    env.bind("setDefaultTarget", Value::builtin("setDefaultTarget", set_default));
    env.bind("message", Value::builtin("message", message));
    env.bind("depends", Value::builtin("depends", depends));
    env.bind("includeTargets", Value::builtin("includeTargets", include_targets));
    env.bind("includeTool", Value::builtin("includeTool", include_tool));
    env.bind("println", Value::builtin("println", println));
    env.bind("print", Value::builtin("print", print));

    let tasks = Value::new(ValueKind::Object(NativeObject::Tasks));
    env.bind("ant", tasks.clone());
    env.bind("tasks", tasks);

    env.bind("env", env_map(std::env::vars_os()));
}

/// Builds the `env` map. Names and values that are not valid Unicode are
/// converted lossily rather than dropped.
fn env_map(vars: impl Iterator<Item = (OsString, OsString)>) -> Value {
    let vars = vars
        .map(|(key, value)| {
            (
                key.to_string_lossy().into_owned(),
                Value::string(value.to_string_lossy().into_owned()),
            )
        })
        .collect();
    Value::map(vars)
}

// --- Registration ---

fn target(interp: &mut Interpreter, args: Vec<Value>) -> Result<Value, ScriptError> {
    match args.as_slice() {
        [pair, body] => match (pair.kind(), body.kind()) {
            (ValueKind::Map(map), ValueKind::Closure(closure)) => interp
                .env_mut()
                .register(map, TargetBody::Closure(closure.clone())),
            _ => Err(target_usage()),
        },
        _ => Err(target_usage()),
    }
}

fn target_usage() -> ScriptError {
    ScriptError::Configuration(
        "target requires a single name: description pair and a closure, e.g. target(clean: 'Remove output') { ... }"
            .to_string(),
    )
}

/// The old spelling of `target`.
fn task(interp: &mut Interpreter, args: Vec<Value>) -> Result<Value, ScriptError> {
    warn!("'task' is deprecated; use 'target' instead.");
    target(interp, args)
}

fn set_default(interp: &mut Interpreter, args: Vec<Value>) -> Result<Value, ScriptError> {
    match args.as_slice() {
        [reference] => {
            interp.env_mut().set_default(reference)?;
            Ok(Value::null())
        }
        _ => Err(ScriptError::Configuration(format!(
            "setdefault takes exactly one argument, received {}",
            args.len()
        ))),
    }
}

fn message(interp: &mut Interpreter, args: Vec<Value>) -> Result<Value, ScriptError> {
    let [tag, text] = args.as_slice() else {
        return Err(ScriptError::Runtime(format!(
            "message takes a tag and a text, received {} argument(s)",
            args.len()
        )));
    };
    let env = interp.env_mut();
    if env.output_level() > OutputLevel::Silent {
        env.message(&tag.to_string(), &text.to_string())
            .map_err(ScriptError::Output)?;
    }
    Ok(Value::null())
}

// --- Dependencies ---

/// Invokes each referenced target unless it already ran in this run.
fn depends(interp: &mut Interpreter, args: Vec<Value>) -> Result<Value, ScriptError> {
    for reference in args {
        depend_on(interp, &reference)?;
    }
    Ok(Value::null())
}

fn depend_on(interp: &mut Interpreter, reference: &Value) -> Result<(), ScriptError> {
    match reference.kind() {
        ValueKind::List(items) => {
            for item in items {
                depend_on(interp, item)?;
            }
        }
        ValueKind::String(name) => {
            if !interp.env().has_executed(name) {
                interp.invoke_by_name(name)?;
            }
        }
        ValueKind::Target(target) => {
            if !interp.env().has_executed(&target.name) {
                interp.invoke_target(target)?;
            }
        }
        ValueKind::Closure(closure) => {
            interp.call_closure(closure, Vec::new())?;
        }
        _ => {
            return Err(ScriptError::Configuration(format!(
                "depends does not accept a value of type {}",
                reference.type_name()
            )));
        }
    }
    Ok(())
}

// --- Includes ---

fn include_targets(interp: &mut Interpreter, args: Vec<Value>) -> Result<Value, ScriptError> {
    let mut params = BTreeMap::new();
    let mut reference = None;
    for arg in &args {
        match arg.kind() {
            ValueKind::Map(map) => params.extend(map.iter().map(|(k, v)| (k.clone(), v.clone()))),
            ValueKind::String(s) if reference.is_none() => reference = Some(s.clone()),
            _ => {
                return Err(ScriptError::Configuration(
                    "includeTargets takes one script name or path plus named parameters"
                        .to_string(),
                ));
            }
        }
    }
    let reference = reference.ok_or_else(|| {
        ScriptError::Configuration("includeTargets requires a script name or path".to_string())
    })?;

    let path = loader::resolve_include(interp, &reference)?;
    loader::include_script(interp, &path, params)?;
    Ok(Value::null())
}

fn include_tool(interp: &mut Interpreter, args: Vec<Value>) -> Result<Value, ScriptError> {
    let [name] = args.as_slice() else {
        return Err(ScriptError::Configuration(
            "includeTool takes exactly one tool name".to_string(),
        ));
    };
    let name = name.to_string();
    let tool = tools::find_tool(&name).ok_or_else(|| {
        ScriptError::Configuration(format!(
            "Unknown tool '{}'. Available tools: {}",
            name,
            tools::tool_names().collect::<Vec<_>>().join(", ")
        ))
    })?;
    log::debug!("Including tool '{}': {}", tool.name, tool.description);
    let object = Value::new(ValueKind::Object(NativeObject::Tool(tool)));
    interp.env_mut().bind(tool.name, object.clone());
    Ok(object)
}

// --- Output ---

fn join_args(args: &[Value]) -> String {
    args.iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

fn println(interp: &mut Interpreter, args: Vec<Value>) -> Result<Value, ScriptError> {
    interp
        .env_mut()
        .write_line(&join_args(&args))
        .map_err(ScriptError::Output)?;
    Ok(Value::null())
}

fn print(interp: &mut Interpreter, args: Vec<Value>) -> Result<Value, ScriptError> {
    interp
        .env_mut()
        .write(&join_args(&args))
        .map_err(ScriptError::Output)?;
    Ok(Value::null())
}

// --- Task facade ---

/// Turns `ant.<method>(...)` into a task invocation. Named arguments become
/// attributes; a positional scalar becomes the nested text.
pub fn invoke_task(
    interp: &mut Interpreter,
    method: &str,
    args: Vec<Value>,
) -> Result<Value, ScriptError> {
    let mut invocation = TaskInvocation::new(method);
    for arg in &args {
        match arg.kind() {
            ValueKind::Map(map) => {
                for (key, value) in map.iter().filter(|(_, v)| !v.is_null()) {
                    invocation.attributes.insert(key.clone(), value.to_string());
                }
            }
            ValueKind::Closure(_) => {
                return Err(ScriptError::Runtime(format!(
                    "Nested elements are not supported for task '{}'",
                    method
                )));
            }
            _ => invocation.text = Some(arg.to_string()),
        }
    }
    let result = interp.env_mut().run_task(&invocation)?;
    Ok(result.map_or_else(Value::null, Value::string))
}

#[cfg(test)]
mod tests {
    use crate::{
        core::{
            compiler,
            environment::{Environment, SharedOutput},
            interpreter::{Interpreter, ScriptError},
        },
        models::OutputLevel,
        system::tasks::SystemTasks,
    };

    fn run_with_level(source: &str, level: OutputLevel) -> (Interpreter, SharedOutput, Result<(), ScriptError>) {
        let out = SharedOutput::new();
        let env = Environment::new(
            Box::new(SystemTasks::new(".", true, level)),
            Box::new(out.clone()),
            level,
        );
        let mut interp = Interpreter::new(env);
        let unit = compiler::compile_source(source, "build.gant", "build_gant").unwrap();
        let result = interp.run_unit(&unit);
        (interp, out, result)
    }

    fn run(source: &str) -> (Interpreter, SharedOutput, Result<(), ScriptError>) {
        run_with_level(source, OutputLevel::Normal)
    }

    #[cfg(unix)]
    #[test]
    fn test_env_map_keeps_non_unicode_variables() {
        use crate::core::value::ValueKind;
        use std::{ffi::OsString, os::unix::ffi::OsStringExt};

        let vars = vec![
            (OsString::from("HOME_DIR"), OsString::from("/home/dev")),
            (OsString::from("BADVAR"), OsString::from_vec(vec![b'a', 0xff])),
        ];
        let map = super::env_map(vars.into_iter());
        let ValueKind::Map(map) = map.kind() else {
            panic!("expected a map");
        };
        assert_eq!(map.get("HOME_DIR").and_then(|v| v.as_str()), Some("/home/dev"));
        assert_eq!(map.get("BADVAR").and_then(|v| v.as_str()), Some("a\u{fffd}"));
    }

    #[test]
    fn test_target_registers_and_is_callable_by_name() {
        let source = r#"
            target(clean: 'Remove output') { println('cleaning') }
            clean()
        "#;
        let (interp, out, result) = run(source);
        result.unwrap();
        assert_eq!(out.contents(), "cleaning\n");
        assert_eq!(
            interp.env().registry().get("clean").map(String::as_str),
            Some("Remove output")
        );
    }

    #[test]
    fn test_task_is_an_alias_of_target() {
        let (interp, _, result) = run("task(compile: 'Compile') { }");
        result.unwrap();
        assert!(interp.env().get("compile").unwrap().as_target().is_some());
        assert_eq!(
            interp.env().get("compile_description").unwrap().as_str(),
            Some("Compile")
        );
    }

    #[test]
    fn test_target_with_two_names_is_a_configuration_error() {
        let (_, _, result) = run("target(a: 'x', b: 'y') { }");
        assert!(matches!(
            result.unwrap_err().root(),
            ScriptError::Configuration(_)
        ));
    }

    #[test]
    fn test_setdefault_accepts_target_and_name() {
        let (interp, _, result) = run("target(build: 'Build') { }\nsetdefault(build)");
        result.unwrap();
        assert_eq!(
            interp.env().registry().get("default").map(String::as_str),
            Some("build")
        );

        let (interp, _, result) =
            run("target(build: 'Build') { }\nsetDefaultTarget('build')");
        result.unwrap();
        assert_eq!(
            interp.env().registry().get("default").map(String::as_str),
            Some("build")
        );

        let (_, _, result) = run("setdefault('nothing')");
        assert!(matches!(
            result.unwrap_err().root(),
            ScriptError::Configuration(_)
        ));
    }

    #[test]
    fn test_message_formats_tag() {
        let (_, out, result) = run("message('compile', 'Compiling sources')");
        result.unwrap();
        assert_eq!(out.contents(), "  [compile] Compiling sources\n");

        let (_, out, result) = run_with_level("message('x', 'y')", OutputLevel::Silent);
        result.unwrap();
        assert!(out.contents().is_empty());
    }

    #[test]
    fn test_depends_runs_each_target_once() {
        let source = r#"
            target(init: '') { println('init') }
            target(compile: '') { depends(init); println('compile') }
            target(test: '') { depends([init, 'compile']); println('test') }
            test()
        "#;
        let (_, out, result) = run(source);
        result.unwrap();
        assert_eq!(out.contents(), "init\ncompile\ntest\n");
    }

    #[test]
    fn test_include_tool_binds_tool_object() {
        let source = r#"
            includeTool('Paths')
            println(Paths.join('a', 'b') == 'a' + '/' + 'b' || Paths.join('a', 'b') == 'a\\b')
            println(Paths.basename('/tmp/build.gant'))
        "#;
        let (_, out, result) = run(source);
        result.unwrap();
        assert_eq!(out.contents(), "true\nbuild.gant\n");

        let (_, _, result) = run("includeTool('Maven')");
        assert!(matches!(
            result.unwrap_err().root(),
            ScriptError::Configuration(_)
        ));
    }

    #[test]
    fn test_task_facade_dry_run_and_properties() {
        let source = r#"
            ant.property(name: 'dist', value: 'target/dist')
            ant.mkdir(dir: ant.dist)
            ant.echo(message: "dist is ${ant.dist}")
        "#;
        let (interp, out, result) = run(source);
        result.unwrap();
        assert_eq!(interp.env().tasks().property("dist"), Some("target/dist"));
        let output = out.contents();
        assert!(output.contains("[mkdir] (dry run) mkdir"));
        assert!(output.contains("     [echo] dist is target/dist\n"));
    }

    #[test]
    fn test_fail_task_surfaces_as_task_error() {
        let (_, _, result) = run("ant.fail(message: 'broken')");
        let err = result.unwrap_err();
        assert!(matches!(err.root(), ScriptError::Task(_)));
        assert_eq!(err.to_string(), "build.gant, line 1: broken");
    }
}
