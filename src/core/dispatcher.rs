//! # Dispatcher
//!
//! Runs the requested targets (or the default one) against a loaded
//! Environment and classifies failures into stable status codes. Also renders
//! the target listing shown by `-p`/`-T`.

use crate::{
    constants::DEFAULT_TARGET_NAME,
    core::interpreter::{Interpreter, ScriptError},
};
use log::debug;
use std::io;

/// Every requested target ran to completion.
pub const STATUS_SUCCESS: i32 = 0;
/// A requested target is not bound.
pub const STATUS_TARGET_MISSING: i32 = 11;
/// No target was requested and there is no usable default.
pub const STATUS_DEFAULT_MISSING: i32 = 12;
/// A target body failed; the remaining targets were skipped.
pub const STATUS_FAILED: i32 = 13;

/// Invokes `targets` in order, or the default target when the list is empty.
///
/// A missing target is reported and the next one is still attempted. Any other
/// failure stops the run with `STATUS_FAILED`.
pub fn dispatch(interp: &mut Interpreter, targets: &[String]) -> io::Result<i32> {
    if targets.is_empty() {
        return dispatch_default(interp);
    }

    let mut status = STATUS_SUCCESS;
    for name in targets {
        debug!("Dispatching target '{}'", name);
        let Some(target) = interp.env().get(name) else {
            report_missing(interp, name)?;
            status = STATUS_TARGET_MISSING;
            continue;
        };
        match interp.call_value(&target, Vec::new()) {
            Ok(_) => {}
            Err(e) if e.missing_binding() == Some(name.as_str()) => {
                report_missing(interp, name)?;
                status = STATUS_TARGET_MISSING;
            }
            Err(e) => return report_failure(interp, &e),
        }
    }
    Ok(status)
}

fn dispatch_default(interp: &mut Interpreter) -> io::Result<i32> {
    let Some(target) = interp.env().get(DEFAULT_TARGET_NAME) else {
        report_missing(interp, DEFAULT_TARGET_NAME)?;
        return Ok(STATUS_DEFAULT_MISSING);
    };
    match interp.call_value(&target, Vec::new()) {
        Ok(_) => Ok(STATUS_SUCCESS),
        Err(e) => match e.missing_binding() {
            Some(DEFAULT_TARGET_NAME) => {
                report_missing(interp, DEFAULT_TARGET_NAME)?;
                Ok(STATUS_DEFAULT_MISSING)
            }
            // Best effort: any unresolved name inside the default body lands here,
            // even when it is unrelated to the default target itself.
            Some(_) => {
                let message = e.root().to_string();
                interp.env_mut().write_line(&format!(
                    "Target {} failed: method invocation failed with message {}",
                    DEFAULT_TARGET_NAME, message
                ))?;
                Ok(STATUS_DEFAULT_MISSING)
            }
            None => report_failure(interp, &e),
        },
    }
}

fn report_missing(interp: &mut Interpreter, name: &str) -> io::Result<()> {
    interp
        .env_mut()
        .write_line(&format!("Target {} does not exist.", name))
}

fn report_failure(interp: &mut Interpreter, error: &ScriptError) -> io::Result<i32> {
    debug!("Target failed: {:?}", error);
    interp.env_mut().write_line(&error.to_string())?;
    Ok(STATUS_FAILED)
}

/// Prints every documented target with its description, sorted by name.
pub fn list_targets(interp: &mut Interpreter) -> io::Result<()> {
    let lines = format_target_list(interp);
    let env = interp.env_mut();
    for line in lines {
        env.write_line(&line)?;
    }
    env.flush()
}

fn format_target_list(interp: &Interpreter) -> Vec<String> {
    let registry = interp.env().registry();
    let width = registry
        .keys()
        .filter(|name| name.as_str() != DEFAULT_TARGET_NAME)
        .map(|name| name.chars().count())
        .max()
        .unwrap_or(0);

    let mut lines: Vec<String> = registry
        .iter()
        .filter(|(name, _)| name.as_str() != DEFAULT_TARGET_NAME)
        .map(|(name, description)| format!(" {:<width$}  {}", name, description, width = width))
        .collect();

    if let Some(default) = registry.get(DEFAULT_TARGET_NAME) {
        lines.push(String::new());
        lines.push(format!("Default target is {}.", default));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::{
            compiler,
            environment::{Environment, SharedOutput},
        },
        models::OutputLevel,
        system::tasks::SystemTasks,
    };

    fn load(source: &str) -> (Interpreter, SharedOutput) {
        let out = SharedOutput::new();
        let env = Environment::new(
            Box::new(SystemTasks::new(".", true, OutputLevel::Normal)),
            Box::new(out.clone()),
            OutputLevel::Normal,
        );
        let mut interp = Interpreter::new(env);
        let unit = compiler::compile_source(source, "build.gant", "build_gant").unwrap();
        interp.run_unit(&unit).unwrap();
        (interp, out)
    }

    const BUILD: &str = r#"
target(clean: 'Remove build output') { println('cleaning') }
target(build: 'Build everything') {
    clean()
    println('done')
}
setDefaultTarget(build)
"#;

    #[test]
    fn test_default_target_runs_its_nominee() {
        let (mut interp, out) = load(BUILD);
        assert_eq!(dispatch(&mut interp, &[]).unwrap(), STATUS_SUCCESS);
        assert_eq!(out.contents(), "cleaning\ndone\n");
    }

    #[test]
    fn test_missing_named_target_does_not_stop_the_others() {
        let (mut interp, out) = load(BUILD);
        let status = dispatch(&mut interp, &["missing".to_string(), "clean".to_string()]).unwrap();
        assert_eq!(status, STATUS_TARGET_MISSING);
        assert_eq!(out.contents(), "Target missing does not exist.\ncleaning\n");
    }

    #[test]
    fn test_missing_default_target() {
        let (mut interp, out) = load("target(clean: 'Clean') { }");
        assert_eq!(dispatch(&mut interp, &[]).unwrap(), STATUS_DEFAULT_MISSING);
        assert_eq!(out.contents(), "Target default does not exist.\n");

        let (mut interp, _) = load(BUILD);
        interp.env_mut().clear_targets();
        assert_eq!(dispatch(&mut interp, &[]).unwrap(), STATUS_DEFAULT_MISSING);
    }

    #[test]
    fn test_unbound_name_in_default_body_is_reported_as_invocation_failure() {
        let (mut interp, out) = load("target(default: 'Default') { nothingHere() }");
        assert_eq!(dispatch(&mut interp, &[]).unwrap(), STATUS_DEFAULT_MISSING);
        assert_eq!(
            out.contents(),
            "Target default failed: method invocation failed with message No such property: nothingHere\n"
        );
    }

    #[test]
    fn test_failure_in_body_stops_the_run() {
        let (mut interp, out) = load(
            r#"
target(broken: 'Broken') { ant.fail(message: 'boom') }
target(after: 'After') { println('after') }
target(ghost: 'Ghost') { unboundThing }
"#,
        );
        let status = dispatch(&mut interp, &["broken".to_string(), "after".to_string()]).unwrap();
        assert_eq!(status, STATUS_FAILED);
        assert!(out.contents().contains("boom"));
        assert!(!out.contents().contains("after"));

        let (mut interp, out) = load("target(ghost: 'Ghost') { unboundThing }");
        let status = dispatch(&mut interp, &["ghost".to_string()]).unwrap();
        assert_eq!(status, STATUS_FAILED);
        assert!(out.contents().contains("No such property: unboundThing"));
    }

    #[test]
    fn test_listing_aligns_names_and_reports_default() {
        let (mut interp, out) = load(BUILD);
        list_targets(&mut interp).unwrap();
        assert_eq!(
            out.contents(),
            " build  Build everything\n clean  Remove build output\n\nDefault target is build.\n"
        );
    }

    #[test]
    fn test_listing_pads_to_longest_name() {
        let (mut interp, out) = load(
            "target(a: 'Short') { }\ntarget(compile: 'Compile sources') { }\ntarget(hidden: '') { }",
        );
        list_targets(&mut interp).unwrap();
        assert_eq!(out.contents(), " a        Short\n compile  Compile sources\n");
    }
}
