//! # Interpreter
//!
//! Evaluates compiled script units against an `Environment`. Top-level code binds
//! straight into the Environment; closure bodies get a chain of local scopes in
//! front of it. Every failure leaves here as a `ScriptError`, located at the
//! innermost statement that raised it.

use crate::{
    constants::MAX_CALL_DEPTH,
    core::{
        builtins,
        compiler::CompileError,
        environment::Environment,
        value::{Closure, NativeObject, Scope, ScopeRef, Target, TargetBody, Value, ValueKind},
    },
    models::{
        Argument, BinaryOp, Expr, ExprKind, Literal, ScriptUnit, Stmt, StmtKind,
        TemplateComponent, UnaryOp,
    },
    system::tasks::TaskError,
};
use std::{
    collections::BTreeMap,
    io,
    mem,
    path::{Path, PathBuf},
    rc::Rc,
};
use thiserror::Error;

/// Represents errors raised while evaluating a script.
#[derive(Error, Debug)]
pub enum ScriptError {
    /// A name was looked up but is bound nowhere.
    #[error("No such property: {name}")]
    MissingBinding {
        /// The unresolved name.
        name: String,
    },
    /// The script used the registration protocol or a builtin incorrectly.
    #[error("{0}")]
    Configuration(String),
    /// Any other evaluation failure (type errors, bad arguments, recursion).
    #[error("{0}")]
    Runtime(String),
    /// A task of the task-execution facade failed.
    #[error(transparent)]
    Task(#[from] TaskError),
    /// An included script failed to compile.
    #[error(transparent)]
    Compile(#[from] CompileError),
    /// An included script could not be read.
    #[error("Could not read '{path}': {source}")]
    Io {
        /// The file being read.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// Writing to the output sink failed.
    #[error("Failed to write output: {0}")]
    Output(#[source] io::Error),
    /// Any of the above, tagged with where in the script it happened.
    #[error("{source_name}, line {line}: {error}")]
    Located {
        /// The script the failing statement belongs to.
        source_name: String,
        /// The line of the failing statement.
        line: u32,
        /// The original failure.
        error: Box<ScriptError>,
    },
}

impl ScriptError {
    /// The failure without its location.
    pub fn root(&self) -> &Self {
        match self {
            Self::Located { error, .. } => error.root(),
            other => other,
        }
    }

    /// The unresolved name, when this is a missing-binding failure.
    pub fn missing_binding(&self) -> Option<&str> {
        match self.root() {
            Self::MissingBinding { name } => Some(name),
            _ => None,
        }
    }

    fn located(self, source_name: &str, line: u32) -> Self {
        match self {
            located @ Self::Located { .. } => located,
            other => Self::Located {
                source_name: source_name.to_string(),
                line,
                error: Box::new(other),
            },
        }
    }
}

enum Flow {
    Next,
    NextValue(Value),
    Return(Value),
}

/// Tree-walking evaluator that owns the run's Environment.
#[derive(Debug)]
pub struct Interpreter {
    env: Environment,
    scope: Option<ScopeRef>,
    source_name: Rc<str>,
    depth: usize,
    /// Scripts currently being evaluated, outermost first.
    include_stack: Vec<PathBuf>,
}

impl Interpreter {
    /// Wraps `env`, installing the builtin bindings.
    pub fn new(mut env: Environment) -> Self {
        builtins::install(&mut env);
        Self {
            env,
            scope: None,
            source_name: Rc::from(""),
            depth: 0,
            include_stack: Vec::new(),
        }
    }

    /// The Environment being evaluated into.
    pub fn env(&self) -> &Environment {
        &self.env
    }

    /// The Environment, mutably.
    pub fn env_mut(&mut self) -> &mut Environment {
        &mut self.env
    }

    // --- Script evaluation ---

    /// Evaluates the top-level statements of `unit`.
    pub fn run_unit(&mut self, unit: &ScriptUnit) -> Result<(), ScriptError> {
        let previous_source = mem::replace(&mut self.source_name, Rc::from(unit.source_name.as_str()));
        let previous_scope = self.scope.take();
        let result = self.execute_block(&unit.statements);
        self.source_name = previous_source;
        self.scope = previous_scope;
        result.map(|_| ())
    }

    /// Marks `path` as being evaluated. Returns `false` if it already is.
    pub fn enter_script(&mut self, path: &Path) -> bool {
        if self.include_stack.iter().any(|p| p == path) {
            return false;
        }
        self.include_stack.push(path.to_path_buf());
        true
    }

    /// Pops the script pushed by the last successful `enter_script`.
    pub fn leave_script(&mut self) {
        self.include_stack.pop();
    }

    /// Directory of the script currently being evaluated, if it is file-backed.
    pub fn current_script_dir(&self) -> Option<&Path> {
        self.include_stack.last().and_then(|p| p.parent())
    }

    // --- Invocation ---

    /// Looks `name` up in the Environment and invokes it.
    pub fn invoke_by_name(&mut self, name: &str) -> Result<Value, ScriptError> {
        let value = self
            .env
            .get(name)
            .ok_or_else(|| ScriptError::MissingBinding {
                name: name.to_string(),
            })?;
        self.call_value(&value, Vec::new())
    }

    /// Runs a target's body.
    pub fn invoke_target(&mut self, target: &Rc<Target>) -> Result<Value, ScriptError> {
        self.enter_call()?;
        self.env.mark_executed(&target.name);
        log::debug!("Invoking target '{}'", target.name);
        let result = match &target.body {
            TargetBody::Closure(closure) => self.call_closure(closure, Vec::new()),
            TargetBody::Alias(name) => self.invoke_by_name(name),
        };
        self.depth -= 1;
        result
    }

    /// Calls a closure, target or builtin. Anything else is a runtime error.
    pub fn call_value(&mut self, callee: &Value, args: Vec<Value>) -> Result<Value, ScriptError> {
        match callee.kind() {
            ValueKind::Closure(closure) => self.call_closure(closure, args),
            ValueKind::Target(target) => self.invoke_target(target),
            ValueKind::Builtin(builtin) => (builtin.callback)(self, args),
            _ => Err(ScriptError::Runtime(format!(
                "Value of type {} is not callable",
                callee.type_name()
            ))),
        }
    }

    /// Calls a closure with positional arguments. A closure without declared
    /// parameters receives a single argument as `it`.
    pub fn call_closure(&mut self, closure: &Closure, args: Vec<Value>) -> Result<Value, ScriptError> {
        self.enter_call()?;
        let scope = Scope::with_parent(closure.scope.clone());
        {
            let mut locals = scope.borrow_mut();
            if closure.params.is_empty() {
                if let Some(it) = args.into_iter().next() {
                    locals.define("it", it);
                }
            } else {
                let mut args = args.into_iter();
                for param in &closure.params {
                    locals.define(param, args.next().unwrap_or_else(Value::null));
                }
            }
        }

        let previous_scope = mem::replace(&mut self.scope, Some(scope));
        let previous_source = mem::replace(&mut self.source_name, Rc::clone(&closure.source_name));
        let result = self.execute_block(&closure.body);
        self.scope = previous_scope;
        self.source_name = previous_source;
        self.depth -= 1;

        Ok(match result? {
            Flow::Next => Value::null(),
            Flow::NextValue(value) | Flow::Return(value) => value,
        })
    }

    fn enter_call(&mut self) -> Result<(), ScriptError> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(ScriptError::Runtime(format!(
                "Maximum call depth of {} exceeded; check for targets that invoke themselves",
                MAX_CALL_DEPTH
            )));
        }
        self.depth += 1;
        Ok(())
    }

    // --- Statements ---

    fn execute_block(&mut self, statements: &[Stmt]) -> Result<Flow, ScriptError> {
        let mut last = Flow::Next;
        for stmt in statements {
            match self.execute_statement(stmt)? {
                Flow::Return(value) => return Ok(Flow::Return(value)),
                flow => last = flow,
            }
        }
        Ok(last)
    }

    fn execute_statement(&mut self, stmt: &Stmt) -> Result<Flow, ScriptError> {
        self.execute_statement_kind(&stmt.kind)
            .map_err(|e| e.located(&self.source_name, stmt.line))
    }

    fn execute_statement_kind(&mut self, kind: &StmtKind) -> Result<Flow, ScriptError> {
        match kind {
            StmtKind::Def { name, value } => {
                let value = match value {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::null(),
                };
                match &self.scope {
                    Some(scope) => scope.borrow_mut().define(name, value),
                    None => self.env.bind(name, value),
                }
                Ok(Flow::Next)
            }
            StmtKind::Assign { name, value } => {
                let value = self.evaluate(value)?;
                self.assign(name, value);
                Ok(Flow::Next)
            }
            StmtKind::Expr(expr) => Ok(Flow::NextValue(self.evaluate(expr)?)),
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.evaluate(condition)?.is_truthy() {
                    self.execute_in_child_scope(then_branch, None)
                } else if let Some(else_branch) = else_branch {
                    self.execute_in_child_scope(else_branch, None)
                } else {
                    Ok(Flow::Next)
                }
            }
            StmtKind::For {
                binding,
                iterable,
                body,
            } => {
                let iterable = self.evaluate(iterable)?;
                for item in self.iterate(&iterable)? {
                    if let Flow::Return(value) =
                        self.execute_in_child_scope(body, Some((binding, item)))?
                    {
                        return Ok(Flow::Return(value));
                    }
                }
                Ok(Flow::Next)
            }
            StmtKind::Return(value) => {
                let value = match value {
                    Some(expr) => self.evaluate(expr)?,
                    None => Value::null(),
                };
                Ok(Flow::Return(value))
            }
        }
    }

    /// Runs a block body. At top level blocks share the Environment; inside a
    /// closure they get a child scope.
    fn execute_in_child_scope(
        &mut self,
        body: &[Stmt],
        binding: Option<(&String, Value)>,
    ) -> Result<Flow, ScriptError> {
        if self.scope.is_none() && binding.is_none() {
            return self.execute_block(body);
        }
        let scope = Scope::with_parent(self.scope.clone());
        if let Some((name, value)) = binding {
            scope.borrow_mut().define(name, value);
        }
        let previous = mem::replace(&mut self.scope, Some(scope));
        let result = self.execute_block(body);
        self.scope = previous;
        result
    }

    fn assign(&mut self, name: &str, value: Value) {
        let unhandled = match &self.scope {
            Some(scope) => Scope::assign(scope, name, value),
            None => Some(value),
        };
        if let Some(value) = unhandled {
            self.env.bind(name, value);
        }
    }

    /// Resolves a name: closure locals first, then the Environment.
    pub fn lookup(&self, name: &str) -> Result<Value, ScriptError> {
        self.scope
            .as_ref()
            .and_then(|scope| Scope::get(scope, name))
            .or_else(|| self.env.get(name))
            .ok_or_else(|| ScriptError::MissingBinding {
                name: name.to_string(),
            })
    }

    // --- Expressions ---

    fn evaluate(&mut self, expr: &Expr) -> Result<Value, ScriptError> {
        match &expr.kind {
            ExprKind::Literal(literal) => Ok(literal_value(literal)),
            ExprKind::Template(components) => self.render_template(components),
            ExprKind::Variable(name) => self.lookup(name),
            ExprKind::List(elements) => {
                let values = elements
                    .iter()
                    .map(|e| self.evaluate(e))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::list(values))
            }
            ExprKind::Map(entries) => {
                let mut map = BTreeMap::new();
                for (key, value) in entries {
                    let value = self.evaluate(value)?;
                    map.insert(key.clone(), value);
                }
                Ok(Value::map(map))
            }
            ExprKind::Closure { params, body } => Ok(Value::new(ValueKind::Closure(Closure {
                params: params.clone(),
                body: Rc::from(body.as_slice()),
                scope: self.scope.clone(),
                source_name: Rc::clone(&self.source_name),
            }))),
            ExprKind::Call { callee, args } => {
                let callee = self.evaluate(callee)?;
                let args = self.evaluate_arguments(args)?;
                self.call_value(&callee, args)
            }
            ExprKind::MethodCall {
                receiver,
                method,
                args,
            } => {
                let receiver = self.evaluate(receiver)?;
                let args = self.evaluate_arguments(args)?;
                self.call_method(&receiver, method, args)
            }
            ExprKind::Field { target, field } => {
                let target = self.evaluate(target)?;
                self.field(&target, field)
            }
            ExprKind::Index { target, index } => {
                let target = self.evaluate(target)?;
                let index = self.evaluate(index)?;
                index_value(&target, &index)
            }
            ExprKind::Binary { op, left, right } => match op {
                BinaryOp::And => {
                    let left = self.evaluate(left)?;
                    if !left.is_truthy() {
                        return Ok(Value::bool(false));
                    }
                    Ok(Value::bool(self.evaluate(right)?.is_truthy()))
                }
                BinaryOp::Or => {
                    let left = self.evaluate(left)?;
                    if left.is_truthy() {
                        return Ok(Value::bool(true));
                    }
                    Ok(Value::bool(self.evaluate(right)?.is_truthy()))
                }
                _ => {
                    let left = self.evaluate(left)?;
                    let right = self.evaluate(right)?;
                    binary(*op, &left, &right)
                }
            },
            ExprKind::Unary { op, expr } => {
                let value = self.evaluate(expr)?;
                match (op, value.kind()) {
                    (UnaryOp::Not, _) => Ok(Value::bool(!value.is_truthy())),
                    (UnaryOp::Negate, ValueKind::Int(n)) => n
                        .checked_neg()
                        .map(Value::int)
                        .ok_or_else(|| ScriptError::Runtime("Integer overflow".to_string())),
                    (UnaryOp::Negate, _) => Err(ScriptError::Runtime(format!(
                        "Cannot negate a value of type {}",
                        value.type_name()
                    ))),
                }
            }
        }
    }

    /// Evaluates call arguments. Named arguments are gathered into one map that
    /// is passed first.
    fn evaluate_arguments(&mut self, args: &[Argument]) -> Result<Vec<Value>, ScriptError> {
        let mut named = BTreeMap::new();
        let mut positional = Vec::with_capacity(args.len());
        for arg in args {
            match arg {
                Argument::Named(name, expr) => {
                    let value = self.evaluate(expr)?;
                    named.insert(name.clone(), value);
                }
                Argument::Positional(expr) => positional.push(self.evaluate(expr)?),
            }
        }
        if !named.is_empty() {
            positional.insert(0, Value::map(named));
        }
        Ok(positional)
    }

    fn render_template(&mut self, components: &[TemplateComponent]) -> Result<Value, ScriptError> {
        let mut rendered = String::new();
        for component in components {
            match component {
                TemplateComponent::Literal(text) => rendered.push_str(text),
                TemplateComponent::Path(path) => {
                    let mut segments = path.iter();
                    let Some(first) = segments.next() else {
                        continue;
                    };
                    let mut value = self.lookup(first)?;
                    for segment in segments {
                        value = self.field(&value, segment)?;
                    }
                    rendered.push_str(&value.to_string());
                }
            }
        }
        Ok(Value::string(rendered))
    }

    fn field(&self, target: &Value, field: &str) -> Result<Value, ScriptError> {
        match target.kind() {
            ValueKind::Map(map) => Ok(map.get(field).cloned().unwrap_or_else(Value::null)),
            ValueKind::Target(target) => match field {
                "name" => Ok(Value::string(target.name.clone())),
                "description" => Ok(target
                    .description
                    .clone()
                    .map_or_else(Value::null, Value::string)),
                _ => Err(no_such_field(field, "Target")),
            },
            ValueKind::Object(NativeObject::Tasks) => {
                let tasks = self.env.tasks();
                if field == "properties" {
                    let properties = tasks
                        .properties()
                        .iter()
                        .map(|(k, v)| (k.clone(), Value::string(v.clone())))
                        .collect();
                    return Ok(Value::map(properties));
                }
                Ok(tasks.property(field).map_or_else(Value::null, Value::string))
            }
            ValueKind::String(s) if field == "length" => Ok(Value::int(len_as_int(s.chars().count()))),
            ValueKind::List(values) if field == "size" => Ok(Value::int(len_as_int(values.len()))),
            _ => Err(no_such_field(field, target.type_name())),
        }
    }

    fn call_method(
        &mut self,
        receiver: &Value,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value, ScriptError> {
        match receiver.kind() {
            ValueKind::Object(NativeObject::Tasks) => builtins::invoke_task(self, method, args),
            ValueKind::Object(NativeObject::Tool(tool)) => tool.call(self, method, args),
            ValueKind::String(s) => string_method(s, method, &args),
            ValueKind::List(values) => self.list_method(values, method, args),
            ValueKind::Map(map) => self.map_method(map, method, args),
            ValueKind::Target(target) if method == "call" => self.invoke_target(target),
            ValueKind::Closure(_) | ValueKind::Builtin(_) if method == "call" => {
                self.call_value(receiver, args)
            }
            _ if method == "toString" => Ok(Value::string(receiver.to_string())),
            _ => Err(no_such_method(method, receiver.type_name())),
        }
    }

    fn list_method(
        &mut self,
        values: &[Value],
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value, ScriptError> {
        match method {
            "size" => Ok(Value::int(len_as_int(values.len()))),
            "isEmpty" => Ok(Value::bool(values.is_empty())),
            "contains" => {
                let needle = single_arg(method, &args)?;
                Ok(Value::bool(values.iter().any(|v| v.equals(needle))))
            }
            "join" => {
                let separator = args.first().map(Value::to_string).unwrap_or_default();
                let joined = values
                    .iter()
                    .map(Value::to_string)
                    .collect::<Vec<_>>()
                    .join(&separator);
                Ok(Value::string(joined))
            }
            "each" => {
                let callback = single_arg(method, &args)?;
                for value in values {
                    self.call_value(callback, vec![value.clone()])?;
                }
                Ok(Value::list(values.to_vec()))
            }
            "collect" => {
                let callback = single_arg(method, &args)?;
                let mapped = values
                    .iter()
                    .map(|value| self.call_value(callback, vec![value.clone()]))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::list(mapped))
            }
            "toString" => Ok(Value::string(Value::list(values.to_vec()).to_string())),
            _ => Err(no_such_method(method, "List")),
        }
    }

    fn map_method(
        &mut self,
        map: &BTreeMap<String, Value>,
        method: &str,
        args: Vec<Value>,
    ) -> Result<Value, ScriptError> {
        match method {
            "size" => Ok(Value::int(len_as_int(map.len()))),
            "isEmpty" => Ok(Value::bool(map.is_empty())),
            "containsKey" => {
                let key = single_arg(method, &args)?.to_string();
                Ok(Value::bool(map.contains_key(&key)))
            }
            "get" => {
                let key = args
                    .first()
                    .ok_or_else(|| wrong_arguments(method, 1, args.len()))?
                    .to_string();
                Ok(map
                    .get(&key)
                    .cloned()
                    .or_else(|| args.get(1).cloned())
                    .unwrap_or_else(Value::null))
            }
            "keys" => Ok(Value::list(map.keys().cloned().map(Value::string).collect())),
            "values" => Ok(Value::list(map.values().cloned().collect())),
            "each" => {
                let callback = single_arg(method, &args)?;
                let two_params = matches!(callback.kind(), ValueKind::Closure(c) if c.params.len() == 2);
                for (key, value) in map {
                    let call_args = if two_params {
                        vec![Value::string(key.clone()), value.clone()]
                    } else {
                        vec![entry_value(key, value)]
                    };
                    self.call_value(callback, call_args)?;
                }
                Ok(Value::map(map.clone()))
            }
            _ => match map.get(method) {
                // A map of closures works as an object with methods.
                Some(callee)
                    if matches!(
                        callee.kind(),
                        ValueKind::Closure(_) | ValueKind::Target(_) | ValueKind::Builtin(_)
                    ) =>
                {
                    self.call_value(callee, args)
                }
                _ => Err(no_such_method(method, "Map")),
            },
        }
    }

    fn iterate(&self, value: &Value) -> Result<Vec<Value>, ScriptError> {
        match value.kind() {
            ValueKind::List(values) => Ok(values.clone()),
            ValueKind::Map(map) => Ok(map.iter().map(|(k, v)| entry_value(k, v)).collect()),
            ValueKind::String(s) => Ok(s.chars().map(|c| Value::string(c.to_string())).collect()),
            ValueKind::Null => Ok(Vec::new()),
            _ => Err(ScriptError::Runtime(format!(
                "Cannot iterate over a value of type {}",
                value.type_name()
            ))),
        }
    }
}

// --- Value helpers ---

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::Null => Value::null(),
        Literal::Bool(b) => Value::bool(*b),
        Literal::Int(n) => Value::int(*n),
        Literal::String(s) => Value::string(s.clone()),
    }
}

/// A map entry as seen by `for` loops and one-parameter `each`: `[key: k, value: v]`.
fn entry_value(key: &str, value: &Value) -> Value {
    let mut entry = BTreeMap::new();
    entry.insert("key".to_string(), Value::string(key));
    entry.insert("value".to_string(), value.clone());
    Value::map(entry)
}

fn len_as_int(len: usize) -> i64 {
    i64::try_from(len).unwrap_or(i64::MAX)
}

fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, ScriptError> {
    use ValueKind::{Int, List, String as Str};

    let overflow = || ScriptError::Runtime("Integer overflow".to_string());
    match (op, left.kind(), right.kind()) {
        (BinaryOp::Equal, _, _) => Ok(Value::bool(left.equals(right))),
        (BinaryOp::NotEqual, _, _) => Ok(Value::bool(!left.equals(right))),

        (BinaryOp::Add, Int(a), Int(b)) => a.checked_add(*b).map(Value::int).ok_or_else(overflow),
        (BinaryOp::Add, Str(a), _) => Ok(Value::string(format!("{a}{right}"))),
        (BinaryOp::Add, _, Str(b)) => Ok(Value::string(format!("{left}{b}"))),
        (BinaryOp::Add, List(a), List(b)) => Ok(Value::list(a.iter().chain(b).cloned().collect())),
        (BinaryOp::Add, List(a), _) => {
            let mut values = a.clone();
            values.push(right.clone());
            Ok(Value::list(values))
        }
        (BinaryOp::Sub, Int(a), Int(b)) => a.checked_sub(*b).map(Value::int).ok_or_else(overflow),
        (BinaryOp::Mul, Int(a), Int(b)) => a.checked_mul(*b).map(Value::int).ok_or_else(overflow),
        (BinaryOp::Mul, Str(s), Int(n)) => {
            let count = usize::try_from(*n).unwrap_or(0);
            Ok(Value::string(s.repeat(count)))
        }
        (BinaryOp::Div | BinaryOp::Mod, Int(_), Int(0)) => {
            Err(ScriptError::Runtime("Division by zero".to_string()))
        }
        (BinaryOp::Div, Int(a), Int(b)) => a.checked_div(*b).map(Value::int).ok_or_else(overflow),
        (BinaryOp::Mod, Int(a), Int(b)) => a.checked_rem(*b).map(Value::int).ok_or_else(overflow),

        (BinaryOp::Less, Int(a), Int(b)) => Ok(Value::bool(a < b)),
        (BinaryOp::LessEqual, Int(a), Int(b)) => Ok(Value::bool(a <= b)),
        (BinaryOp::Greater, Int(a), Int(b)) => Ok(Value::bool(a > b)),
        (BinaryOp::GreaterEqual, Int(a), Int(b)) => Ok(Value::bool(a >= b)),
        (BinaryOp::Less, Str(a), Str(b)) => Ok(Value::bool(a < b)),
        (BinaryOp::LessEqual, Str(a), Str(b)) => Ok(Value::bool(a <= b)),
        (BinaryOp::Greater, Str(a), Str(b)) => Ok(Value::bool(a > b)),
        (BinaryOp::GreaterEqual, Str(a), Str(b)) => Ok(Value::bool(a >= b)),

        _ => Err(ScriptError::Runtime(format!(
            "Operator {:?} is not defined for {} and {}",
            op,
            left.type_name(),
            right.type_name()
        ))),
    }
}

fn index_value(target: &Value, index: &Value) -> Result<Value, ScriptError> {
    let position = |len: usize, n: i64| -> Option<usize> {
        let len = i64::try_from(len).ok()?;
        let idx = if n < 0 { len + n } else { n };
        usize::try_from(idx).ok()
    };
    match (target.kind(), index.kind()) {
        (ValueKind::List(values), ValueKind::Int(n)) => Ok(position(values.len(), *n)
            .and_then(|i| values.get(i))
            .cloned()
            .unwrap_or_else(Value::null)),
        (ValueKind::Map(map), _) => Ok(map
            .get(&index.to_string())
            .cloned()
            .unwrap_or_else(Value::null)),
        (ValueKind::String(s), ValueKind::Int(n)) => {
            let chars: Vec<char> = s.chars().collect();
            Ok(position(chars.len(), *n)
                .and_then(|i| chars.get(i))
                .map_or_else(Value::null, |c| Value::string(c.to_string())))
        }
        _ => Err(ScriptError::Runtime(format!(
            "Cannot index a value of type {} with {}",
            target.type_name(),
            index.type_name()
        ))),
    }
}

fn string_method(s: &str, method: &str, args: &[Value]) -> Result<Value, ScriptError> {
    let text_arg = || single_arg(method, args).map(Value::to_string);
    match method {
        "size" | "length" => Ok(Value::int(len_as_int(s.chars().count()))),
        "isEmpty" => Ok(Value::bool(s.is_empty())),
        "trim" => Ok(Value::string(s.trim())),
        "toUpperCase" => Ok(Value::string(s.to_uppercase())),
        "toLowerCase" => Ok(Value::string(s.to_lowercase())),
        "toString" => Ok(Value::string(s)),
        "contains" => Ok(Value::bool(s.contains(text_arg()?.as_str()))),
        "startsWith" => Ok(Value::bool(s.starts_with(text_arg()?.as_str()))),
        "endsWith" => Ok(Value::bool(s.ends_with(text_arg()?.as_str()))),
        "split" => {
            let parts: Vec<Value> = match args.first() {
                Some(separator) => s
                    .split(separator.to_string().as_str())
                    .map(Value::string)
                    .collect(),
                None => s.split_whitespace().map(Value::string).collect(),
            };
            Ok(Value::list(parts))
        }
        "replace" => match args {
            [from, to] => Ok(Value::string(
                s.replace(from.to_string().as_str(), to.to_string().as_str()),
            )),
            _ => Err(wrong_arguments(method, 2, args.len())),
        },
        _ => Err(no_such_method(method, "String")),
    }
}

fn single_arg<'a>(method: &str, args: &'a [Value]) -> Result<&'a Value, ScriptError> {
    match args {
        [arg] => Ok(arg),
        _ => Err(wrong_arguments(method, 1, args.len())),
    }
}

fn wrong_arguments(method: &str, expected: usize, found: usize) -> ScriptError {
    ScriptError::Runtime(format!(
        "Method {}() expects {} argument(s) but received {}",
        method, expected, found
    ))
}

fn no_such_method(method: &str, type_name: &str) -> ScriptError {
    ScriptError::Runtime(format!(
        "No signature of method: {}.{}() is applicable",
        type_name, method
    ))
}

fn no_such_field(field: &str, type_name: &str) -> ScriptError {
    ScriptError::Runtime(format!(
        "No such property: {} for class: {}",
        field, type_name
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::{compiler, environment::SharedOutput},
        models::OutputLevel,
        system::tasks::SystemTasks,
    };

    fn interpreter() -> (Interpreter, SharedOutput) {
        let out = SharedOutput::new();
        let env = Environment::new(
            Box::new(SystemTasks::new(".", true, OutputLevel::Normal)),
            Box::new(out.clone()),
            OutputLevel::Normal,
        );
        (Interpreter::new(env), out)
    }

    fn run(source: &str) -> (Interpreter, SharedOutput, Result<(), ScriptError>) {
        let (mut interp, out) = interpreter();
        let unit = compiler::compile_source(source, "test.gant", "test_gant").unwrap();
        let result = interp.run_unit(&unit);
        (interp, out, result)
    }

    #[test]
    fn test_top_level_definitions_bind_into_environment() {
        let (interp, _, result) = run("def version = '1.0'\nname = 'app'");
        result.unwrap();
        assert_eq!(interp.env().get("version").unwrap().as_str(), Some("1.0"));
        assert_eq!(interp.env().get("name").unwrap().as_str(), Some("app"));
    }

    #[test]
    fn test_closure_locals_and_binding_writes() {
        let source = r#"
            counter = 0
            def bump = { ->
                def local = 10
                counter = counter + local
            }
            bump()
            bump()
        "#;
        let (interp, _, result) = run(source);
        result.unwrap();
        assert!(interp.env().get("counter").unwrap().equals(&Value::int(20)));
        assert!(interp.env().get("local").is_none());
    }

    #[test]
    fn test_closures_capture_their_scope() {
        let source = r#"
            def makeGreeter = { greeting ->
                return { name -> "${greeting}, ${name}!" }
            }
            def hello = makeGreeter('Hello')
            println(hello('world'))
        "#;
        let (_, out, result) = run(source);
        result.unwrap();
        assert_eq!(out.contents(), "Hello, world!\n");
    }

    #[test]
    fn test_missing_binding_is_located() {
        let (_, _, result) = run("def a = 1\nprintln(nothing)");
        let err = result.unwrap_err();
        assert_eq!(err.missing_binding(), Some("nothing"));
        assert_eq!(
            err.to_string(),
            "test.gant, line 2: No such property: nothing"
        );
    }

    #[test]
    fn test_control_flow_and_collections() {
        let source = r#"
            def total = 0
            for (n in [1, 2, 3, 4]) {
                if (n % 2 == 0) { total = total + n } else { total = total - 1 }
            }
            def m = [b: 2, a: 1]
            def keys = m.keys().join(',')
            def upper = ['x', 'y'].collect { it.toUpperCase() }
            println("${total} ${keys} ${upper} ${m.a}")
        "#;
        let (_, out, result) = run(source);
        result.unwrap();
        assert_eq!(out.contents(), "4 a,b [X, Y] 1\n");
    }

    #[test]
    fn test_runaway_recursion_is_an_error() {
        // Debug builds use large frames; give the nested calls room.
        let message = std::thread::Builder::new()
            .stack_size(64 * 1024 * 1024)
            .spawn(|| {
                let (_, _, result) = run("def f = { -> f() }\nf()");
                result.unwrap_err().to_string()
            })
            .unwrap()
            .join()
            .unwrap();
        assert!(message.contains("Maximum call depth"));
    }

    #[test]
    fn test_runtime_type_errors() {
        let (_, _, result) = run("def x = 1 - 'a'");
        assert!(matches!(result.unwrap_err().root(), ScriptError::Runtime(_)));
        let (_, _, result) = run("def x = 1 / 0");
        assert!(result.unwrap_err().to_string().contains("Division by zero"));
    }

    #[test]
    fn test_index_and_string_methods() {
        let source = r#"
            def parts = 'a-b-c'.split('-')
            println(parts[-1] + parts[0] + parts.size())
            println(' pad '.trim().length())
            println('build.gant'.endsWith('.gant'))
        "#;
        let (_, out, result) = run(source);
        result.unwrap();
        assert_eq!(out.contents(), "ca3\n3\ntrue\n");
    }
}
