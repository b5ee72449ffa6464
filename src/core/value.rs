//! # Values
//!
//! Runtime values of the script language and the scope chain closures run in.

use crate::{
    core::{interpreter::Interpreter, tools::ToolDefinition},
    models::Stmt,
};
use std::{cell::RefCell, collections::BTreeMap, fmt, rc::Rc};

use super::interpreter::ScriptError;

/// A reference-counted script value. Cloning is cheap; identity (for targets)
/// is pointer identity.
#[derive(Clone)]
pub struct Value(
    /// The shared payload.
    pub Rc<ValueKind>,
);

/// What a `Value` holds.
pub enum ValueKind {
    /// `null`, also the result of statements and bodies without a value.
    Null,
    /// `true` or `false`.
    Bool(bool),
    /// A 64-bit integer.
    Int(i64),
    /// A string, quoted or interpolated.
    String(String),
    /// `[a, b]`.
    List(Vec<Value>),
    /// `[key: value]`, iterated in key order.
    Map(BTreeMap<String, Value>),
    /// `{ ... }` or `{ a, b -> ... }`.
    Closure(Closure),
    /// A registered target.
    Target(Rc<Target>),
    /// A native function.
    Builtin(Builtin),
    /// A native object such as `ant`.
    Object(NativeObject),
}

impl Value {
    /// Wraps `kind`.
    pub fn new(kind: ValueKind) -> Self {
        Self(Rc::new(kind))
    }

    /// The `null` value.
    pub fn null() -> Self {
        Self::new(ValueKind::Null)
    }

    /// A boolean.
    pub fn bool(value: bool) -> Self {
        Self::new(ValueKind::Bool(value))
    }

    /// An integer.
    pub fn int(value: i64) -> Self {
        Self::new(ValueKind::Int(value))
    }

    /// A string.
    pub fn string(value: impl Into<String>) -> Self {
        Self::new(ValueKind::String(value.into()))
    }

    /// A list.
    pub fn list(values: Vec<Self>) -> Self {
        Self::new(ValueKind::List(values))
    }

    /// A map.
    pub fn map(entries: BTreeMap<String, Self>) -> Self {
        Self::new(ValueKind::Map(entries))
    }

    /// A target value; every clone refers to the same target.
    pub fn target(target: Target) -> Self {
        Self::new(ValueKind::Target(Rc::new(target)))
    }

    /// A native function bound under `name`.
    pub fn builtin(name: &'static str, callback: BuiltinFn) -> Self {
        Self::new(ValueKind::Builtin(Builtin { name, callback }))
    }

    /// The payload.
    pub fn kind(&self) -> &ValueKind {
        &self.0
    }

    /// Whether this is `null`.
    pub fn is_null(&self) -> bool {
        matches!(self.kind(), ValueKind::Null)
    }

    /// The string payload, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self.kind() {
            ValueKind::String(s) => Some(s),
            _ => None,
        }
    }

    /// The target, if this is one.
    pub fn as_target(&self) -> Option<&Rc<Target>> {
        match self.kind() {
            ValueKind::Target(t) => Some(t),
            _ => None,
        }
    }

    /// Truth in conditions: `null`, `false`, `0` and empty strings or collections
    /// are false.
    pub fn is_truthy(&self) -> bool {
        match self.kind() {
            ValueKind::Null => false,
            ValueKind::Bool(b) => *b,
            ValueKind::Int(n) => *n != 0,
            ValueKind::String(s) => !s.is_empty(),
            ValueKind::List(values) => !values.is_empty(),
            ValueKind::Map(map) => !map.is_empty(),
            ValueKind::Closure(_)
            | ValueKind::Target(_)
            | ValueKind::Builtin(_)
            | ValueKind::Object(_) => true,
        }
    }

    /// The name used for this value's type in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self.kind() {
            ValueKind::Null => "null",
            ValueKind::Bool(_) => "Boolean",
            ValueKind::Int(_) => "Integer",
            ValueKind::String(_) => "String",
            ValueKind::List(_) => "List",
            ValueKind::Map(_) => "Map",
            ValueKind::Closure(_) => "Closure",
            ValueKind::Target(_) => "Target",
            ValueKind::Builtin(_) => "Function",
            ValueKind::Object(_) => "Object",
        }
    }

    /// Structural equality for data, identity for targets and closures.
    pub fn equals(&self, other: &Self) -> bool {
        match (self.kind(), other.kind()) {
            (ValueKind::Null, ValueKind::Null) => true,
            (ValueKind::Bool(a), ValueKind::Bool(b)) => a == b,
            (ValueKind::Int(a), ValueKind::Int(b)) => a == b,
            (ValueKind::String(a), ValueKind::String(b)) => a == b,
            (ValueKind::List(a), ValueKind::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.equals(y))
            }
            (ValueKind::Map(a), ValueKind::Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b)
                        .all(|((ka, va), (kb, vb))| ka == kb && va.equals(vb))
            }
            (ValueKind::Target(a), ValueKind::Target(b)) => Rc::ptr_eq(a, b),
            (ValueKind::Builtin(a), ValueKind::Builtin(b)) => a.name == b.name,
            _ => Rc::ptr_eq(&self.0, &other.0),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            ValueKind::String(s) => write!(f, "\"{s}\""),
            _ => write!(f, "{self}"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            ValueKind::Null => write!(f, "null"),
            ValueKind::Bool(b) => write!(f, "{b}"),
            ValueKind::Int(n) => write!(f, "{n}"),
            ValueKind::String(s) => write!(f, "{s}"),
            ValueKind::List(values) => {
                write!(f, "[")?;
                for (idx, value) in values.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{value}")?;
                }
                write!(f, "]")
            }
            ValueKind::Map(map) => {
                if map.is_empty() {
                    return write!(f, "[:]");
                }
                write!(f, "[")?;
                for (idx, (key, value)) in map.iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}:{value}")?;
                }
                write!(f, "]")
            }
            ValueKind::Closure(_) => write!(f, "<closure>"),
            ValueKind::Target(target) => write!(f, "{}", target.name),
            ValueKind::Builtin(builtin) => write!(f, "<builtin {}>", builtin.name),
            ValueKind::Object(object) => write!(f, "{object:?}"),
        }
    }
}

/// Lexical scope of a closure body: locals created with `def`, chained to the
/// scope the closure was defined in. Top-level code has no scope; its names live
/// in the Environment.
pub type ScopeRef = Rc<RefCell<Scope>>;

/// One level of the scope chain.
#[derive(Debug, Default)]
pub struct Scope {
    parent: Option<ScopeRef>,
    locals: BTreeMap<String, Value>,
}

impl Scope {
    /// A new empty scope in front of `parent`.
    pub fn with_parent(parent: Option<ScopeRef>) -> ScopeRef {
        Rc::new(RefCell::new(Self {
            parent,
            locals: BTreeMap::new(),
        }))
    }

    /// Creates or replaces a local in this scope.
    pub fn define(&mut self, name: &str, value: Value) {
        self.locals.insert(name.to_string(), value);
    }

    /// Resolves `name` from the innermost scope outwards.
    pub fn get(scope: &ScopeRef, name: &str) -> Option<Value> {
        if let Some(value) = scope.borrow().locals.get(name) {
            return Some(value.clone());
        }
        let parent = scope.borrow().parent.clone();
        parent.and_then(|p| Self::get(&p, name))
    }

    /// Updates the nearest scope that holds `name`. Returns the value back when no
    /// scope does, so the caller can write it elsewhere.
    pub fn assign(scope: &ScopeRef, name: &str, value: Value) -> Option<Value> {
        if let Some(slot) = scope.borrow_mut().locals.get_mut(name) {
            *slot = value;
            return None;
        }
        let parent = scope.borrow().parent.clone();
        match parent {
            Some(p) => Self::assign(&p, name, value),
            None => Some(value),
        }
    }
}

/// A deferred block of statements, with the scope it closes over.
#[derive(Clone)]
pub struct Closure {
    /// Declared parameter names; empty means the implicit `it`.
    pub params: Vec<String>,
    /// The statements of the block.
    pub body: Rc<[Stmt]>,
    /// The enclosing scope; `None` at top level.
    pub scope: Option<ScopeRef>,
    /// The script the closure was written in, for diagnostics.
    pub source_name: Rc<str>,
}

/// A registered target: a name, an optional description and a deferred body.
pub struct Target {
    /// The name it was registered under.
    pub name: String,
    /// `None` for undocumented targets.
    pub description: Option<String>,
    /// What invoking it runs.
    pub body: TargetBody,
}

/// The code behind a target.
pub enum TargetBody {
    /// The block given at registration.
    Closure(Closure),
    /// Invokes another target by name (the default target).
    Alias(String),
}

/// Signature of every native function.
pub type BuiltinFn = fn(&mut Interpreter, Vec<Value>) -> Result<Value, ScriptError>;

/// A function implemented by the runner and bound into the Environment.
#[derive(Clone)]
pub struct Builtin {
    /// The name it is bound under.
    pub name: &'static str,
    /// The implementation.
    pub callback: BuiltinFn,
}

/// Objects whose methods are implemented natively.
#[derive(Clone, Copy)]
pub enum NativeObject {
    /// The task-execution facade (`ant`).
    Tasks,
    /// A tool loaded with `includeTool`.
    Tool(&'static ToolDefinition),
}

impl fmt::Debug for NativeObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tasks => write!(f, "<tasks>"),
            Self::Tool(tool) => write!(f, "<tool {}>", tool.name),
        }
    }
}
