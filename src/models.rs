//! # Models
//!
//! The compiled form of a script and the output verbosity shared by the
//! runtime and the task library.

use serde::{Deserialize, Serialize};

// --- COMPILED SCRIPT MODELS ---
// These are produced by the parser, executed by the interpreter, and written
// verbatim to the binary cache.

/// A compiled script: the unit that is cached on disk and evaluated against an
/// `Environment`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ScriptUnit {
    /// Identifier derived from the script file name (`build.gant` -> `build_gant`).
    pub class_name: String,
    /// Human-readable origin used in diagnostics (file path or "standard input").
    pub source_name: String,
    /// Top-level statements, in source order.
    pub statements: Vec<Stmt>,
}

/// A statement and the line it starts on.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Stmt {
    /// What the statement does.
    pub kind: StmtKind,
    /// 1-based source line.
    pub line: u32,
}

/// Statement forms.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// `def name = value`: a local inside closures, a binding at top level.
    Def {
        /// The name being defined.
        name: String,
        /// The initializer; `def name` alone binds `null`.
        value: Option<Expr>,
    },
    /// `name = value`: updates the nearest local, otherwise the binding.
    Assign {
        /// The name being assigned.
        name: String,
        /// The new value.
        value: Expr,
    },
    /// An expression evaluated for its effect.
    Expr(Expr),
    /// `if (condition) { ... } else { ... }`.
    If {
        /// Tested with script truthiness.
        condition: Expr,
        /// Runs when the condition holds.
        then_branch: Vec<Stmt>,
        /// Runs otherwise; `else if` nests another `If` here.
        else_branch: Option<Vec<Stmt>>,
    },
    /// `for (binding in iterable) { ... }`.
    For {
        /// The loop variable.
        binding: String,
        /// A list, a map (iterated as entries) or a string.
        iterable: Expr,
        /// The loop body.
        body: Vec<Stmt>,
    },
    /// `return` with an optional value.
    Return(Option<Expr>),
}

/// An expression and the line it starts on.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Expr {
    /// What the expression computes.
    pub kind: ExprKind,
    /// 1-based source line.
    pub line: u32,
}

/// Expression forms.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// A constant.
    Literal(Literal),
    /// A double-quoted string, pre-split into literal and interpolated parts.
    Template(Vec<TemplateComponent>),
    /// A name resolved through the scope chain, then the Environment.
    Variable(String),
    /// `[a, b]`.
    List(Vec<Expr>),
    /// `[key: value]`; `[:]` is the empty map.
    Map(Vec<(String, Expr)>),
    /// `{ a, b -> ... }`.
    Closure {
        /// Declared parameters; empty means the implicit `it`.
        params: Vec<String>,
        /// The block.
        body: Vec<Stmt>,
    },
    /// `callee(args)`.
    Call {
        /// The value being called.
        callee: Box<Expr>,
        /// Arguments in source order.
        args: Vec<Argument>,
    },
    /// `receiver.method(args)`.
    MethodCall {
        /// The value the method is looked up on.
        receiver: Box<Expr>,
        /// The method name.
        method: String,
        /// Arguments in source order.
        args: Vec<Argument>,
    },
    /// `target.field`.
    Field {
        /// The value being read from.
        target: Box<Expr>,
        /// The field name.
        field: String,
    },
    /// `target[index]`.
    Index {
        /// The list or map being indexed.
        target: Box<Expr>,
        /// The position or key.
        index: Box<Expr>,
    },
    /// `left op right`.
    Binary {
        /// The operator.
        op: BinaryOp,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand; not evaluated when `&&`/`||` short-circuit.
        right: Box<Expr>,
    },
    /// `op expr`.
    Unary {
        /// The operator.
        op: UnaryOp,
        /// The operand.
        expr: Box<Expr>,
    },
}

/// Constants written directly in the source.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum Literal {
    /// `null`.
    Null,
    /// `true` or `false`.
    Bool(bool),
    /// An integer literal.
    Int(i64),
    /// A single-quoted string, already unescaped.
    String(String),
}

/// A single call argument. Named arguments of one call are gathered into a
/// map that becomes the first positional argument.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum Argument {
    /// `value`.
    Positional(Expr),
    /// `name: value`.
    Named(String, Expr),
}

/// Binary operators.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `+`: addition, string concatenation or list concatenation.
    Add,
    /// `-`.
    Sub,
    /// `*`.
    Mul,
    /// `/`, integer division.
    Div,
    /// `%`.
    Mod,
    /// `==`.
    Equal,
    /// `!=`.
    NotEqual,
    /// `<`.
    Less,
    /// `<=`.
    LessEqual,
    /// `>`.
    Greater,
    /// `>=`.
    GreaterEqual,
    /// `&&`.
    And,
    /// `||`.
    Or,
}

/// Prefix operators.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `-`.
    Negate,
    /// `!`.
    Not,
}

/// One component of a pre-parsed string template.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum TemplateComponent {
    /// Text copied as is.
    Literal(String),
    /// `${a.b.c}`: a binding lookup followed by field accesses.
    Path(Vec<String>),
}

// --- OUTPUT LEVEL ---

/// How much task chatter the run produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum OutputLevel {
    /// `-s`: nothing but script output.
    Silent,
    /// `-q`: only messages that carry results.
    Quiet,
    /// The default.
    #[default]
    Normal,
    /// `-v`: also the detail of each task.
    Verbose,
}
