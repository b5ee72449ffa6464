//! # Core
//!
//! The script language, the Environment, the compile cache, loading and
//! dispatch.

pub mod builtins;
pub mod cache;
pub mod compiler;
pub mod dispatcher;
pub mod environment;
pub mod interpreter;
pub(crate) mod lexer;
pub mod loader;
pub(crate) mod parser;
pub mod paths;
pub mod settings;
pub mod tools;
pub mod value;
