//! # gantlet
//!
//! A build-script runner. A script declares named, described targets with
//! `target(name: 'description') { ... }`; the runner loads it into a shared
//! Environment and invokes the requested targets (or the default one).
//!
//! - **`core`**: the script language (lexer, parser, interpreter), the
//!   Environment and its registration protocol, the compile cache, the loader
//!   and the dispatcher.
//! - **`system`**: process execution and the task library scripts drive
//!   through `ant`.
//! - **`cli`**: argument parsing and the run/list handlers behind the binary.

pub mod cli;
pub mod constants;
pub mod core;
pub mod models;
pub mod system;
