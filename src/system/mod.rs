//! # System Interaction Layer
//!
//! The boundary between the script runtime and the operating system.
//!
//! ## Modules
//!
//! - **`executor`**: spawns external processes, directly or through the
//!   platform shell, and captures their output.
//! - **`tasks`**: the task library behind the `ant` facade (file operations,
//!   echo, exec, properties), with dry-run support.

pub mod executor;
pub mod tasks;
