//! The logic behind each mode of the command line.

pub mod commons;
pub mod list;
pub mod run;
