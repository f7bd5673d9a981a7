//! Command-line surface: a thin wrapper around the compiler core.

pub mod args;
pub mod driver;
