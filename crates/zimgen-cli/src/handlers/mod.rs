//! Command handlers, one per CLI mode.

pub mod check;
pub mod generate;
pub mod install;
pub mod interactive;
