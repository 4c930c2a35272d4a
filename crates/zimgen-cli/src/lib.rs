//! CLI surface and handlers for zimgen.

pub mod handlers;
pub mod parser;

pub use parser::Cli;
