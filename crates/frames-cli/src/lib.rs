//! framec - command-line front end for frames
//!
//! This crate provides source generation and checking for `.frames`
//! declaration files, plus an interactive REPL that loads declarations into
//! a dynamic runtime and drives frames by hand.

pub mod config;
pub mod repl;

// Re-export commonly used types for convenience
pub use config::CliConfig;
pub use repl::{DefaultNotifier, Repl, ReplCommand, ReplNotifier};
