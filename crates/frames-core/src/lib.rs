//! # Frames Core
//!
//! Frame-based versioned state for object graphs, including:
//! - The frame runtime: generations, record chains, frames, commit and
//!   collection
//! - The class declaration IR and its `.frames` / JSON parsers
//! - The framing transformer that moves stored properties into records
//! - A Rust emitter and a dynamic runtime for transformed classes
//!
//! Code that wants isolated, versioned properties either declares its types
//! with [`framed!`] or writes declarations and runs them through the
//! [`transform`] pipeline.

#![warn(clippy::all)]

pub mod ast;
pub mod dynamic;
pub mod parser;
pub mod runtime;
pub mod transform;

use std::path::Path;

use serde::{Deserialize, Serialize};

// Re-export commonly used types
pub use ast::{ClassDecl, EmitConfig, Module, RustEmitter, ToSource};
pub use dynamic::{DynamicInstance, DynamicRuntime, EvalError, Value};
pub use parser::{create_parser, parse_module, ParseError, Parser};
pub use runtime::{
    CommitEvent, CreatedObject, Frame, FrameError, FrameManager, FrameOptions, Framed, GcPolicy,
    Generation, ObjectId, Record, RecordChain, StateRecord,
};
pub use transform::{ClassTransformer, FileTransformer, TransformError, TransformationSummary};

/// Frames version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize tracing for frames components
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("frames_core=info"));
    // a subscriber installed earlier (tests, host application) wins
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Frame runtime configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FramesConfig {
    /// When stale records are trimmed from chains
    pub gc: GcPolicy,
    /// Frames that may be open at once per manager
    pub max_open_frames: usize,
    /// Emit a trace event for every record read
    pub trace_reads: bool,
}

impl Default for FramesConfig {
    fn default() -> Self {
        Self {
            gc: GcPolicy::OnCommit,
            max_open_frames: 1024,
            trace_reads: false,
        }
    }
}

impl FramesConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Error types for frames operations
#[derive(thiserror::Error, Debug)]
pub enum FramesError {
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),

    #[error("Evaluation error: {0}")]
    Eval(#[from] EvalError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),
}

/// Result type for frames operations
pub type Result<T> = std::result::Result<T, FramesError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_fill_missing_keys() {
        let config: FramesConfig = serde_json::from_str(r#"{"gc":"manual"}"#).unwrap();
        assert_eq!(config.gc, GcPolicy::Manual);
        assert_eq!(config.max_open_frames, 1024);
        assert!(!config.trace_reads);
    }

    #[test]
    fn test_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frames.json");
        std::fs::write(&path, r#"{"max_open_frames": 8, "trace_reads": true}"#).unwrap();
        let config = FramesConfig::from_json_file(&path).unwrap();
        assert_eq!(config.max_open_frames, 8);
        assert!(config.trace_reads);
        assert_eq!(config.gc, GcPolicy::OnCommit);
    }

    #[test]
    fn test_errors_convert() {
        let error: FramesError = FrameError::TooManyOpenFrames { limit: 1 }.into();
        assert!(error.to_string().contains("limit is 1"));
    }
}
