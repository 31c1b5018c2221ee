// Parser module - loads class declarations from `.frames` sources or JSON
use std::path::Path;

use thiserror::Error;

use crate::ast::Module;

pub mod declarations;

pub use declarations::{parse_expr, parse_module};

/// Errors raised while loading declarations
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Syntax error at {line}:{column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("Invalid JSON module: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unknown declaration format: {0}")]
    UnknownFormat(String),
}

/// Trait for all declaration parsers
pub trait Parser: Send + Sync {
    /// Parse a source text into a module
    fn parse(&mut self, source: &str) -> Result<Module, ParseError>;

    /// Parse a file
    fn parse_file(&mut self, path: &Path) -> Result<Module, ParseError> {
        let source = std::fs::read_to_string(path).map_err(|source| ParseError::Io {
            path: path.display().to_string(),
            source,
        })?;
        self.parse(&source)
    }

    /// Get parser name for debugging
    fn name(&self) -> &'static str;
}

/// The `.frames` declaration syntax
#[derive(Debug, Default)]
pub struct FramesParser;

impl Parser for FramesParser {
    fn parse(&mut self, source: &str) -> Result<Module, ParseError> {
        parse_module(source)
    }

    fn name(&self) -> &'static str {
        "frames"
    }
}

/// Modules serialized as JSON
#[derive(Debug, Default)]
pub struct JsonParser;

impl Parser for JsonParser {
    fn parse(&mut self, source: &str) -> Result<Module, ParseError> {
        Ok(serde_json::from_str(source)?)
    }

    fn name(&self) -> &'static str {
        "json"
    }
}

/// Create a parser by format name
pub fn create_parser(format: &str) -> Result<Box<dyn Parser>, ParseError> {
    match format {
        "frames" => Ok(Box::new(FramesParser)),
        "json" => Ok(Box::new(JsonParser)),
        other => Err(ParseError::UnknownFormat(other.to_string())),
    }
}

/// Pick a parser from a file extension
pub fn parser_for_path(path: &Path) -> Result<Box<dyn Parser>, ParseError> {
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    create_parser(&extension)
}

/// Read and parse a declaration file of either format
pub fn load_module(path: &Path) -> Result<Module, ParseError> {
    parser_for_path(path)?.parse_file(path)
}
