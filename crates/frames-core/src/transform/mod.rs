/*!
# Framing transformer

Rewrites framed classes so their stored properties live in versioned state
records instead of in the object.

## Architecture

- `FramingFacts`: which classes are framed and which properties move
- `ClassRule`: trait for one step of the rewrite
- `framing_rules`: the standard steps (record type, `$record`, chain
  operations, initializers, accessors, marker)
- `ClassTransformer`: runs the rules over a module and collects diagnostics
- `FileTransformer`: reads declaration files, transforms them and writes Rust

## Example Usage

```rust
use frames_core::parser::parse_module;
use frames_core::transform::ClassTransformer;

let module = parse_module("@Framed class Counter { var count: Int = 0 }").unwrap();
let outcome = ClassTransformer::framing().transform_module(module);
assert!(outcome.summary.success());
assert!(outcome.module.class("CounterRecord").is_some());
```
*/

pub mod class_transformer;
pub mod environment;
pub mod errors;
pub mod facts;
pub mod file_transformer;
pub mod framing_rules;
pub mod rules;

pub use class_transformer::{ClassTransformer, TransformOutcome, TransformationSummary, TransformedClass};
pub use environment::{ClassEnvironment, STATE_RECORD};
pub use errors::TransformError;
pub use facts::{ClassFacts, FramingFacts};
pub use file_transformer::{FileTransformationSummary, FileTransformer};
pub use rules::{ClassRule, FramedUnit, RuleStats};

#[derive(Debug, Clone)]
pub struct TransformationContext {
    pub source_file: Option<String>,
    pub class_name: Option<String>,
    /// Base type every synthesized record extends
    pub record_base: String,
    /// Appended to a host's name to name its record type
    pub record_suffix: String,
}

impl Default for TransformationContext {
    fn default() -> Self {
        Self {
            source_file: None,
            class_name: None,
            record_base: STATE_RECORD.to_string(),
            record_suffix: "Record".to_string(),
        }
    }
}

impl TransformationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source_file(mut self, file: String) -> Self {
        self.source_file = Some(file);
        self
    }

    pub fn with_class_name(mut self, name: String) -> Self {
        self.class_name = Some(name);
        self
    }

    pub fn with_record_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.record_suffix = suffix.into();
        self
    }

    pub fn record_type_name(&self, class: &str) -> String {
        format!("{class}{}", self.record_suffix)
    }
}
