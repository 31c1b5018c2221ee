/*!
# Dynamic classes

Runs transformed class declarations directly against the frame runtime.
Framed properties live in [`DynamicRecord`]s held by an ordinary
`RecordChain`, so frames, commits, merges and collection behave exactly as
they do for generated Rust types.

```rust
use frames_core::dynamic::{DynamicRuntime, Value};
use frames_core::runtime::FrameManager;

let runtime = DynamicRuntime::new(FrameManager::new(Default::default()));
runtime.load_source("@Framed class Counter { var count: Int = 0 }").unwrap();
let counter = runtime.instantiate("Counter", &[]).unwrap();

runtime
    .manager()
    .with_frame(|_| counter.set("count", Value::Int(3)))
    .unwrap()
    .unwrap();
assert_eq!(counter.get("count").unwrap(), Value::Int(3));
```
*/

pub mod instance;
pub mod interpreter;
pub mod value;

use std::sync::Arc;

use dashmap::DashMap;
use indexmap::IndexMap;
use thiserror::Error;
use tracing::{debug, info};

use crate::ast::{ClassDecl, ClassOrigin, Module, TypeRef, RECORD_FIELD};
use crate::parser::parse_module;
use crate::runtime::FrameManager;
use crate::transform::{ClassTransformer, TransformationSummary};

pub use instance::{DynamicInstance, FramedState};
pub use value::{DynamicRecord, Value};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EvalError {
    #[error("Unknown class: {0}")]
    UnknownClass(String),

    #[error("{class} has no property {property}")]
    UnknownProperty { class: String, property: String },

    #[error("{class}.{property} is read-only")]
    ReadOnly { class: String, property: String },

    #[error("{class}.{property} expects {expected}, got {actual}")]
    TypeMismatch {
        class: String,
        property: String,
        expected: String,
        actual: String,
    },

    #[error("Unbound name: {0}")]
    UnboundLocal(String),

    #[error("{class}.{property} returned no value")]
    MissingReturn { class: String, property: String },

    #[error("{class} expects {expected} constructor arguments, got {actual}")]
    Arity {
        class: String,
        expected: usize,
        actual: usize,
    },

    #[error("Cannot write {class}.{property}: no frame is open on this thread")]
    NoOpenFrame { class: String, property: String },

    #[error("{class} {object} does not exist in this frame")]
    NotVisible { class: String, object: String },

    #[error("Unsupported in dynamic classes: {0}")]
    Unsupported(String),

    #[error("Load failed: {0}")]
    Load(String),
}

/// A loaded class: the transformed host plus its record layout
#[derive(Debug, Clone)]
pub struct DynamicClass {
    pub decl: ClassDecl,
    pub record: Option<ClassDecl>,
    /// Record slot of each framed property, in record field order
    pub layout: IndexMap<String, TypeRef>,
}

impl DynamicClass {
    /// Pair a declared class with its synthesized record from `module`
    pub fn from_module(decl: &ClassDecl, module: &Module) -> Result<Self, EvalError> {
        let record = match decl.field(RECORD_FIELD) {
            Some(field) => Some(module.class(&field.ty.name).cloned().ok_or_else(|| {
                EvalError::Load(format!("{} is framed but {} is missing", decl.name, field.ty.name))
            })?),
            None => None,
        };
        let layout = record
            .iter()
            .flat_map(|record| record.fields.iter())
            .map(|field| (field.name.clone(), field.ty.clone()))
            .collect();
        Ok(Self {
            decl: decl.clone(),
            record,
            layout,
        })
    }

    pub fn name(&self) -> &str {
        &self.decl.name
    }

    pub fn is_framed(&self) -> bool {
        self.record.is_some()
    }

    pub fn slot(&self, property: &str) -> Option<usize> {
        self.layout.get_index_of(property)
    }

    pub fn fresh_record(&self) -> DynamicRecord {
        DynamicRecord::with_layout(self.layout.values())
    }
}

/// Registry of loaded classes bound to one frame manager
pub struct DynamicRuntime {
    manager: Arc<FrameManager>,
    transformer: parking_lot::Mutex<ClassTransformer>,
    classes: DashMap<String, Arc<DynamicClass>>,
}

impl DynamicRuntime {
    pub fn new(manager: Arc<FrameManager>) -> Self {
        Self {
            manager,
            transformer: parking_lot::Mutex::new(ClassTransformer::framing()),
            classes: DashMap::new(),
        }
    }

    pub fn manager(&self) -> &Arc<FrameManager> {
        &self.manager
    }

    /// Register every declared class of an already transformed module
    pub fn load(&self, module: &Module) -> Result<Vec<String>, EvalError> {
        let mut loaded = Vec::new();
        for decl in module.classes.iter().filter(|c| c.origin == ClassOrigin::Declared) {
            let class = DynamicClass::from_module(decl, module)?;
            debug!(class = %class.name(), framed = class.is_framed(), slots = class.layout.len(), "loaded class");
            loaded.push(decl.name.clone());
            self.classes.insert(decl.name.clone(), Arc::new(class));
        }
        Ok(loaded)
    }

    /// Parse `.frames` source, frame it and load the result
    pub fn load_source(&self, source: &str) -> crate::Result<TransformationSummary> {
        let module = parse_module(source)?;
        self.load_declarations(module)
    }

    /// Frame an untransformed module and load the result
    pub fn load_declarations(&self, module: Module) -> crate::Result<TransformationSummary> {
        let outcome = self.transformer.lock().transform_module(module);
        if let Some(error) = outcome.summary.errors.first() {
            return Err(error.clone().into());
        }
        let loaded = self.load(&outcome.module)?;
        info!(classes = loaded.len(), framed = outcome.summary.classes_transformed, "loaded declarations");
        Ok(outcome.summary)
    }

    pub fn class(&self, name: &str) -> Option<Arc<DynamicClass>> {
        self.classes.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn class_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.classes.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    /// Construct an instance, running its initializers
    pub fn instantiate(&self, class: &str, args: &[Value]) -> Result<Arc<DynamicInstance>, EvalError> {
        let class = self
            .class(class)
            .ok_or_else(|| EvalError::UnknownClass(class.to_string()))?;
        DynamicInstance::construct(self, class, args).map(Arc::new)
    }
}

impl std::fmt::Debug for DynamicRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicRuntime")
            .field("classes", &self.class_names())
            .finish()
    }
}
