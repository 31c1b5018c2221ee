use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;

use crate::ast::{Expr, Stmt};
use crate::runtime::{context, Framed, ObjectId, RecordChain};

use super::interpreter::Interpreter;
use super::{DynamicClass, DynamicRecord, DynamicRuntime, EvalError, Value};

/// Record chain of one framed dynamic instance
pub struct FramedState {
    chain: RecordChain<DynamicRecord>,
}

impl FramedState {
    pub fn chain(&self) -> &RecordChain<DynamicRecord> {
        &self.chain
    }
}

impl Framed for FramedState {
    type Record = DynamicRecord;

    fn first_frame_record(&self) -> &RecordChain<DynamicRecord> {
        &self.chain
    }
}

/// An instance of a loaded class
pub struct DynamicInstance {
    class: Arc<DynamicClass>,
    state: Option<FramedState>,
    /// Unframed stored properties and plain fields
    fields: RwLock<IndexMap<String, Value>>,
    base: Option<Box<DynamicInstance>>,
}

impl DynamicInstance {
    pub(crate) fn construct(
        runtime: &DynamicRuntime,
        class: Arc<DynamicClass>,
        args: &[Value],
    ) -> Result<Self, EvalError> {
        let decl = &class.decl;
        let constructor = decl.constructors.first().cloned().unwrap_or_default();
        if constructor.params.len() != args.len() {
            return Err(EvalError::Arity {
                class: decl.name.clone(),
                expected: constructor.params.len(),
                actual: args.len(),
            });
        }
        let locals: HashMap<String, Value> = constructor
            .params
            .iter()
            .map(|param| param.name.clone())
            .zip(args.iter().cloned())
            .collect();

        let base = match decl.superclass().and_then(|ty| runtime.class(&ty.name)) {
            Some(base_class) => {
                let base_args = constructor
                    .super_call
                    .iter()
                    .flatten()
                    .map(|arg| Interpreter::constant(arg, &locals))
                    .collect::<Result<Vec<_>, _>>()?;
                Some(Box::new(Self::construct(runtime, base_class, &base_args)?))
            }
            None => None,
        };

        let mut blocks = decl.initializers.iter();
        let (state, rest): (Option<FramedState>, &[Stmt]) = if class.is_framed() {
            match blocks.next().map(Vec::as_slice) {
                Some([Stmt::Assign { value: Expr::NewChain(_), .. }, rest @ ..]) => {
                    let chain = RecordChain::new_in(runtime.manager(), decl.name.clone(), class.fresh_record());
                    (Some(FramedState { chain }), rest)
                }
                _ => {
                    return Err(EvalError::Load(format!(
                        "{} is framed but does not build its record chain",
                        decl.name
                    )))
                }
            }
        } else {
            (None, &[])
        };

        let mut fields = IndexMap::new();
        for field in decl.fields.iter().filter(|field| !field.hidden) {
            fields.insert(field.name.clone(), Value::zero_of(&field.ty));
        }
        for property in &decl.properties {
            if class.slot(&property.name).is_some() || !property.has_backing_field() {
                continue;
            }
            let value = match &property.initializer {
                Some(initializer) => Interpreter::constant(initializer, &locals)?,
                None => Value::zero_of(&property.ty),
            };
            fields.insert(property.name.clone(), value);
        }

        let instance = Self {
            class: Arc::clone(&class),
            state,
            fields: RwLock::new(fields),
            base,
        };

        let body: Vec<&Stmt> = rest
            .iter()
            .chain(blocks.flatten())
            .chain(constructor.body.iter())
            .collect();
        let mut interpreter = Interpreter::new(&instance, None, locals);
        for stmt in body {
            interpreter.exec(stmt)?;
        }
        Ok(instance)
    }

    pub fn class(&self) -> &Arc<DynamicClass> {
        &self.class
    }

    pub fn class_name(&self) -> &str {
        self.class.name()
    }

    pub fn framed_state(&self) -> Option<&FramedState> {
        self.state.as_ref()
    }

    pub fn id(&self) -> Option<ObjectId> {
        self.state.as_ref().map(|state| state.chain.id())
    }

    pub fn base(&self) -> Option<&DynamicInstance> {
        self.base.as_deref()
    }

    /// Property names, own first, then inherited ones
    pub fn property_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.class.decl.properties.iter().map(|p| p.name.clone()).collect();
        if let Some(base) = &self.base {
            for name in base.property_names() {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        names
    }

    /// Read a property through its getter
    pub fn get(&self, property: &str) -> Result<Value, EvalError> {
        let Some(decl) = self.class.decl.property(property) else {
            return match &self.base {
                Some(base) => base.get(property),
                None => Err(self.unknown(property)),
            };
        };
        self.ensure_visible()?;
        let getter = decl
            .getter
            .clone()
            .unwrap_or_else(|| crate::ast::Accessor::getter(vec![Stmt::Return(Expr::BackingField)]));

        let mut interpreter = Interpreter::new(self, Some(property), HashMap::new());
        interpreter
            .run(&getter.body)?
            .ok_or_else(|| EvalError::MissingReturn {
                class: self.class_name().to_string(),
                property: property.to_string(),
            })
    }

    /// Write a property through its setter.
    ///
    /// Framed properties need a frame entered on the calling thread.
    pub fn set(&self, property: &str, value: Value) -> Result<(), EvalError> {
        let Some(decl) = self.class.decl.property(property) else {
            return match &self.base {
                Some(base) => base.set(property, value),
                None => Err(self.unknown(property)),
            };
        };
        if !decl.mutable {
            return Err(EvalError::ReadOnly {
                class: self.class_name().to_string(),
                property: property.to_string(),
            });
        }
        if !value.conforms(&decl.ty) {
            return Err(EvalError::TypeMismatch {
                class: self.class_name().to_string(),
                property: property.to_string(),
                expected: decl.ty.to_string(),
                actual: value.type_name().to_string(),
            });
        }
        if self.class.slot(property).is_some() && context::current_frame().is_none() {
            return Err(EvalError::NoOpenFrame {
                class: self.class_name().to_string(),
                property: property.to_string(),
            });
        }
        self.ensure_visible()?;

        let (param, body) = match &decl.setter {
            Some(setter) => (setter.param.clone().unwrap_or_else(|| "value".to_string()), setter.body.clone()),
            None => (
                "value".to_string(),
                vec![Stmt::Assign {
                    target: Expr::BackingField,
                    value: Expr::local("value"),
                }],
            ),
        };
        let locals = HashMap::from([(param, value)]);
        let mut interpreter = Interpreter::new(self, Some(property), locals);
        interpreter.run(&body)?;
        Ok(())
    }

    /// Snapshot of every property as read right now
    pub fn properties(&self) -> Result<IndexMap<String, Value>, EvalError> {
        self.property_names()
            .into_iter()
            .map(|name| self.get(&name).map(|value| (name, value)))
            .collect()
    }

    pub(crate) fn field(&self, name: &str) -> Option<Value> {
        self.fields.read().get(name).cloned()
    }

    pub(crate) fn set_field(&self, name: &str, value: Value) -> bool {
        match self.fields.write().get_mut(name) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Instances built in a frame that was discarded, or that a frame
    /// opened too early, have no record to read
    fn ensure_visible(&self) -> Result<(), EvalError> {
        match &self.state {
            Some(state) if !state.chain.has_visible_record() => Err(EvalError::NotVisible {
                class: self.class_name().to_string(),
                object: state.chain.id().to_string(),
            }),
            _ => Ok(()),
        }
    }

    fn unknown(&self, property: &str) -> EvalError {
        EvalError::UnknownProperty {
            class: self.class_name().to_string(),
            property: property.to_string(),
        }
    }
}

impl std::fmt::Debug for DynamicInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut debug = f.debug_struct(self.class_name());
        if let Some(state) = &self.state {
            debug
                .field("id", &state.chain.id())
                .field("generations", &state.chain.generations());
        }
        debug.field("fields", &*self.fields.read()).finish()
    }
}
