//! Evaluation of accessor and initializer bodies for dynamic instances.

use std::collections::HashMap;
use std::sync::Arc;

use crate::ast::{Expr, Stmt, ToSource, RECORD_FIELD};
use crate::runtime::{notify_created, readable, writable, StateRecord};

use super::instance::{DynamicInstance, FramedState};
use super::{DynamicRecord, EvalError, Value};

/// Intermediate result of evaluating an expression
enum Operand {
    Value(Value),
    This,
    /// `this.$record`
    Chain,
    Record(Arc<StateRecord<DynamicRecord>>),
}

pub(crate) struct Interpreter<'a> {
    instance: &'a DynamicInstance,
    /// Property whose accessor is running; gives `field` its meaning
    property: Option<&'a str>,
    locals: HashMap<String, Value>,
}

impl<'a> Interpreter<'a> {
    pub(crate) fn new(instance: &'a DynamicInstance, property: Option<&'a str>, locals: HashMap<String, Value>) -> Self {
        Self {
            instance,
            property,
            locals,
        }
    }

    /// Evaluate an expression that needs no instance: literals, lists and locals
    pub(crate) fn constant(expr: &Expr, locals: &HashMap<String, Value>) -> Result<Value, EvalError> {
        match expr {
            Expr::Literal(literal) => Ok(Value::from_literal(literal)),
            Expr::List(items) => items
                .iter()
                .map(|item| Self::constant(item, locals))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            Expr::Local(name) => locals
                .get(name)
                .cloned()
                .ok_or_else(|| EvalError::UnboundLocal(name.clone())),
            other => Err(EvalError::Unsupported(format!(
                "{} outside an instance",
                other.to_source()
            ))),
        }
    }

    /// Run a body; `Some` is the value of the first `return` reached
    pub(crate) fn run(&mut self, body: &[Stmt]) -> Result<Option<Value>, EvalError> {
        for stmt in body {
            if let Some(value) = self.exec(stmt)? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    pub(crate) fn exec(&mut self, stmt: &Stmt) -> Result<Option<Value>, EvalError> {
        match stmt {
            Stmt::Return(expr) => Ok(Some(self.value(expr)?)),
            Stmt::Expr(expr) => {
                self.eval(expr)?;
                Ok(None)
            }
            Stmt::Assign { target, value } => {
                let value = self.value(value)?;
                self.assign(target, value)?;
                Ok(None)
            }
            Stmt::NotifyCreated => {
                notify_created(self.state()?);
                Ok(None)
            }
        }
    }

    fn state(&self) -> Result<&'a FramedState, EvalError> {
        self.instance.framed_state().ok_or_else(|| {
            EvalError::Unsupported(format!("{} is not framed", self.instance.class_name()))
        })
    }

    fn backing_property(&self) -> Result<&'a str, EvalError> {
        self.property
            .ok_or_else(|| EvalError::Unsupported("`field` outside a property accessor".to_string()))
    }

    fn assign(&mut self, target: &Expr, value: Value) -> Result<(), EvalError> {
        match target {
            Expr::Local(name) => {
                self.locals.insert(name.clone(), value);
                Ok(())
            }
            Expr::BackingField => {
                let property = self.backing_property()?;
                if self.instance.set_field(property, value) {
                    Ok(())
                } else {
                    Err(EvalError::Unsupported(format!(
                        "{}.{property} has no stored value",
                        self.instance.class_name()
                    )))
                }
            }
            Expr::FieldGet { target, name } => match self.eval(target)? {
                Operand::Record(record) => {
                    let slot = self.slot(name)?;
                    record.write().set(slot, value);
                    Ok(())
                }
                Operand::This if self.instance.class().decl.property(name).is_some() => {
                    self.instance.set(name, value)
                }
                Operand::This => {
                    if self.instance.set_field(name, value) {
                        Ok(())
                    } else {
                        Err(EvalError::UnknownProperty {
                            class: self.instance.class_name().to_string(),
                            property: name.clone(),
                        })
                    }
                }
                _ => Err(EvalError::Unsupported(format!("assignment to {}", target.to_source()))),
            },
            other => Err(EvalError::Unsupported(format!("assignment to {}", other.to_source()))),
        }
    }

    fn slot(&self, name: &str) -> Result<usize, EvalError> {
        self.instance.class().slot(name).ok_or_else(|| EvalError::UnknownProperty {
            class: self.instance.class_name().to_string(),
            property: name.to_string(),
        })
    }

    fn value(&mut self, expr: &Expr) -> Result<Value, EvalError> {
        match self.eval(expr)? {
            Operand::Value(value) => Ok(value),
            _ => Err(EvalError::Unsupported(format!("{} is not a value", expr.to_source()))),
        }
    }

    fn eval(&mut self, expr: &Expr) -> Result<Operand, EvalError> {
        match expr {
            Expr::Literal(literal) => Ok(Operand::Value(Value::from_literal(literal))),
            Expr::List(items) => {
                let values = items
                    .iter()
                    .map(|item| self.value(item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Operand::Value(Value::List(values)))
            }
            Expr::Local(_) => Self::constant(expr, &self.locals).map(Operand::Value),
            Expr::This => Ok(Operand::This),
            Expr::BackingField => {
                let property = self.backing_property()?;
                self.instance.field(property).map(Operand::Value).ok_or_else(|| {
                    EvalError::Unsupported(format!(
                        "{}.{property} has no stored value",
                        self.instance.class_name()
                    ))
                })
            }
            Expr::FieldGet { target, name } if name == RECORD_FIELD => match self.eval(target)? {
                Operand::This => Ok(Operand::Chain),
                _ => Err(EvalError::Unsupported(expr.to_source())),
            },
            Expr::FieldGet { target, name } => match self.eval(target)? {
                Operand::Record(record) => {
                    let slot = self.slot(name)?;
                    let value = record.read().get(slot);
                    Ok(Operand::Value(value))
                }
                Operand::This => match self.instance.field(name) {
                    Some(value) if self.instance.class().decl.property(name).is_none() => Ok(Operand::Value(value)),
                    _ => self.instance.get(name).map(Operand::Value),
                },
                _ => Err(EvalError::Unsupported(format!("field access {}", expr.to_source()))),
            },
            Expr::Readable { chain, instance } => {
                let state = self.chain_owner(chain, instance)?;
                Ok(Operand::Record(readable(state.chain(), state)))
            }
            Expr::Writable { chain, instance } => {
                let state = self.chain_owner(chain, instance)?;
                Ok(Operand::Record(writable(state.chain(), state)))
            }
            Expr::Cast { expr, .. } => self.eval(expr),
            Expr::FirstRecord(chain) => match self.eval(chain)? {
                Operand::Chain => Ok(Operand::Record(self.state()?.chain().first_record())),
                _ => Err(EvalError::Unsupported(expr.to_source())),
            },
            Expr::NewRecord(_) | Expr::NewChain(_) | Expr::PrependRecord { .. } => Err(EvalError::Unsupported(
                format!("{} outside construction", expr.to_source()),
            )),
        }
    }

    fn chain_owner(&mut self, chain: &Expr, instance: &Expr) -> Result<&'a FramedState, EvalError> {
        match (self.eval(chain)?, self.eval(instance)?) {
            (Operand::Chain, Operand::This) => self.state(),
            _ => Err(EvalError::Unsupported(format!(
                "record access on {}",
                chain.to_source()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dynamic::DynamicRuntime;
    use crate::runtime::FrameManager;

    fn runtime(source: &str) -> DynamicRuntime {
        let runtime = DynamicRuntime::new(FrameManager::new(Default::default()));
        runtime.load_source(source).unwrap();
        runtime
    }

    #[test]
    fn test_constant_list() {
        let expr = Expr::List(vec![Expr::int(1), Expr::local("x")]);
        let locals = HashMap::from([("x".to_string(), Value::Int(2))]);
        assert_eq!(
            Interpreter::constant(&expr, &locals).unwrap(),
            Value::List(vec![Value::Int(1), Value::Int(2)])
        );
        assert_eq!(
            Interpreter::constant(&Expr::local("y"), &locals),
            Err(EvalError::UnboundLocal("y".into()))
        );
    }

    #[test]
    fn test_custom_getter_reads_record() {
        let runtime = runtime("@Framed class Box { var size: Int = 4 get() { return field } }");
        let instance = runtime.instantiate("Box", &[]).unwrap();
        assert_eq!(instance.get("size").unwrap(), Value::Int(4));
    }

    #[test]
    fn test_setter_with_custom_param() {
        let runtime = runtime("@Framed class Box { var size: Int = 1 set(next) { field = next } }");
        let instance = runtime.instantiate("Box", &[]).unwrap();
        runtime
            .manager()
            .with_frame(|_| instance.set("size", Value::Int(9)))
            .unwrap()
            .unwrap();
        assert_eq!(instance.get("size").unwrap(), Value::Int(9));
    }

    #[test]
    fn test_getter_reading_other_property() {
        let runtime = runtime("@Framed class Pair { var left: Int = 2 val same: Int get() = this.left }");
        let instance = runtime.instantiate("Pair", &[]).unwrap();
        assert_eq!(instance.get("same").unwrap(), Value::Int(2));
    }
}
