use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ast::{Literal, TypeRef};
use crate::parser::parse_expr;
use crate::runtime::Record;

use super::interpreter::Interpreter;

/// A property value held by a dynamically loaded class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
}

impl Value {
    pub fn from_literal(literal: &Literal) -> Self {
        match literal {
            Literal::Int(value) => Value::Int(*value),
            Literal::Float(value) => Value::Float(*value),
            Literal::Bool(value) => Value::Bool(*value),
            Literal::String(value) => Value::String(value.clone()),
            Literal::Null => Value::Null,
        }
    }

    /// Parse a literal or list of literals written in declaration syntax
    pub fn parse(source: &str) -> crate::Result<Self> {
        let expr = parse_expr(source)?;
        Ok(Interpreter::constant(&expr, &HashMap::new())?)
    }

    /// Value a fresh record holds for a property of type `ty`
    pub fn zero_of(ty: &TypeRef) -> Self {
        if ty.nullable {
            return Value::Null;
        }
        match ty.name.as_str() {
            "Int" | "Long" => Value::Int(0),
            "Double" | "Float" => Value::Float(0.0),
            "Boolean" => Value::Bool(false),
            "String" => Value::String(String::new()),
            "List" => Value::List(Vec::new()),
            _ => Value::Null,
        }
    }

    /// Whether the value may be stored in a property declared as `ty`
    pub fn conforms(&self, ty: &TypeRef) -> bool {
        match (self, ty.name.as_str()) {
            (Value::Null, _) => ty.nullable,
            (Value::Int(_), "Int" | "Long") => true,
            (Value::Float(_), "Double" | "Float") => true,
            (Value::Bool(_), "Boolean") => true,
            (Value::String(_), "String") => true,
            (Value::List(items), "List") => match ty.args.first() {
                Some(item) => items.iter().all(|value| value.conforms(item)),
                None => true,
            },
            // class-typed properties are not checked
            (_, name) => !matches!(name, "Int" | "Long" | "Double" | "Float" | "Boolean" | "String" | "List"),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Boolean",
            Value::Int(_) => "Int",
            Value::Float(_) => "Double",
            Value::String(_) => "String",
            Value::List(_) => "List",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(value) => write!(f, "{value}"),
            Value::Int(value) => write!(f, "{value}"),
            Value::Float(value) => write!(f, "{value:?}"),
            Value::String(value) => write!(f, "{value:?}"),
            Value::List(items) => {
                write!(f, "[")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Record of a dynamically loaded class: one slot per framed property, in
/// the order of the record type's fields
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DynamicRecord {
    pub values: Vec<Value>,
}

impl DynamicRecord {
    pub fn with_layout<'a>(types: impl IntoIterator<Item = &'a TypeRef>) -> Self {
        Self {
            values: types.into_iter().map(Value::zero_of).collect(),
        }
    }

    pub fn get(&self, slot: usize) -> Value {
        self.values.get(slot).cloned().unwrap_or(Value::Null)
    }

    pub fn set(&mut self, slot: usize, value: Value) {
        if slot >= self.values.len() {
            self.values.resize(slot + 1, Value::Null);
        }
        self.values[slot] = value;
    }
}

impl Record for DynamicRecord {
    // layout-free; `assign` sizes it from the record it copies
    fn create() -> Self {
        Self::default()
    }

    fn assign(&mut self, other: &Self) {
        self.values.clone_from(&other.values);
    }

    /// Slot-wise three-way merge: a slot only one side changed takes that
    /// side's value; a slot both sides changed differently is a conflict.
    fn merge(current: &Self, base: &Self, committed: &Self) -> Option<Self> {
        let slots = current.values.len().max(committed.values.len());
        let mut merged = Vec::with_capacity(slots);
        for slot in 0..slots {
            let (mine, theirs, original) = (current.get(slot), committed.get(slot), base.get(slot));
            if mine == theirs || mine == original {
                merged.push(theirs);
            } else if theirs == original {
                merged.push(mine);
            } else {
                return None;
            }
        }
        Some(Self { values: merged })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(values: &[i64]) -> DynamicRecord {
        DynamicRecord {
            values: values.iter().copied().map(Value::Int).collect(),
        }
    }

    #[test]
    fn test_zero_values() {
        assert_eq!(Value::zero_of(&TypeRef::named("Int")), Value::Int(0));
        assert_eq!(Value::zero_of(&TypeRef::named("String").nullable()), Value::Null);
        assert_eq!(Value::zero_of(&TypeRef::named("Widget")), Value::Null);
    }

    #[test]
    fn test_conformance() {
        let ints = TypeRef::generic("List", vec![TypeRef::named("Int")]);
        assert!(Value::List(vec![Value::Int(1)]).conforms(&ints));
        assert!(!Value::List(vec![Value::Bool(true)]).conforms(&ints));
        assert!(!Value::Null.conforms(&TypeRef::named("Int")));
        assert!(Value::Null.conforms(&TypeRef::named("Int").nullable()));
        assert!(!Value::String("x".into()).conforms(&TypeRef::named("Int")));
    }

    #[test]
    fn test_parse_values() {
        assert_eq!(Value::parse("42").unwrap(), Value::Int(42));
        assert_eq!(
            Value::parse(r#"["a", null]"#).unwrap(),
            Value::List(vec![Value::String("a".into()), Value::Null])
        );
        assert!(Value::parse("this").is_err());
    }

    #[test]
    fn test_display() {
        let value = Value::List(vec![Value::Int(1), Value::String("a".into()), Value::Null]);
        assert_eq!(value.to_string(), r#"[1, "a", null]"#);
    }

    #[test]
    fn test_merge_disjoint_slots() {
        let base = record(&[0, 0]);
        let merged = DynamicRecord::merge(&record(&[1, 0]), &base, &record(&[0, 2])).unwrap();
        assert_eq!(merged, record(&[1, 2]));
    }

    #[test]
    fn test_merge_same_slot_conflicts() {
        let base = record(&[0]);
        assert!(DynamicRecord::merge(&record(&[1]), &base, &record(&[2])).is_none());
        assert_eq!(DynamicRecord::merge(&record(&[3]), &base, &record(&[3])), Some(record(&[3])));
    }
}
