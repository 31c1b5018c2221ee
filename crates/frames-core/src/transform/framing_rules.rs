/*!
# Framing Rules

The steps that move a framed class's stored properties into a synthesized
record type. Together they produce:

- a `<Name>Record` class with one field per framed property, `create()` and
  `assign(other)`;
- the hidden `$record` field and the `firstFrameRecord` /
  `prependFrameRecord` chain operations on the host;
- an initializer that builds the first record, stores the property
  initializers into it and announces the new instance;
- accessors that go through `readable` / `writable`;
- the `Framed` marker supertype.
*/

use tracing::debug;

use crate::ast::{
    Accessor, ClassDecl, ClassOrigin, ConstructorDecl, Expr, FieldDecl, MethodDecl, Param,
    PropertyDecl, Receiver, Stmt, TypeRef, FIRST_FRAME_RECORD, FRAMED_MARKER, PREPEND_FRAME_RECORD,
    RECORD_FIELD, RECORD_TRAIT,
};

use super::{
    environment::ClassEnvironment,
    errors::TransformError,
    rules::{ClassRule, FramedUnit},
    TransformationContext,
};

/// `this.$record`
pub fn chain_expr() -> Expr {
    Expr::this_field(RECORD_FIELD)
}

/// `(readable(this.$record, this) as R).<name>`
pub fn readable_field(record_type: &TypeRef, name: &str) -> Expr {
    Expr::field(
        Expr::Cast {
            expr: Box::new(Expr::Readable {
                chain: Box::new(chain_expr()),
                instance: Box::new(Expr::This),
            }),
            ty: record_type.clone(),
        },
        name,
    )
}

/// `(writable(this.$record, this) as R).<name>`
pub fn writable_field(record_type: &TypeRef, name: &str) -> Expr {
    Expr::field(
        Expr::Cast {
            expr: Box::new(Expr::Writable {
                chain: Box::new(chain_expr()),
                instance: Box::new(Expr::This),
            }),
            ty: record_type.clone(),
        },
        name,
    )
}

/// `(first(this.$record) as R).<name>`, used only while constructing
pub fn first_record_field(record_type: &TypeRef, name: &str) -> Expr {
    Expr::field(
        Expr::Cast {
            expr: Box::new(Expr::FirstRecord(Box::new(chain_expr()))),
            ty: record_type.clone(),
        },
        name,
    )
}

fn rewrite_expr(expr: Expr, read: &Expr) -> Expr {
    let boxed = |inner: Box<Expr>| Box::new(rewrite_expr(*inner, read));
    match expr {
        Expr::BackingField => read.clone(),
        Expr::List(items) => Expr::List(items.into_iter().map(|e| rewrite_expr(e, read)).collect()),
        Expr::FieldGet { target, name } => Expr::FieldGet {
            target: boxed(target),
            name,
        },
        Expr::Readable { chain, instance } => Expr::Readable {
            chain: boxed(chain),
            instance: boxed(instance),
        },
        Expr::Writable { chain, instance } => Expr::Writable {
            chain: boxed(chain),
            instance: boxed(instance),
        },
        Expr::Cast { expr, ty } => Expr::Cast {
            expr: boxed(expr),
            ty,
        },
        Expr::NewChain(inner) => Expr::NewChain(boxed(inner)),
        Expr::FirstRecord(inner) => Expr::FirstRecord(boxed(inner)),
        Expr::PrependRecord { chain, record } => Expr::PrependRecord {
            chain: boxed(chain),
            record: boxed(record),
        },
        other @ (Expr::Literal(_) | Expr::This | Expr::Local(_) | Expr::NewRecord(_)) => other,
    }
}

/// Replace `field` reads with `read` and `field = ...` with a write to `write`
fn rewrite_stmt(stmt: Stmt, read: &Expr, write: &Expr) -> Stmt {
    match stmt {
        Stmt::Assign {
            target: Expr::BackingField,
            value,
        } => Stmt::Assign {
            target: write.clone(),
            value: rewrite_expr(value, read),
        },
        Stmt::Assign { target, value } => Stmt::Assign {
            target: rewrite_expr(target, read),
            value: rewrite_expr(value, read),
        },
        Stmt::Return(expr) => Stmt::Return(rewrite_expr(expr, read)),
        Stmt::Expr(expr) => Stmt::Expr(rewrite_expr(expr, read)),
        Stmt::NotifyCreated => Stmt::NotifyCreated,
    }
}

fn framed_property_mut<'u>(
    host: &'u mut ClassDecl,
    name: &str,
    rule: &'static str,
) -> Result<&'u mut PropertyDecl, TransformError> {
    let class = host.name.clone();
    host.properties
        .iter_mut()
        .find(|property| property.name == name)
        .ok_or_else(|| TransformError::rule(rule, &class, format!("framed property {name} is not declared")))
}

/// Generates the companion record type
pub struct SynthesizeRecordType;

impl ClassRule for SynthesizeRecordType {
    fn name(&self) -> &'static str {
        "SynthesizeRecordType"
    }

    fn description(&self) -> &'static str {
        "Generate <Name>Record with one field per framed property, create() and assign()"
    }

    fn priority(&self) -> u32 {
        600
    }

    fn matches(&self, unit: &FramedUnit, _context: &TransformationContext) -> bool {
        unit.record.is_none()
    }

    fn apply(&self, unit: &mut FramedUnit, _context: &TransformationContext) -> Result<bool, TransformError> {
        let base = &unit.base_record;
        if !ClassEnvironment::has_zero_arg_constructor(base) {
            return Err(TransformError::MissingBaseConstructor {
                class: unit.host.name.clone(),
                base: base.name.clone(),
            });
        }

        let record_type = unit.record_type.clone();
        let mut record = ClassDecl::new(&record_type.name);
        record.supertypes.push(TypeRef::named(&base.name));
        record.origin = ClassOrigin::SyntheticRecord {
            host_index: unit.host_index,
        };

        for name in &unit.framed {
            let property = unit.host.property(name).ok_or_else(|| {
                TransformError::rule(self.name(), &unit.host.name, format!("framed property {name} is not declared"))
            })?;
            record.fields.push(FieldDecl {
                name: name.clone(),
                ty: property.ty.clone(),
                hidden: false,
            });
        }

        // delegates to the base record's zero-argument constructor
        record.constructors.push(ConstructorDecl {
            params: Vec::new(),
            super_call: Some(Vec::new()),
            body: Vec::new(),
        });

        record.methods.push(MethodDecl {
            name: "create".to_string(),
            params: Vec::new(),
            returns: Some(record_type.clone()),
            body: vec![Stmt::Return(Expr::NewRecord(record_type.clone()))],
            implements: Some(RECORD_TRAIT.to_string()),
            receiver: Receiver::None,
        });

        let other = "other";
        let copies = unit
            .framed
            .iter()
            .map(|name| Stmt::Assign {
                target: Expr::this_field(name),
                value: Expr::field(
                    Expr::Cast {
                        expr: Box::new(Expr::local(other)),
                        ty: record_type.clone(),
                    },
                    name,
                ),
            })
            .collect();
        record.methods.push(MethodDecl {
            name: "assign".to_string(),
            params: vec![Param::new(other, TypeRef::named(&base.name))],
            returns: None,
            body: copies,
            implements: Some(RECORD_TRAIT.to_string()),
            receiver: Receiver::Mut,
        });

        debug!(class = %unit.host.name, record = %record.name, fields = record.fields.len(), "synthesized record type");
        unit.record = Some(record);
        Ok(true)
    }

    fn validate(&self, unit: &FramedUnit, _context: &TransformationContext) -> Result<(), TransformError> {
        match &unit.record {
            Some(record) if record.fields.len() == unit.framed.len() => Ok(()),
            Some(_) => Err(TransformError::rule(self.name(), &unit.host.name, "record fields do not match framed properties")),
            None => Err(TransformError::rule(self.name(), &unit.host.name, "no record type")),
        }
    }
}

/// Adds the hidden `$record` field
pub struct InstallRecordField;

impl ClassRule for InstallRecordField {
    fn name(&self) -> &'static str {
        "InstallRecordField"
    }

    fn description(&self) -> &'static str {
        "Add the hidden $record field holding the instance's record chain"
    }

    fn priority(&self) -> u32 {
        500
    }

    fn matches(&self, unit: &FramedUnit, _context: &TransformationContext) -> bool {
        unit.host.field(RECORD_FIELD).is_none()
    }

    fn apply(&self, unit: &mut FramedUnit, _context: &TransformationContext) -> Result<bool, TransformError> {
        unit.host.fields.push(FieldDecl {
            name: RECORD_FIELD.to_string(),
            ty: unit.record_type.clone(),
            hidden: true,
        });
        Ok(true)
    }
}

/// Adds `firstFrameRecord()` and `prependFrameRecord(record)`
pub struct InstallChainOperations;

impl ClassRule for InstallChainOperations {
    fn name(&self) -> &'static str {
        "InstallChainOperations"
    }

    fn description(&self) -> &'static str {
        "Generate firstFrameRecord() and prependFrameRecord(record) for the frame runtime"
    }

    fn priority(&self) -> u32 {
        400
    }

    fn apply(&self, unit: &mut FramedUnit, _context: &TransformationContext) -> Result<bool, TransformError> {
        let mut changed = false;
        if unit.host.method(FIRST_FRAME_RECORD).is_none() {
            unit.host.methods.push(MethodDecl {
                name: FIRST_FRAME_RECORD.to_string(),
                params: Vec::new(),
                returns: Some(unit.record_type.clone()),
                body: vec![Stmt::Return(chain_expr())],
                implements: Some(FRAMED_MARKER.to_string()),
                receiver: Receiver::Ref,
            });
            changed = true;
        }
        if unit.host.method(PREPEND_FRAME_RECORD).is_none() {
            let record = "record";
            unit.host.methods.push(MethodDecl {
                name: PREPEND_FRAME_RECORD.to_string(),
                params: vec![Param::new(record, unit.record_type.clone())],
                returns: None,
                body: vec![Stmt::Expr(Expr::PrependRecord {
                    chain: Box::new(chain_expr()),
                    record: Box::new(Expr::local(record)),
                })],
                implements: Some(FRAMED_MARKER.to_string()),
                receiver: Receiver::Ref,
            });
            changed = true;
        }
        Ok(changed)
    }
}

/// Moves framed initializers into the first record
pub struct RewriteInitializers;

impl ClassRule for RewriteInitializers {
    fn name(&self) -> &'static str {
        "RewriteInitializers"
    }

    fn description(&self) -> &'static str {
        "Build the first record in an initializer block, store initializers into it and announce the instance"
    }

    fn priority(&self) -> u32 {
        300
    }

    fn apply(&self, unit: &mut FramedUnit, _context: &TransformationContext) -> Result<bool, TransformError> {
        let record_type = unit.record_type.clone();
        let mut block = vec![Stmt::Assign {
            target: chain_expr(),
            value: Expr::NewChain(Box::new(Expr::NewRecord(record_type.clone()))),
        }];

        for name in unit.framed.clone() {
            let property = framed_property_mut(&mut unit.host, &name, self.name())?;
            // never through the setter: no frame needs to be open here
            if let Some(initializer) = property.initializer.take() {
                block.push(Stmt::Assign {
                    target: first_record_field(&record_type, &name),
                    value: initializer,
                });
            }
        }
        block.push(Stmt::NotifyCreated);

        unit.host.initializers.insert(0, block);
        Ok(true)
    }

    fn validate(&self, unit: &FramedUnit, _context: &TransformationContext) -> Result<(), TransformError> {
        let leftover = unit
            .host
            .properties
            .iter()
            .find(|property| unit.is_framed_property(&property.name) && property.initializer.is_some());
        if let Some(property) = leftover {
            return Err(TransformError::rule(
                self.name(),
                &unit.host.name,
                format!("{} still has an inline initializer", property.name),
            ));
        }
        match unit.host.initializers.first().and_then(|block| block.last()) {
            Some(Stmt::NotifyCreated) => Ok(()),
            _ => Err(TransformError::rule(self.name(), &unit.host.name, "initializer does not announce the instance")),
        }
    }
}

/// Routes framed property accessors through the frame runtime
pub struct RewriteAccessors;

impl ClassRule for RewriteAccessors {
    fn name(&self) -> &'static str {
        "RewriteAccessors"
    }

    fn description(&self) -> &'static str {
        "Replace backing-field reads with readable() and writes with writable()"
    }

    fn priority(&self) -> u32 {
        200
    }

    fn apply(&self, unit: &mut FramedUnit, _context: &TransformationContext) -> Result<bool, TransformError> {
        let record_type = unit.record_type.clone();
        for name in unit.framed.clone() {
            let read = readable_field(&record_type, &name);
            let write = writable_field(&record_type, &name);
            let property = framed_property_mut(&mut unit.host, &name, self.name())?;

            let getter = match property.getter.take() {
                Some(getter) => Accessor::getter(
                    getter
                        .body
                        .into_iter()
                        .map(|stmt| rewrite_stmt(stmt, &read, &write))
                        .collect(),
                ),
                None => Accessor::getter(vec![Stmt::Return(read.clone())]),
            };
            property.getter = Some(getter);

            if property.mutable {
                let setter = match property.setter.take() {
                    Some(setter) => Accessor {
                        param: setter.param,
                        body: setter
                            .body
                            .into_iter()
                            .map(|stmt| rewrite_stmt(stmt, &read, &write))
                            .collect(),
                    },
                    None => Accessor::setter(
                        "value",
                        vec![Stmt::Assign {
                            target: write.clone(),
                            value: Expr::local("value"),
                        }],
                    ),
                };
                property.setter = Some(setter);
            }
        }
        Ok(!unit.framed.is_empty())
    }

    fn validate(&self, unit: &FramedUnit, _context: &TransformationContext) -> Result<(), TransformError> {
        for property in &unit.host.properties {
            if !unit.is_framed_property(&property.name) {
                continue;
            }
            let direct = property.getter.iter().chain(property.setter.iter()).any(Accessor::references_field);
            if direct || property.getter.is_none() {
                return Err(TransformError::rule(
                    self.name(),
                    &unit.host.name,
                    format!("{} still reaches its backing field directly", property.name),
                ));
            }
        }
        Ok(())
    }
}

/// Adds the `Framed` marker supertype
pub struct AddFramedMarker;

impl ClassRule for AddFramedMarker {
    fn name(&self) -> &'static str {
        "AddFramedMarker"
    }

    fn description(&self) -> &'static str {
        "Add Framed to the supertypes so the runtime can dispatch on framed instances"
    }

    fn priority(&self) -> u32 {
        100
    }

    fn matches(&self, unit: &FramedUnit, _context: &TransformationContext) -> bool {
        !unit.host.has_supertype(FRAMED_MARKER)
    }

    fn apply(&self, unit: &mut FramedUnit, _context: &TransformationContext) -> Result<bool, TransformError> {
        unit.host.supertypes.push(TypeRef::named(FRAMED_MARKER));
        Ok(true)
    }
}

/// The standard pipeline, highest priority first
pub fn framing_rules() -> Vec<Box<dyn ClassRule>> {
    vec![
        Box::new(SynthesizeRecordType),
        Box::new(InstallRecordField),
        Box::new(InstallChainOperations),
        Box::new(RewriteInitializers),
        Box::new(RewriteAccessors),
        Box::new(AddFramedMarker),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::environment::STATE_RECORD;

    fn unit() -> FramedUnit {
        let mut host = ClassDecl::new("Counter");
        host.properties.push(
            PropertyDecl::new("count", TypeRef::named("Int"), true).with_initializer(Expr::int(0)),
        );
        host.properties.push(
            PropertyDecl::new("total", TypeRef::named("Int"), true)
                .with_getter(Accessor::getter(vec![Stmt::Return(Expr::BackingField)])),
        );
        FramedUnit {
            host,
            host_index: 0,
            record: None,
            framed: vec!["count".into(), "total".into()],
            record_type: TypeRef::named("CounterRecord"),
            base_record: ClassEnvironment::with_runtime()
                .lookup(STATE_RECORD)
                .cloned()
                .unwrap(),
        }
    }

    #[test]
    fn test_rewrite_replaces_field_in_custom_getter() {
        let mut unit = unit();
        let context = TransformationContext::new();
        RewriteAccessors.apply(&mut unit, &context).unwrap();
        RewriteAccessors.validate(&unit, &context).unwrap();

        let total = unit.host.property("total").unwrap();
        assert_eq!(
            total.getter,
            Some(Accessor::getter(vec![Stmt::Return(readable_field(
                &unit.record_type,
                "total"
            ))]))
        );
    }

    #[test]
    fn test_default_setter_writes_through_writable() {
        let mut unit = unit();
        let context = TransformationContext::new();
        RewriteAccessors.apply(&mut unit, &context).unwrap();

        let count = unit.host.property("count").unwrap();
        let setter = count.setter.as_ref().unwrap();
        assert_eq!(setter.param.as_deref(), Some("value"));
        assert_eq!(
            setter.body,
            vec![Stmt::Assign {
                target: writable_field(&unit.record_type, "count"),
                value: Expr::local("value"),
            }]
        );
    }

    #[test]
    fn test_initializer_moves_into_first_record() {
        let mut unit = unit();
        let context = TransformationContext::new();
        RewriteInitializers.apply(&mut unit, &context).unwrap();
        RewriteInitializers.validate(&unit, &context).unwrap();

        let block = &unit.host.initializers[0];
        assert_eq!(block.len(), 3);
        assert_eq!(
            block[1],
            Stmt::Assign {
                target: first_record_field(&unit.record_type, "count"),
                value: Expr::int(0),
            }
        );
        assert!(unit.host.property("count").unwrap().initializer.is_none());
    }

    #[test]
    fn test_base_without_zero_arg_constructor_fails() {
        let mut unit = unit();
        unit.base_record.constructors = vec![ConstructorDecl {
            params: vec![Param::new("seed", TypeRef::named("Int"))],
            ..ConstructorDecl::default()
        }];
        let err = SynthesizeRecordType
            .apply(&mut unit, &TransformationContext::new())
            .unwrap_err();
        assert!(matches!(err, TransformError::MissingBaseConstructor { .. }));
    }
}
