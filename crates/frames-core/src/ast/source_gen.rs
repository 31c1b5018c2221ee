// Source generation from the class IR
// `RustEmitter` renders a transformed module as Rust against the frame runtime;
// `ToSource` prints the IR back in declaration syntax for inspection.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::*;

/// Trait for IR nodes that can print themselves in declaration syntax
pub trait ToSource {
    fn to_source(&self) -> String;
}

/// Knobs for the generated Rust
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmitConfig {
    /// Module path the generated code imports the runtime from
    pub runtime_path: String,
    /// Suffix of synthesized record type names
    pub record_suffix: String,
    /// Derive/implement `Debug` on generated types
    pub derive_debug: bool,
}

impl Default for EmitConfig {
    fn default() -> Self {
        Self {
            runtime_path: "frames_core::runtime".to_string(),
            record_suffix: "Record".to_string(),
            derive_debug: true,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EmitError {
    #[error("{host} is framed but its record type {record} is not in the module")]
    MissingRecordType { host: String, record: String },

    #[error("{class}: cannot render {detail}")]
    Unsupported { class: String, detail: String },
}

const RUST_KEYWORDS: &[&str] = &[
    "as", "async", "await", "break", "const", "continue", "dyn", "else", "enum", "extern",
    "false", "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move", "mut", "pub",
    "ref", "return", "static", "struct", "trait", "true", "type", "unsafe", "use", "where", "while",
    "yield", "box", "final", "macro", "override", "priv", "typeof", "unsized", "virtual",
];

/// `camelCase` / `PascalCase` to `snake_case`
pub fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev_lower = false;
    for c in name.chars() {
        if c.is_uppercase() {
            if prev_lower {
                out.push('_');
            }
            out.extend(c.to_lowercase());
            prev_lower = false;
        } else {
            out.push(c);
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
        }
    }
    out
}

/// Snake-cased identifier, raw when it collides with a Rust keyword
pub fn rust_ident(name: &str) -> String {
    let snake = snake_case(name);
    if matches!(snake.as_str(), "crate" | "self" | "super") {
        format!("{snake}_")
    } else if RUST_KEYWORDS.contains(&snake.as_str()) {
        format!("r#{snake}")
    } else {
        snake
    }
}

fn is_copy(ty: &TypeRef) -> bool {
    ty.args.is_empty() && matches!(ty.name.as_str(), "Int" | "Long" | "Double" | "Float" | "Boolean")
}

/// Rust spelling of a declared type
pub fn rust_type(ty: &TypeRef) -> String {
    let base = match (ty.name.as_str(), ty.args.as_slice()) {
        ("Int" | "Long", _) => "i64".to_string(),
        ("Double", _) => "f64".to_string(),
        ("Float", _) => "f32".to_string(),
        ("Boolean", _) => "bool".to_string(),
        ("String", _) => "String".to_string(),
        ("List", [item]) => format!("Vec<{}>", rust_type(item)),
        (name, []) => name.to_string(),
        (name, args) => {
            let args: Vec<String> = args.iter().map(rust_type).collect();
            format!("{name}<{}>", args.join(", "))
        }
    };
    if ty.nullable {
        format!("Option<{base}>")
    } else {
        base
    }
}

fn rust_literal(literal: &Literal) -> String {
    match literal {
        Literal::Int(value) => value.to_string(),
        Literal::Float(value) => format!("{value:?}"),
        Literal::Bool(value) => value.to_string(),
        Literal::String(value) => format!("String::from({value:?})"),
        Literal::Null => "None".to_string(),
    }
}

/// Renders transformed modules as Rust source
pub struct RustEmitter {
    config: EmitConfig,
}

/// What `this` and `field` mean while rendering one body
struct Scope<'a> {
    class: &'a str,
    receiver: &'a str,
    property: Option<&'a str>,
    types: &'a HashMap<String, TypeRef>,
    /// Properties stored in the record; `this.<name>` goes through accessors
    framed: &'a [String],
}

impl<'a> Scope<'a> {
    fn with_receiver(&self, receiver: &'a str) -> Scope<'a> {
        Scope {
            class: self.class,
            receiver,
            property: self.property,
            types: self.types,
            framed: self.framed,
        }
    }

    fn with_property(&self, property: &'a str) -> Scope<'a> {
        Scope {
            class: self.class,
            receiver: self.receiver,
            property: Some(property),
            types: self.types,
            framed: self.framed,
        }
    }

    fn is_framed_access(&self, target: &Expr, name: &str) -> bool {
        matches!(target, Expr::This) && self.framed.iter().any(|f| f == name)
    }

    fn unsupported(&self, detail: impl Into<String>) -> EmitError {
        EmitError::Unsupported {
            class: self.class.to_string(),
            detail: detail.into(),
        }
    }
}

impl RustEmitter {
    pub fn new(config: EmitConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EmitConfig {
        &self.config
    }

    /// Render `module`; `origin` names the source in the header
    pub fn emit_module(&self, module: &Module, origin: &str) -> Result<String, EmitError> {
        let mut out = String::new();
        out.push_str(&format!("// Generated by framec from {origin}. Do not edit.\n"));

        if module.classes.iter().any(ClassDecl::is_framed) {
            out.push_str("\nuse std::sync::Arc;\n\n");
            out.push_str(&format!(
                "use {}::{{notify_created, readable, writable, FrameManager, Framed, Record, RecordChain, StateRecord}};\n",
                self.config.runtime_path
            ));
        }

        for class in &module.classes {
            let rendered = match class.origin {
                ClassOrigin::SyntheticRecord { .. } => self.emit_record(class)?,
                ClassOrigin::Declared if class.is_framed() => self.emit_framed_host(class, module)?,
                ClassOrigin::Declared => self.emit_plain(class, module)?,
            };
            out.push('\n');
            out.push_str(&rendered);
        }
        Ok(out)
    }

    fn debug_derive(&self, extra: &str) -> String {
        if self.config.derive_debug {
            format!("#[derive(Debug, {extra})]\n")
        } else {
            format!("#[derive({extra})]\n")
        }
    }

    fn emit_record(&self, record: &ClassDecl) -> Result<String, EmitError> {
        let types: HashMap<String, TypeRef> =
            record.fields.iter().map(|f| (f.name.clone(), f.ty.clone())).collect();
        let scope = Scope {
            class: &record.name,
            receiver: "self",
            property: None,
            types: &types,
            framed: &[],
        };

        let mut out = self.debug_derive("Clone, Default");
        out.push_str(&format!("pub struct {} {{\n", record.name));
        for field in &record.fields {
            out.push_str(&format!("    pub {}: {},\n", rust_ident(&field.name), rust_type(&field.ty)));
        }
        out.push_str("}\n\n");

        out.push_str(&format!("impl Record for {} {{\n", record.name));
        let mut first = true;
        for method in record.methods.iter().filter(|m| m.implements.as_deref() == Some(RECORD_TRAIT)) {
            if !first {
                out.push('\n');
            }
            first = false;
            match method.name.as_str() {
                "create" => {
                    out.push_str("    fn create() -> Self {\n");
                    out.push_str(&self.render_body(&method.body, &scope, 2)?);
                    out.push_str("    }\n");
                }
                "assign" => {
                    let other = method.params.first().map(|p| rust_ident(&p.name)).unwrap_or_else(|| "other".into());
                    out.push_str(&format!("    fn assign(&mut self, {other}: &Self) {{\n"));
                    out.push_str(&self.render_body(&method.body, &scope, 2)?);
                    out.push_str("    }\n");
                }
                other => return Err(scope.unsupported(format!("Record method {other}"))),
            }
        }
        out.push_str("}\n");
        Ok(out)
    }

    fn emit_framed_host(&self, host: &ClassDecl, module: &Module) -> Result<String, EmitError> {
        let record_type = host
            .field(RECORD_FIELD)
            .map(|field| field.ty.name.clone())
            .unwrap_or_else(|| format!("{}{}", host.name, self.config.record_suffix));
        let record = module.class(&record_type).ok_or_else(|| EmitError::MissingRecordType {
            host: host.name.clone(),
            record: record_type.clone(),
        })?;

        let types = class_types(host, Some(record));
        let framed: Vec<String> = record.fields.iter().map(|f| f.name.clone()).collect();
        let scope = Scope {
            class: &host.name,
            receiver: "self",
            property: None,
            types: &types,
            framed: &framed,
        };
        let stored = stored_properties(host, record);
        let base = self.superclass_in(host, module);

        let mut out = String::new();
        if let Some(external) = self.external_superclass(host, module) {
            out.push_str(&format!("// extends {external}, which is not declared in this module\n"));
        }
        out.push_str(&format!("pub struct {} {{\n", host.name));
        out.push_str(&format!("    frame_record: RecordChain<{record_type}>,\n"));
        if let Some(base) = base {
            out.push_str(&format!("    base: {},\n", base.name));
        }
        for (name, ty) in &stored {
            out.push_str(&format!("    {}: {},\n", rust_ident(name), rust_type(ty)));
        }
        out.push_str("}\n\n");

        out.push_str(&format!("impl {} {{\n", host.name));
        out.push_str(&self.emit_framed_constructors(host, &stored, base, &scope)?);
        out.push_str(&self.emit_accessors(host, &scope, "&self")?);
        out.push_str(&self.emit_methods(host, &scope)?);
        out.push_str("}\n");

        if let Some(base) = base {
            out.push('\n');
            out.push_str(&deref_impl(&host.name, &base.name));
        }

        if self.config.derive_debug {
            out.push_str(&format!("\nimpl std::fmt::Debug for {} {{\n", host.name));
            out.push_str("    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {\n");
            out.push_str(&format!("        f.debug_struct(\"{}\")\n", host.name));
            out.push_str("            .field(\"id\", &self.frame_record.id())\n");
            out.push_str("            .field(\"generations\", &self.frame_record.generations())\n");
            out.push_str("            .finish()\n");
            out.push_str("    }\n}\n");
        }

        out.push_str(&format!("\nimpl Framed for {} {{\n", host.name));
        out.push_str(&format!("    type Record = {record_type};\n"));
        for method in host.methods.iter().filter(|m| m.implements.as_deref() == Some(FRAMED_MARKER)) {
            out.push('\n');
            match method.name.as_str() {
                FIRST_FRAME_RECORD => {
                    out.push_str(&format!(
                        "    fn first_frame_record(&self) -> &RecordChain<{record_type}> {{\n"
                    ));
                    let body = match method.body.as_slice() {
                        [Stmt::Return(chain)] => self.render_expr(chain, &scope)?,
                        _ => return Err(scope.unsupported("firstFrameRecord body")),
                    };
                    out.push_str(&format!("        &{body}\n    }}\n"));
                }
                PREPEND_FRAME_RECORD => {
                    let param = method.params.first().map(|p| rust_ident(&p.name)).unwrap_or_else(|| "record".into());
                    out.push_str(&format!(
                        "    fn prepend_frame_record(&self, {param}: StateRecord<{record_type}>) -> Arc<StateRecord<{record_type}>> {{\n"
                    ));
                    let body = match method.body.as_slice() {
                        [Stmt::Expr(expr)] | [Stmt::Return(expr)] => self.render_expr(expr, &scope)?,
                        _ => return Err(scope.unsupported("prependFrameRecord body")),
                    };
                    out.push_str(&format!("        {body}\n    }}\n"));
                }
                other => return Err(scope.unsupported(format!("Framed method {other}"))),
            }
        }
        out.push_str("}\n");

        if host.constructors.iter().all(ConstructorDecl::is_zero_arg) {
            out.push_str(&format!("\nimpl Default for {} {{\n", host.name));
            out.push_str("    fn default() -> Self {\n        Self::new()\n    }\n}\n");
        }
        Ok(out)
    }

    fn emit_framed_constructors(
        &self,
        host: &ClassDecl,
        stored: &[(String, TypeRef)],
        base: Option<&ClassDecl>,
        scope: &Scope<'_>,
    ) -> Result<String, EmitError> {
        let constructor = host.constructors.first().cloned().unwrap_or_default();
        let params: Vec<String> = constructor
            .params
            .iter()
            .map(|p| format!("{}: {}", rust_ident(&p.name), rust_type(&p.ty)))
            .collect();
        let this = scope.with_receiver("this");

        let mut out = String::new();
        if constructor.is_zero_arg() {
            out.push_str("    /// Construct in the ambient frame manager\n");
            out.push_str("    pub fn new() -> Self {\n");
            out.push_str("        Self::new_in(&FrameManager::ambient())\n");
            out.push_str("    }\n\n");
        }

        let mut signature = vec!["manager: &Arc<FrameManager>".to_string()];
        signature.extend(params);
        out.push_str(&format!("    pub fn new_in({}) -> Self {{\n", signature.join(", ")));

        let mut blocks = host.initializers.iter();
        let (chain_init, rest) = match blocks.next().map(Vec::as_slice) {
            Some([Stmt::Assign { target, value: Expr::NewChain(initial) }, rest @ ..])
                if is_record_field(target) =>
            {
                (self.render_expr(initial, &this)?, rest)
            }
            _ => return Err(scope.unsupported("initializer without a record chain")),
        };

        let mutated = !constructor.body.is_empty() || host.initializers.len() > 1;
        let binding = if mutated { "let mut this" } else { "let this" };
        out.push_str(&format!("        {binding} = Self {{\n"));
        out.push_str(&format!(
            "            frame_record: RecordChain::new_in(manager, \"{}\", {chain_init}),\n",
            host.name
        ));
        if let Some(base) = base {
            let args = self.super_args(&constructor, &this)?;
            out.push_str(&format!("            base: {},\n", self.base_constructor(base, &args)));
        }
        for (name, ty) in stored {
            let value = match host.property(name).and_then(|p| p.initializer.as_ref()) {
                Some(initializer) => self.render_value(initializer, &this, Some(ty))?,
                None => "Default::default()".to_string(),
            };
            out.push_str(&format!("            {}: {value},\n", rust_ident(name)));
        }
        out.push_str("        };\n");

        let mut body = String::new();
        for stmt in rest.iter().chain(blocks.flatten()).chain(constructor.body.iter()) {
            body.push_str(&self.render_stmt(stmt, &this, 2, false)?);
        }
        out.push_str(&body);
        out.push_str("        this\n    }\n");

        Ok(out)
    }

    fn super_args(&self, constructor: &ConstructorDecl, scope: &Scope<'_>) -> Result<String, EmitError> {
        let mut rendered = String::new();
        for arg in constructor.super_call.iter().flatten() {
            rendered.push_str(", ");
            rendered.push_str(&self.render_value(arg, scope, None)?);
        }
        Ok(rendered)
    }

    fn emit_accessors(&self, class: &ClassDecl, scope: &Scope<'_>, setter_receiver: &str) -> Result<String, EmitError> {
        let mut out = String::new();
        for property in &class.properties {
            let property_scope = scope.with_property(&property.name);
            let getter = property.getter.clone().unwrap_or_else(|| {
                Accessor::getter(vec![Stmt::Return(Expr::BackingField)])
            });
            out.push('\n');
            out.push_str(&format!(
                "    pub fn {}(&self) -> {} {{\n",
                rust_ident(&property.name),
                rust_type(&property.ty)
            ));
            out.push_str(&self.render_body(&getter.body, &property_scope, 2)?);
            out.push_str("    }\n");

            // computed properties without a setter stay read-only
            if !property.mutable || (property.setter.is_none() && !property.has_backing_field()) {
                continue;
            }
            let setter = property.setter.clone().unwrap_or_else(|| {
                Accessor::setter(
                    "value",
                    vec![Stmt::Assign {
                        target: Expr::BackingField,
                        value: Expr::local("value"),
                    }],
                )
            });
            let param = setter.param.as_deref().map(rust_ident).unwrap_or_else(|| "value".into());
            out.push('\n');
            out.push_str(&format!(
                "    pub fn set_{}({setter_receiver}, {param}: {}) {{\n",
                snake_case(&property.name),
                rust_type(&property.ty)
            ));
            out.push_str(&self.render_body(&setter.body, &property_scope, 2)?);
            out.push_str("    }\n");
        }
        Ok(out)
    }

    /// User methods; trait implementations are emitted elsewhere
    fn emit_methods(&self, class: &ClassDecl, scope: &Scope<'_>) -> Result<String, EmitError> {
        let mut out = String::new();
        for method in class.methods.iter().filter(|m| m.implements.is_none()) {
            let mut params: Vec<String> = match method.receiver {
                Receiver::Ref => vec!["&self".to_string()],
                Receiver::Mut => vec!["&mut self".to_string()],
                Receiver::None => Vec::new(),
            };
            params.extend(
                method
                    .params
                    .iter()
                    .map(|p| format!("{}: {}", rust_ident(&p.name), rust_type(&p.ty))),
            );
            let returns = method
                .returns
                .as_ref()
                .map(|ty| format!(" -> {}", rust_type(ty)))
                .unwrap_or_default();
            out.push('\n');
            out.push_str(&format!(
                "    pub fn {}({}){returns} {{\n",
                rust_ident(&method.name),
                params.join(", ")
            ));
            out.push_str(&self.render_body(&method.body, scope, 2)?);
            out.push_str("    }\n");
        }
        Ok(out)
    }

    fn emit_plain(&self, class: &ClassDecl, module: &Module) -> Result<String, EmitError> {
        let types = class_types(class, None);
        let scope = Scope {
            class: &class.name,
            receiver: "self",
            property: None,
            types: &types,
            framed: &[],
        };
        let stored: Vec<(String, TypeRef)> = class
            .fields
            .iter()
            .filter(|f| !f.hidden)
            .map(|f| (f.name.clone(), f.ty.clone()))
            .chain(
                class
                    .properties
                    .iter()
                    .filter(|p| p.has_backing_field())
                    .map(|p| (p.name.clone(), p.ty.clone())),
            )
            .collect();
        let base = self.superclass_in(class, module);

        let mut out = String::new();
        if let Some(external) = self.external_superclass(class, module) {
            out.push_str(&format!("// extends {external}, which is not declared in this module\n"));
        }
        if self.config.derive_debug {
            out.push_str("#[derive(Debug)]\n");
        }
        out.push_str(&format!("pub struct {} {{\n", class.name));
        if let Some(base) = base {
            out.push_str(&format!("    base: {},\n", base.name));
        }
        for (name, ty) in &stored {
            out.push_str(&format!("    {}: {},\n", rust_ident(name), rust_type(ty)));
        }
        out.push_str("}\n\n");

        let constructor = class.constructors.first().cloned().unwrap_or_default();
        let this = scope.with_receiver("this");
        let params: Vec<String> = constructor
            .params
            .iter()
            .map(|p| format!("{}: {}", rust_ident(&p.name), rust_type(&p.ty)))
            .collect();

        out.push_str(&format!("impl {} {{\n", class.name));
        out.push_str(&format!("    pub fn new({}) -> Self {{\n", params.join(", ")));
        let initializers: Vec<&Stmt> = class.initializers.iter().flatten().chain(constructor.body.iter()).collect();
        let binding = if initializers.is_empty() { "let this" } else { "let mut this" };
        out.push_str(&format!("        {binding} = Self {{\n"));
        if let Some(base) = base {
            let args = self.super_args(&constructor, &this)?;
            // framed bases join the ambient manager
            out.push_str(&format!("            base: {}::new({}),\n", base.name, args.trim_start_matches(", ")));
        }
        for (name, ty) in &stored {
            let value = match class.property(name).and_then(|p| p.initializer.as_ref()) {
                Some(initializer) => self.render_value(initializer, &this, Some(ty))?,
                None => "Default::default()".to_string(),
            };
            out.push_str(&format!("            {}: {value},\n", rust_ident(name)));
        }
        out.push_str("        };\n");
        for stmt in initializers {
            out.push_str(&self.render_stmt(stmt, &this, 2, false)?);
        }
        out.push_str("        this\n    }\n");
        out.push_str(&self.emit_accessors(class, &scope, "&mut self")?);
        out.push_str(&self.emit_methods(class, &scope)?);
        out.push_str("}\n");

        if let Some(base) = base {
            out.push('\n');
            out.push_str(&deref_impl(&class.name, &base.name));
        }
        Ok(out)
    }

    /// Superclass declared in the same module
    fn superclass_in<'m>(&self, class: &ClassDecl, module: &'m Module) -> Option<&'m ClassDecl> {
        let superclass = class.superclass()?;
        module
            .class(&superclass.name)
            .filter(|base| base.origin == ClassOrigin::Declared)
    }

    fn base_constructor(&self, base: &ClassDecl, args: &str) -> String {
        if base.is_framed() {
            format!("{}::new_in(manager{args})", base.name)
        } else {
            format!("{}::new({})", base.name, args.trim_start_matches(", "))
        }
    }

    fn external_superclass(&self, class: &ClassDecl, module: &Module) -> Option<String> {
        class
            .superclass()
            .filter(|ty| module.class(&ty.name).is_none())
            .map(ToString::to_string)
    }

    fn render_body(&self, body: &[Stmt], scope: &Scope<'_>, depth: usize) -> Result<String, EmitError> {
        let mut out = String::new();
        for (index, stmt) in body.iter().enumerate() {
            out.push_str(&self.render_stmt(stmt, scope, depth, index + 1 == body.len())?);
        }
        Ok(out)
    }

    fn render_stmt(&self, stmt: &Stmt, scope: &Scope<'_>, depth: usize, tail: bool) -> Result<String, EmitError> {
        let indent = "    ".repeat(depth);
        let line = match stmt {
            Stmt::Return(expr) if tail => self.render_value(expr, scope, None)?,
            Stmt::Return(expr) => format!("return {};", self.render_value(expr, scope, None)?),
            Stmt::Assign {
                target: Expr::FieldGet { target, name },
                value,
            } if scope.is_framed_access(target, name) => format!(
                "{}.set_{}({});",
                self.render_expr(target, scope)?,
                snake_case(name),
                self.render_value(value, scope, scope.types.get(name))?
            ),
            Stmt::Assign { target, value } => {
                let target_ty = self.place_type(target, scope);
                format!(
                    "{} = {};",
                    self.render_place(target, scope)?,
                    self.render_value(value, scope, target_ty.as_ref())?
                )
            }
            Stmt::Expr(expr) => format!("{};", self.render_expr(expr, scope)?),
            Stmt::NotifyCreated => format!("notify_created(&{});", scope.receiver),
        };
        Ok(format!("{indent}{line}\n"))
    }

    fn place_type(&self, target: &Expr, scope: &Scope<'_>) -> Option<TypeRef> {
        match target {
            Expr::FieldGet { name, .. } => scope.types.get(name).cloned(),
            Expr::BackingField => scope.property.and_then(|p| scope.types.get(p)).cloned(),
            _ => None,
        }
    }

    /// Assignment target
    fn render_place(&self, target: &Expr, scope: &Scope<'_>) -> Result<String, EmitError> {
        match target {
            Expr::BackingField => {
                let property = scope.property.ok_or_else(|| scope.unsupported("field outside an accessor"))?;
                Ok(format!("{}.{}", scope.receiver, rust_ident(property)))
            }
            Expr::Local(name) => Ok(rust_ident(name)),
            Expr::FieldGet { target, name } => Ok(format!("{}.{}", self.render_record(target, scope, true)?, rust_ident(name))),
            other => Err(scope.unsupported(format!("assignment to {}", other.to_source()))),
        }
    }

    /// Receiver of a field access; record handles are locked for `write` or read
    fn render_record(&self, target: &Expr, scope: &Scope<'_>, write: bool) -> Result<String, EmitError> {
        let lock = if write { "write" } else { "read" };
        match strip_cast(target) {
            Expr::Readable { .. } => Ok(format!("{}.read()", self.render_expr(strip_cast(target), scope)?)),
            Expr::Writable { .. } => Ok(format!("{}.write()", self.render_expr(strip_cast(target), scope)?)),
            Expr::FirstRecord(_) => Ok(format!("{}.{lock}()", self.render_expr(strip_cast(target), scope)?)),
            other => self.render_expr(other, scope),
        }
    }

    /// Expression whose value is moved out, cloning non-`Copy` field reads
    fn render_value(&self, expr: &Expr, scope: &Scope<'_>, expected: Option<&TypeRef>) -> Result<String, EmitError> {
        let rendered = self.render_expr(expr, scope)?;
        let field_type = match expr {
            Expr::FieldGet { target, name } if scope.is_framed_access(target, name) => None,
            Expr::FieldGet { name, .. } => scope.types.get(name),
            Expr::BackingField => scope.property.and_then(|p| scope.types.get(p)),
            _ => None,
        };
        let wrap_some = matches!(expected, Some(ty) if ty.nullable)
            && !matches!(expr, Expr::Literal(Literal::Null))
            && matches!(expr, Expr::Literal(_) | Expr::List(_));
        let rendered = match field_type {
            Some(ty) if !is_copy(ty) => format!("{rendered}.clone()"),
            _ => rendered,
        };
        Ok(if wrap_some { format!("Some({rendered})") } else { rendered })
    }

    fn render_expr(&self, expr: &Expr, scope: &Scope<'_>) -> Result<String, EmitError> {
        Ok(match expr {
            Expr::Literal(literal) => rust_literal(literal),
            Expr::List(items) => {
                let items: Result<Vec<String>, EmitError> =
                    items.iter().map(|item| self.render_value(item, scope, None)).collect();
                format!("vec![{}]", items?.join(", "))
            }
            Expr::This => scope.receiver.to_string(),
            Expr::Local(name) => rust_ident(name),
            Expr::BackingField => self.render_place(expr, scope)?,
            Expr::FieldGet { target, name } if name == RECORD_FIELD => {
                format!("{}.frame_record", self.render_expr(target, scope)?)
            }
            Expr::FieldGet { target, name } if scope.is_framed_access(target, name) => {
                format!("{}.{}()", self.render_expr(target, scope)?, rust_ident(name))
            }
            Expr::FieldGet { target, name } => {
                format!("{}.{}", self.render_record(target, scope, false)?, rust_ident(name))
            }
            Expr::Readable { chain, instance } => format!(
                "readable(&{}, {})",
                self.render_expr(chain, scope)?,
                self.render_expr(instance, scope)?
            ),
            Expr::Writable { chain, instance } => format!(
                "writable(&{}, {})",
                self.render_expr(chain, scope)?,
                self.render_expr(instance, scope)?
            ),
            // record handles are typed already
            Expr::Cast { expr, .. } => self.render_expr(expr, scope)?,
            Expr::NewRecord(ty) => format!("{}::default()", rust_type(ty)),
            Expr::NewChain(initial) => format!(
                "RecordChain::new_in(manager, \"{}\", {})",
                scope.class,
                self.render_expr(initial, scope)?
            ),
            Expr::FirstRecord(chain) => format!("{}.first_record()", self.render_expr(chain, scope)?),
            Expr::PrependRecord { chain, record } => format!(
                "{}.prepend({})",
                self.render_expr(chain, scope)?,
                self.render_expr(record, scope)?
            ),
        })
    }
}

impl Default for RustEmitter {
    fn default() -> Self {
        Self::new(EmitConfig::default())
    }
}

fn strip_cast(expr: &Expr) -> &Expr {
    match expr {
        Expr::Cast { expr, .. } => strip_cast(expr),
        other => other,
    }
}

fn is_record_field(target: &Expr) -> bool {
    matches!(target, Expr::FieldGet { target, name } if **target == Expr::This && name == RECORD_FIELD)
}

fn class_types(class: &ClassDecl, record: Option<&ClassDecl>) -> HashMap<String, TypeRef> {
    let mut types: HashMap<String, TypeRef> = class
        .properties
        .iter()
        .map(|p| (p.name.clone(), p.ty.clone()))
        .collect();
    for field in class.fields.iter().chain(record.into_iter().flat_map(|r| r.fields.iter())) {
        types.insert(field.name.clone(), field.ty.clone());
    }
    types
}

/// Host-side storage of a framed class: visible fields and unframed properties
fn stored_properties(host: &ClassDecl, record: &ClassDecl) -> Vec<(String, TypeRef)> {
    host.fields
        .iter()
        .filter(|f| !f.hidden)
        .map(|f| (f.name.clone(), f.ty.clone()))
        .chain(
            host.properties
                .iter()
                .filter(|p| record.field(&p.name).is_none() && p.has_backing_field())
                .map(|p| (p.name.clone(), p.ty.clone())),
        )
        .collect()
}

fn deref_impl(class: &str, base: &str) -> String {
    format!(
        "impl std::ops::Deref for {class} {{\n    type Target = {base};\n\n    fn deref(&self) -> &{base} {{\n        &self.base\n    }}\n}}\n"
    )
}

impl ToSource for Literal {
    fn to_source(&self) -> String {
        match self {
            Literal::Int(value) => value.to_string(),
            Literal::Float(value) => format!("{value:?}"),
            Literal::Bool(value) => value.to_string(),
            Literal::String(value) => format!("{value:?}"),
            Literal::Null => "null".to_string(),
        }
    }
}

impl ToSource for Expr {
    fn to_source(&self) -> String {
        match self {
            Expr::Literal(literal) => literal.to_source(),
            Expr::List(items) => {
                let items: Vec<String> = items.iter().map(ToSource::to_source).collect();
                format!("[{}]", items.join(", "))
            }
            Expr::This => "this".to_string(),
            Expr::Local(name) => name.clone(),
            Expr::BackingField => "field".to_string(),
            Expr::FieldGet { target, name } => format!("{}.{name}", target.to_source()),
            Expr::Readable { chain, instance } => {
                format!("_readable({}, {})", chain.to_source(), instance.to_source())
            }
            Expr::Writable { chain, instance } => {
                format!("_writable({}, {})", chain.to_source(), instance.to_source())
            }
            Expr::Cast { expr, ty } => format!("({} as {ty})", expr.to_source()),
            Expr::NewRecord(ty) => format!("{ty}()"),
            Expr::NewChain(initial) => format!("_newChain({})", initial.to_source()),
            Expr::FirstRecord(chain) => format!("_first({})", chain.to_source()),
            Expr::PrependRecord { chain, record } => {
                format!("_prepend({}, {})", chain.to_source(), record.to_source())
            }
        }
    }
}

impl ToSource for Stmt {
    fn to_source(&self) -> String {
        match self {
            Stmt::Return(expr) => format!("return {}", expr.to_source()),
            Stmt::Assign { target, value } => format!("{} = {}", target.to_source(), value.to_source()),
            Stmt::Expr(expr) => expr.to_source(),
            Stmt::NotifyCreated => "_notifyCreated(this)".to_string(),
        }
    }
}

fn block_source(body: &[Stmt], indent: &str) -> String {
    let mut out = String::from("{\n");
    for stmt in body {
        out.push_str(&format!("{indent}  {}\n", stmt.to_source()));
    }
    out.push_str(indent);
    out.push('}');
    out
}

impl ToSource for PropertyDecl {
    fn to_source(&self) -> String {
        let keyword = if self.mutable { "var" } else { "val" };
        let mut out = format!("{keyword} {}: {}", self.name, self.ty);
        if let Some(initializer) = &self.initializer {
            out.push_str(&format!(" = {}", initializer.to_source()));
        }
        if let Some(getter) = &self.getter {
            out.push_str(&format!("\n    get() {}", block_source(&getter.body, "    ")));
        }
        if let Some(setter) = &self.setter {
            let param = setter.param.as_deref().unwrap_or("value");
            out.push_str(&format!("\n    set({param}) {}", block_source(&setter.body, "    ")));
        }
        out
    }
}

impl ToSource for ClassDecl {
    fn to_source(&self) -> String {
        let mut out = String::new();
        for annotation in &self.annotations {
            out.push_str(&format!("@{annotation}\n"));
        }
        out.push_str(&format!("class {}", self.name));
        if !self.supertypes.is_empty() {
            let supertypes: Vec<String> = self.supertypes.iter().map(ToString::to_string).collect();
            out.push_str(&format!(" : {}", supertypes.join(", ")));
        }
        out.push_str(" {\n");
        for field in &self.fields {
            let hidden = if field.hidden { "hidden " } else { "" };
            out.push_str(&format!("  {hidden}field {}: {}\n", field.name, field.ty));
        }
        for property in &self.properties {
            out.push_str(&format!("  {}\n", property.to_source()));
        }
        for constructor in &self.constructors {
            let params: Vec<String> = constructor.params.iter().map(|p| format!("{}: {}", p.name, p.ty)).collect();
            out.push_str(&format!("  constructor({})", params.join(", ")));
            if let Some(args) = &constructor.super_call {
                let args: Vec<String> = args.iter().map(ToSource::to_source).collect();
                out.push_str(&format!(" : super({})", args.join(", ")));
            }
            out.push_str(&format!(" {}\n", block_source(&constructor.body, "  ")));
        }
        for block in &self.initializers {
            out.push_str(&format!("  init {}\n", block_source(block, "  ")));
        }
        for method in &self.methods {
            let params: Vec<String> = method.params.iter().map(|p| format!("{}: {}", p.name, p.ty)).collect();
            let returns = method.returns.as_ref().map(|ty| format!(": {ty}")).unwrap_or_default();
            out.push_str(&format!("  fun {}({}){returns} {}\n", method.name, params.join(", "), block_source(&method.body, "  ")));
        }
        out.push('}');
        out
    }
}

impl ToSource for Module {
    fn to_source(&self) -> String {
        let classes: Vec<String> = self.classes.iter().map(ToSource::to_source).collect();
        classes.join("\n\n")
    }
}
