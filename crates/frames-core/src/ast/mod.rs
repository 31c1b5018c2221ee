// Class declaration IR
// Produced by the declaration parser (or loaded from JSON), rewritten by the
// framing transformer and consumed by the Rust emitter and the dynamic runtime.

pub mod source_gen;
pub use source_gen::{rust_type, snake_case, EmitConfig, EmitError, RustEmitter, ToSource};

#[cfg(test)]
mod source_gen_tests;

use std::fmt;

use serde::{Deserialize, Serialize};

/// Name of the indirection field installed on framed classes
pub const RECORD_FIELD: &str = "$record";
/// Marker supertype of framed classes
pub const FRAMED_MARKER: &str = "Framed";
/// Trait implemented by synthesized record types
pub const RECORD_TRAIT: &str = "Record";
/// Annotation that opts a class into framing
pub const FRAMED_ANNOTATION: &str = "Framed";
/// Generated chain accessor returning `$record`
pub const FIRST_FRAME_RECORD: &str = "firstFrameRecord";
/// Generated chain operation pushing a new record
pub const PREPEND_FRAME_RECORD: &str = "prependFrameRecord";

/// A set of class declarations from one source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Module {
    #[serde(default)]
    pub classes: Vec<ClassDecl>,
}

impl Module {
    pub fn new(classes: Vec<ClassDecl>) -> Self {
        Self { classes }
    }

    pub fn class(&self, name: &str) -> Option<&ClassDecl> {
        self.classes.iter().find(|class| class.name == name)
    }

    pub fn class_mut(&mut self, name: &str) -> Option<&mut ClassDecl> {
        self.classes.iter_mut().find(|class| class.name == name)
    }
}

/// Where a class declaration came from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassOrigin {
    #[default]
    Declared,
    /// Record type synthesized for a framed class
    SyntheticRecord { host_index: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassDecl {
    pub name: String,
    #[serde(default)]
    pub annotations: Vec<String>,
    #[serde(default)]
    pub supertypes: Vec<TypeRef>,
    #[serde(default)]
    pub properties: Vec<PropertyDecl>,
    /// Plain fields; framed classes get `$record` here
    #[serde(default)]
    pub fields: Vec<FieldDecl>,
    #[serde(default)]
    pub constructors: Vec<ConstructorDecl>,
    #[serde(default)]
    pub methods: Vec<MethodDecl>,
    /// Instance initializer blocks, run in order after construction
    #[serde(default)]
    pub initializers: Vec<Vec<Stmt>>,
    #[serde(default)]
    pub origin: ClassOrigin,
}

impl ClassDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn has_annotation(&self, annotation: &str) -> bool {
        self.annotations.iter().any(|a| a == annotation)
    }

    pub fn has_supertype(&self, name: &str) -> bool {
        self.supertypes.iter().any(|ty| ty.name == name)
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDecl> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn field(&self, name: &str) -> Option<&FieldDecl> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn method(&self, name: &str) -> Option<&MethodDecl> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// Supertype that is a class (not the framed marker), if any
    pub fn superclass(&self) -> Option<&TypeRef> {
        self.supertypes.iter().find(|ty| ty.name != FRAMED_MARKER)
    }

    /// True once the class carries the framed marker or indirection field
    pub fn is_framed(&self) -> bool {
        self.has_supertype(FRAMED_MARKER) || self.field(RECORD_FIELD).is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDecl {
    pub name: String,
    pub ty: TypeRef,
    /// `var` (true) or `val` (false)
    pub mutable: bool,
    #[serde(default)]
    pub initializer: Option<Expr>,
    #[serde(default)]
    pub getter: Option<Accessor>,
    #[serde(default)]
    pub setter: Option<Accessor>,
}

impl PropertyDecl {
    pub fn new(name: impl Into<String>, ty: TypeRef, mutable: bool) -> Self {
        Self {
            name: name.into(),
            ty,
            mutable,
            initializer: None,
            getter: None,
            setter: None,
        }
    }

    pub fn with_initializer(mut self, initializer: Expr) -> Self {
        self.initializer = Some(initializer);
        self
    }

    pub fn with_getter(mut self, getter: Accessor) -> Self {
        self.getter = Some(getter);
        self
    }

    pub fn with_setter(mut self, setter: Accessor) -> Self {
        self.setter = Some(setter);
        self
    }

    /// Whether the property stores a value at all.
    ///
    /// A property without an initializer whose custom getter never touches
    /// `field` (and whose setter, if any, neither) is computed-only.
    pub fn has_backing_field(&self) -> bool {
        if self.initializer.is_some() {
            return true;
        }
        let getter_uses_field = match &self.getter {
            None => true,
            Some(getter) => getter.references_field(),
        };
        let setter_uses_field = self
            .setter
            .as_ref()
            .is_some_and(|setter| setter.references_field());
        getter_uses_field || setter_uses_field
    }
}

/// Custom `get()` / `set(value)` body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Accessor {
    /// Setter parameter name; `None` for getters
    #[serde(default)]
    pub param: Option<String>,
    pub body: Vec<Stmt>,
}

impl Accessor {
    pub fn getter(body: Vec<Stmt>) -> Self {
        Self { param: None, body }
    }

    pub fn setter(param: impl Into<String>, body: Vec<Stmt>) -> Self {
        Self {
            param: Some(param.into()),
            body,
        }
    }

    pub fn references_field(&self) -> bool {
        self.body.iter().any(Stmt::references_field)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    pub ty: TypeRef,
    #[serde(default)]
    pub hidden: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstructorDecl {
    #[serde(default)]
    pub params: Vec<Param>,
    /// Arguments passed to the superclass constructor, if it delegates
    #[serde(default)]
    pub super_call: Option<Vec<Expr>>,
    #[serde(default)]
    pub body: Vec<Stmt>,
}

impl ConstructorDecl {
    pub fn is_zero_arg(&self) -> bool {
        self.params.is_empty()
    }
}

/// How a generated method takes its receiver
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Receiver {
    #[default]
    Ref,
    Mut,
    /// Associated function
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDecl {
    pub name: String,
    #[serde(default)]
    pub params: Vec<Param>,
    #[serde(default)]
    pub returns: Option<TypeRef>,
    pub body: Vec<Stmt>,
    /// Trait the method implements, when generated for one
    #[serde(default)]
    pub implements: Option<String>,
    #[serde(default)]
    pub receiver: Receiver,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: TypeRef,
}

impl Param {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// A type as written in declarations: `List<Int>?`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeRef {
    pub name: String,
    #[serde(default)]
    pub args: Vec<TypeRef>,
    #[serde(default)]
    pub nullable: bool,
}

impl TypeRef {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            nullable: false,
        }
    }

    pub fn generic(name: impl Into<String>, args: Vec<TypeRef>) -> Self {
        Self {
            name: name.into(),
            args,
            nullable: false,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.args.is_empty() {
            let args: Vec<String> = self.args.iter().map(ToString::to_string).collect();
            write!(f, "<{}>", args.join(", "))?;
        }
        if self.nullable {
            write!(f, "?")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
    Null,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Literal(Literal),
    List(Vec<Expr>),
    This,
    /// Local variable or parameter
    Local(String),
    /// The `field` keyword inside a property accessor
    BackingField,
    /// `<target>.<name>`
    FieldGet { target: Box<Expr>, name: String },
    /// `readable(<chain>, <instance>)`
    Readable { chain: Box<Expr>, instance: Box<Expr> },
    /// `writable(<chain>, <instance>)`
    Writable { chain: Box<Expr>, instance: Box<Expr> },
    /// `<expr> as <ty>`
    Cast { expr: Box<Expr>, ty: TypeRef },
    /// Zero-argument construction of a record type
    NewRecord(TypeRef),
    /// A record chain holding `initial` as its only record
    NewChain(Box<Expr>),
    /// Oldest record of a chain
    FirstRecord(Box<Expr>),
    /// Link `record` into `chain` as its newest entry
    PrependRecord { chain: Box<Expr>, record: Box<Expr> },
}

impl Expr {
    pub fn int(value: i64) -> Self {
        Expr::Literal(Literal::Int(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Expr::Literal(Literal::String(value.into()))
    }

    pub fn local(name: impl Into<String>) -> Self {
        Expr::Local(name.into())
    }

    pub fn field(target: Expr, name: impl Into<String>) -> Self {
        Expr::FieldGet {
            target: Box::new(target),
            name: name.into(),
        }
    }

    pub fn this_field(name: impl Into<String>) -> Self {
        Expr::field(Expr::This, name)
    }

    pub fn references_field(&self) -> bool {
        match self {
            Expr::BackingField => true,
            Expr::Literal(_) | Expr::This | Expr::Local(_) | Expr::NewRecord(_) => false,
            Expr::List(items) => items.iter().any(Expr::references_field),
            Expr::FieldGet { target, .. } => target.references_field(),
            Expr::Readable { chain, instance } | Expr::Writable { chain, instance } => {
                chain.references_field() || instance.references_field()
            }
            Expr::Cast { expr, .. } => expr.references_field(),
            Expr::NewChain(inner) | Expr::FirstRecord(inner) => inner.references_field(),
            Expr::PrependRecord { chain, record } => {
                chain.references_field() || record.references_field()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    Return(Expr),
    /// `<target> = <value>`; `target` is `BackingField`, a local or a field get
    Assign { target: Expr, value: Expr },
    Expr(Expr),
    /// Announce the constructed instance to the frame manager
    NotifyCreated,
}

impl Stmt {
    pub fn references_field(&self) -> bool {
        match self {
            Stmt::Return(expr) | Stmt::Expr(expr) => expr.references_field(),
            Stmt::Assign { target, value } => target.references_field() || value.references_field(),
            Stmt::NotifyCreated => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_property_has_backing_field() {
        let prop = PropertyDecl::new("count", TypeRef::named("Int"), true);
        assert!(prop.has_backing_field());
    }

    #[test]
    fn test_computed_property_has_no_backing_field() {
        let prop = PropertyDecl::new("doubled", TypeRef::named("Int"), true)
            .with_getter(Accessor::getter(vec![Stmt::Return(Expr::int(2))]));
        assert!(!prop.has_backing_field());
    }

    #[test]
    fn test_getter_using_field_keeps_backing_field() {
        let prop = PropertyDecl::new("count", TypeRef::named("Int"), true)
            .with_getter(Accessor::getter(vec![Stmt::Return(Expr::BackingField)]));
        assert!(prop.has_backing_field());
    }

    #[test]
    fn test_type_ref_display() {
        let ty = TypeRef::generic("List", vec![TypeRef::named("Int")]).nullable();
        assert_eq!(ty.to_string(), "List<Int>?");
    }

    #[test]
    fn test_module_json_shape() {
        let json = r#"{"classes":[{"name":"Counter","annotations":["Framed"],
            "properties":[{"name":"count","ty":{"name":"Int"},"mutable":true,
            "initializer":{"Literal":{"Int":0}}}]}]}"#;
        let module: Module = serde_json::from_str(json).unwrap();
        let counter = module.class("Counter").unwrap();
        assert!(counter.has_annotation(FRAMED_ANNOTATION));
        assert_eq!(counter.properties[0].initializer, Some(Expr::int(0)));
        assert!(!counter.is_framed());
    }
}
