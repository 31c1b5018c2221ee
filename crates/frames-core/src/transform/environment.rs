use indexmap::IndexMap;

use crate::ast::{ClassDecl, ConstructorDecl, Module};

/// Name of the runtime's base record type
pub const STATE_RECORD: &str = "StateRecord";

/// Classes the transformer can see besides the module being transformed
#[derive(Debug, Clone, Default)]
pub struct ClassEnvironment {
    classes: IndexMap<String, ClassDecl>,
}

impl ClassEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Environment knowing the runtime's `StateRecord`
    pub fn with_runtime() -> Self {
        let mut environment = Self::new();
        let mut state_record = ClassDecl::new(STATE_RECORD);
        state_record.constructors.push(ConstructorDecl::default());
        environment.register(state_record);
        environment
    }

    pub fn register(&mut self, class: ClassDecl) {
        self.classes.insert(class.name.clone(), class);
    }

    pub fn lookup(&self, name: &str) -> Option<&ClassDecl> {
        self.classes.get(name)
    }

    /// Look a class up in `module` first, then in the environment
    pub fn resolve<'a>(&'a self, name: &str, module: &'a Module) -> Option<&'a ClassDecl> {
        module.class(name).or_else(|| self.lookup(name))
    }

    /// Whether `class` can be constructed without arguments.
    ///
    /// A class declaring no constructor at all gets an implicit one.
    pub fn has_zero_arg_constructor(class: &ClassDecl) -> bool {
        class.constructors.is_empty() || class.constructors.iter().any(ConstructorDecl::is_zero_arg)
    }
}
