/*!
# Framing facts

Which classes are framed and which of their properties move into a record.
The transformer consumes these as given; [`FramingFacts::analyze`] is the
default analysis over `@Framed` annotations.
*/

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::ast::{ClassDecl, Module, FRAMED_ANNOTATION};

/// Facts for one class
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassFacts {
    pub framed: bool,
    /// Framed properties in declaration order
    pub properties: Vec<String>,
}

impl ClassFacts {
    pub fn framed(properties: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            framed: true,
            properties: properties.into_iter().map(Into::into).collect(),
        }
    }

    pub fn not_framed() -> Self {
        Self::default()
    }
}

/// Facts for every class of a module, keyed by class name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FramingFacts {
    classes: IndexMap<String, ClassFacts>,
}

impl FramingFacts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `@Framed` classes framed and select their `var` properties,
    /// leaving out any property a framed ancestor already owns
    pub fn analyze(module: &Module) -> Self {
        let mut facts = Self::new();
        for class in &module.classes {
            if !class.has_annotation(FRAMED_ANNOTATION) || class.is_framed() {
                facts.insert(&class.name, ClassFacts::not_framed());
                continue;
            }

            let inherited = framed_ancestor_properties(class, module);
            let mut properties = Vec::new();
            for property in class.properties.iter().filter(|p| p.mutable) {
                if inherited.contains(property.name.as_str()) {
                    warn!(
                        class = %class.name,
                        property = %property.name,
                        "property already owned by a framed ancestor, not framing it again"
                    );
                    continue;
                }
                properties.push(property.name.clone());
            }
            facts.insert(&class.name, ClassFacts::framed(properties));
        }
        facts
    }

    pub fn insert(&mut self, class: impl Into<String>, facts: ClassFacts) {
        self.classes.insert(class.into(), facts);
    }

    pub fn get(&self, class: &str) -> Option<&ClassFacts> {
        self.classes.get(class)
    }

    pub fn is_framed(&self, class: &str) -> bool {
        self.classes.get(class).is_some_and(|facts| facts.framed)
    }

    pub fn properties(&self, class: &str) -> &[String] {
        self.classes
            .get(class)
            .map(|facts| facts.properties.as_slice())
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ClassFacts)> {
        self.classes.iter()
    }
}

/// Ancestors of `class` declared in `module`, nearest first
pub fn ancestors<'m>(class: &ClassDecl, module: &'m Module) -> Vec<&'m ClassDecl> {
    let mut chain = Vec::new();
    let mut seen = HashSet::from([class.name.as_str()]);
    let mut next = class.superclass().map(|ty| ty.name.as_str());

    while let Some(name) = next {
        if !seen.insert(name) {
            warn!(class = %class.name, ancestor = name, "inheritance cycle");
            break;
        }
        let Some(ancestor) = module.class(name) else {
            break;
        };
        chain.push(ancestor);
        next = ancestor.superclass().map(|ty| ty.name.as_str());
    }
    chain
}

fn framed_ancestor_properties<'m>(class: &ClassDecl, module: &'m Module) -> HashSet<&'m str> {
    ancestors(class, module)
        .into_iter()
        .filter(|ancestor| ancestor.has_annotation(FRAMED_ANNOTATION) || ancestor.is_framed())
        .flat_map(|ancestor| ancestor.properties.iter())
        .filter(|property| property.mutable)
        .map(|property| property.name.as_str())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{PropertyDecl, TypeRef};

    fn class(name: &str, framed: bool, props: &[(&str, bool)]) -> ClassDecl {
        let mut class = ClassDecl::new(name);
        if framed {
            class.annotations.push(FRAMED_ANNOTATION.to_string());
        }
        class.properties = props
            .iter()
            .map(|(name, mutable)| PropertyDecl::new(*name, TypeRef::named("Int"), *mutable))
            .collect();
        class
    }

    #[test]
    fn test_analyze_selects_vars_in_order() {
        let module = Module::new(vec![class(
            "Counter",
            true,
            &[("count", true), ("label", false), ("total", true)],
        )]);
        let facts = FramingFacts::analyze(&module);
        assert!(facts.is_framed("Counter"));
        assert_eq!(facts.properties("Counter"), ["count", "total"]);
    }

    #[test]
    fn test_unannotated_class_not_framed() {
        let module = Module::new(vec![class("Plain", false, &[("count", true)])]);
        let facts = FramingFacts::analyze(&module);
        assert!(!facts.is_framed("Plain"));
        assert!(facts.properties("Plain").is_empty());
    }

    #[test]
    fn test_ancestor_owned_property_skipped() {
        let base = class("Base", true, &[("count", true)]);
        let mut derived = class("Derived", true, &[("count", true), ("extra", true)]);
        derived.supertypes.push(TypeRef::named("Base"));

        let facts = FramingFacts::analyze(&Module::new(vec![base, derived]));
        assert_eq!(facts.properties("Derived"), ["extra"]);
    }

    #[test]
    fn test_ancestors_stop_at_cycle() {
        let mut a = class("A", false, &[]);
        a.supertypes.push(TypeRef::named("B"));
        let mut b = class("B", false, &[]);
        b.supertypes.push(TypeRef::named("A"));
        let module = Module::new(vec![a.clone(), b]);
        let found: Vec<&str> = ancestors(&a, &module).iter().map(|c| c.name.as_str()).collect();
        assert_eq!(found, ["B"]);
    }
}
