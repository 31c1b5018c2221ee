/*!
# ClassTransformer - Framing Engine

Runs the framing rules over every framed class of a module. A class that
fails keeps its original declaration and contributes a diagnostic; the other
classes are still transformed.
*/

use std::{sync::OnceLock, time::Instant};

use indexmap::IndexMap;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::ast::{
    ClassDecl, Module, TypeRef, FIRST_FRAME_RECORD, PREPEND_FRAME_RECORD, RECORD_FIELD,
};

use super::{
    environment::ClassEnvironment,
    errors::TransformError,
    facts::{ClassFacts, FramingFacts},
    framing_rules::framing_rules,
    rules::{ClassRule, FramedUnit, RuleStats},
    TransformationContext,
};

/// Names generated code claims for itself
const RESERVED: &[&str] = &[
    RECORD_FIELD,
    FIRST_FRAME_RECORD,
    PREPEND_FRAME_RECORD,
    "frame_record",
    "new",
    "new_in",
];

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern compiles"))
}

/// A framed class and its synthesized record type
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransformedClass {
    pub host: ClassDecl,
    pub record: ClassDecl,
    /// Framed properties in declaration order
    pub framed: Vec<String>,
}

/// Result of transforming a module
#[derive(Debug, Clone)]
pub struct TransformOutcome {
    /// Every class, each framed host followed by its record type
    pub module: Module,
    pub transformed: Vec<TransformedClass>,
    pub summary: TransformationSummary,
}

/// Summary of transformation results
#[derive(Debug, Default, Clone)]
pub struct TransformationSummary {
    pub classes_seen: u64,
    pub classes_transformed: u64,
    pub classes_skipped: u64,
    pub properties_framed: u64,
    pub errors: Vec<TransformError>,
}

impl TransformationSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merge(&mut self, other: TransformationSummary) {
        self.classes_seen += other.classes_seen;
        self.classes_transformed += other.classes_transformed;
        self.classes_skipped += other.classes_skipped;
        self.properties_framed += other.properties_framed;
        self.errors.extend(other.errors);
    }

    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Framing engine with rule management
pub struct ClassTransformer {
    rules: Vec<Box<dyn ClassRule>>,
    stats: IndexMap<String, RuleStats>,
    environment: ClassEnvironment,
    context: TransformationContext,
}

impl ClassTransformer {
    /// A transformer without rules
    pub fn new(environment: ClassEnvironment) -> Self {
        Self {
            rules: Vec::new(),
            stats: IndexMap::new(),
            environment,
            context: TransformationContext::new(),
        }
    }

    /// The standard framing pipeline over `environment`
    pub fn with_framing_rules(environment: ClassEnvironment) -> Self {
        let mut transformer = Self::new(environment);
        for rule in framing_rules() {
            transformer.add_rule(rule);
        }
        transformer.sort_rules_by_priority();
        transformer
    }

    /// The standard pipeline over the runtime environment
    pub fn framing() -> Self {
        Self::with_framing_rules(ClassEnvironment::with_runtime())
    }

    pub fn with_context(mut self, context: TransformationContext) -> Self {
        self.context = context;
        self
    }

    pub fn context(&self) -> &TransformationContext {
        &self.context
    }

    /// Add a transformation rule
    pub fn add_rule(&mut self, rule: Box<dyn ClassRule>) {
        let rule_name = rule.name().to_string();
        self.stats.insert(rule_name.clone(), RuleStats::new(rule_name));
        self.rules.push(rule);
    }

    /// Sort rules by priority (higher priority first)
    pub fn sort_rules_by_priority(&mut self) {
        self.rules.sort_by_key(|rule| std::cmp::Reverse(rule.priority()));
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|rule| rule.name()).collect()
    }

    /// Transform using the default `@Framed` analysis
    pub fn transform_module(&mut self, module: Module) -> TransformOutcome {
        let facts = FramingFacts::analyze(&module);
        self.transform_module_with(module, &facts)
    }

    /// Transform using externally supplied facts
    pub fn transform_module_with(&mut self, module: Module, facts: &FramingFacts) -> TransformOutcome {
        let mut summary = TransformationSummary::new();
        let mut output = Vec::with_capacity(module.classes.len());
        let mut transformed = Vec::new();

        for class in &module.classes {
            summary.classes_seen += 1;
            let context = self.context.clone().with_class_name(class.name.clone());
            let class_facts = facts.get(&class.name).cloned().unwrap_or_default();
            let host_index = output.len();

            match self.transform_class(class, &class_facts, host_index, &module, &context) {
                Ok(Some(result)) => {
                    summary.classes_transformed += 1;
                    summary.properties_framed += result.framed.len() as u64;
                    output.push(result.host.clone());
                    output.push(result.record.clone());
                    transformed.push(result);
                }
                Ok(None) => {
                    summary.classes_skipped += 1;
                    output.push(class.clone());
                }
                Err(error) => {
                    warn!(%error, "class left untransformed");
                    summary.errors.push(error);
                    output.push(class.clone());
                }
            }
        }

        info!(
            seen = summary.classes_seen,
            transformed = summary.classes_transformed,
            errors = summary.errors.len(),
            "module transformed"
        );
        TransformOutcome {
            module: Module::new(output),
            transformed,
            summary,
        }
    }

    /// Transform one class; `Ok(None)` when there is nothing to frame
    pub fn transform_class(
        &mut self,
        class: &ClassDecl,
        facts: &ClassFacts,
        host_index: usize,
        module: &Module,
        context: &TransformationContext,
    ) -> Result<Option<TransformedClass>, TransformError> {
        if class.is_framed() {
            debug!(class = %class.name, "already framed, leaving as is");
            return Ok(None);
        }
        if !facts.framed {
            return Ok(None);
        }

        let framed = self.select_properties(class, facts)?;
        if framed.is_empty() {
            debug!(class = %class.name, "no framed properties, nothing to indirect");
            return Ok(None);
        }
        check_name(&class.name, &class.name)?;

        let base_record = self
            .environment
            .resolve(&context.record_base, module)
            .cloned()
            .ok_or_else(|| TransformError::MissingRecordBase {
                class: class.name.clone(),
                base: context.record_base.clone(),
            })?;

        let mut unit = FramedUnit {
            host: class.clone(),
            host_index,
            record: None,
            framed,
            record_type: TypeRef::named(context.record_type_name(&class.name)),
            base_record,
        };
        self.run_rules(&mut unit, context)?;

        let record = unit.record.ok_or_else(|| {
            TransformError::rule("ClassTransformer", &class.name, "pipeline produced no record type")
        })?;
        debug!(class = %class.name, record = %record.name, framed = ?unit.framed, "class framed");
        Ok(Some(TransformedClass {
            host: unit.host,
            record,
            framed: unit.framed,
        }))
    }

    fn select_properties(&self, class: &ClassDecl, facts: &ClassFacts) -> Result<Vec<String>, TransformError> {
        let mut framed: Vec<String> = Vec::with_capacity(facts.properties.len());
        for name in &facts.properties {
            check_name(&class.name, name)?;
            let Some(property) = class.property(name) else {
                warn!(class = %class.name, property = %name, "framed property not declared here, skipping");
                continue;
            };
            if !property.has_backing_field() {
                return Err(TransformError::MissingBackingField {
                    class: class.name.clone(),
                    property: name.clone(),
                });
            }
            if !framed.contains(name) {
                framed.push(name.clone());
            }
        }
        Ok(framed)
    }

    fn run_rules(&mut self, unit: &mut FramedUnit, context: &TransformationContext) -> Result<(), TransformError> {
        for rule in &self.rules {
            let stats = self
                .stats
                .entry(rule.name().to_string())
                .or_insert_with(|| RuleStats::new(rule.name().to_string()));
            if !rule.matches(unit, context) {
                continue;
            }

            let start_time = Instant::now();
            stats.applications += 1;
            let result = rule
                .apply(unit, context)
                .and_then(|changed| rule.validate(unit, context).map(|()| changed));
            stats.total_time_us += start_time.elapsed().as_micros() as u64;

            match result {
                Ok(true) => stats.transformations += 1,
                Ok(false) => {}
                Err(error) => {
                    stats.errors += 1;
                    return Err(error);
                }
            }
        }
        Ok(())
    }

    /// Get transformation statistics
    pub fn stats(&self) -> &IndexMap<String, RuleStats> {
        &self.stats
    }

    /// Clear statistics
    pub fn clear_stats(&mut self) {
        for stats in self.stats.values_mut() {
            *stats = RuleStats::new(stats.rule_name.clone());
        }
    }
}

impl Default for ClassTransformer {
    fn default() -> Self {
        Self::framing()
    }
}

fn check_name(class: &str, name: &str) -> Result<(), TransformError> {
    if RESERVED.contains(&name) {
        return Err(TransformError::ReservedName {
            class: class.to_string(),
            name: name.to_string(),
        });
    }
    if !identifier_pattern().is_match(name) {
        return Err(TransformError::InvalidIdentifier {
            class: class.to_string(),
            name: name.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Accessor, Expr, PropertyDecl, Stmt, FRAMED_ANNOTATION, FRAMED_MARKER};

    fn counter() -> ClassDecl {
        let mut class = ClassDecl::new("Counter");
        class.annotations.push(FRAMED_ANNOTATION.into());
        class.properties.push(
            PropertyDecl::new("count", TypeRef::named("Int"), true).with_initializer(Expr::int(0)),
        );
        class.properties.push(
            PropertyDecl::new("label", TypeRef::named("String"), false)
                .with_initializer(Expr::string("clicks")),
        );
        class
    }

    #[test]
    fn test_rules_sorted_by_priority() {
        let transformer = ClassTransformer::framing();
        assert_eq!(
            transformer.rule_names(),
            vec![
                "SynthesizeRecordType",
                "InstallRecordField",
                "InstallChainOperations",
                "RewriteInitializers",
                "RewriteAccessors",
                "AddFramedMarker",
            ]
        );
    }

    #[test]
    fn test_record_follows_host() {
        let mut transformer = ClassTransformer::framing();
        let outcome = transformer.transform_module(Module::new(vec![counter()]));

        assert!(outcome.summary.success());
        let names: Vec<&str> = outcome.module.classes.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Counter", "CounterRecord"]);
        let host = &outcome.module.classes[0];
        assert!(host.has_supertype(FRAMED_MARKER));
        assert!(host.field(RECORD_FIELD).unwrap().hidden);
        // val properties keep their storage
        assert!(host.property("label").unwrap().initializer.is_some());
        assert_eq!(transformer.stats()["AddFramedMarker"].transformations, 1);
    }

    #[test]
    fn test_transform_is_idempotent() {
        let mut transformer = ClassTransformer::framing();
        let once = transformer.transform_module(Module::new(vec![counter()]));
        let twice = transformer.transform_module(once.module.clone());
        assert_eq!(once.module, twice.module);
        assert_eq!(twice.summary.classes_transformed, 0);
    }

    #[test]
    fn test_computed_property_fails_class_only() {
        let mut broken = counter();
        broken.name = "Broken".into();
        broken.properties.push(
            PropertyDecl::new("doubled", TypeRef::named("Int"), true)
                .with_getter(Accessor::getter(vec![Stmt::Return(Expr::int(2))])),
        );

        let outcome = ClassTransformer::framing().transform_module(Module::new(vec![broken.clone(), counter()]));
        assert_eq!(
            outcome.summary.errors,
            vec![TransformError::MissingBackingField {
                class: "Broken".into(),
                property: "doubled".into(),
            }]
        );
        assert_eq!(outcome.module.classes[0], broken);
        assert_eq!(outcome.summary.classes_transformed, 1);
    }

    #[test]
    fn test_reserved_property_name() {
        let mut facts = FramingFacts::new();
        facts.insert("Counter", ClassFacts::framed(["new"]));
        let mut class = counter();
        class.properties.push(PropertyDecl::new("new", TypeRef::named("Int"), true));

        let outcome = ClassTransformer::framing().transform_module_with(Module::new(vec![class]), &facts);
        assert!(matches!(
            outcome.summary.errors.as_slice(),
            [TransformError::ReservedName { name, .. }] if name == "new"
        ));
    }

    #[test]
    fn test_missing_record_base() {
        let mut transformer = ClassTransformer::with_framing_rules(ClassEnvironment::new());
        let outcome = transformer.transform_module(Module::new(vec![counter()]));
        assert!(matches!(
            outcome.summary.errors.as_slice(),
            [TransformError::MissingRecordBase { .. }]
        ));
    }

    #[test]
    fn test_zero_framed_properties_left_untouched() {
        let mut class = counter();
        class.properties.retain(|p| !p.mutable);
        let outcome = ClassTransformer::framing().transform_module(Module::new(vec![class.clone()]));
        assert_eq!(outcome.module.classes, vec![class]);
        assert_eq!(outcome.summary.classes_skipped, 1);
    }
}
