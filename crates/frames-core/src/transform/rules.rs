/*!
# Class Rules

Core trait for the steps of the framing pipeline, the unit of work they share
and per-rule statistics.
*/

use crate::ast::{ClassDecl, TypeRef};

use super::{errors::TransformError, TransformationContext};

/// A class on its way through the framing pipeline
#[derive(Debug, Clone)]
pub struct FramedUnit {
    /// The host class being rewritten
    pub host: ClassDecl,
    /// Index the host will have in the output module
    pub host_index: usize,
    /// Companion record type, once synthesized
    pub record: Option<ClassDecl>,
    /// Framed properties in declaration order
    pub framed: Vec<String>,
    pub record_type: TypeRef,
    /// The environment's base record type
    pub base_record: ClassDecl,
}

impl FramedUnit {
    pub fn class_name(&self) -> &str {
        &self.host.name
    }

    pub fn is_framed_property(&self, name: &str) -> bool {
        self.framed.iter().any(|framed| framed == name)
    }
}

/// One step of the framing pipeline
///
/// Rules run in priority order over every framed class. A rule reports
/// whether it changed the unit; an error abandons the whole class.
pub trait ClassRule: Send + Sync {
    /// Human-readable name for this rule
    fn name(&self) -> &'static str;

    /// Detailed description of what this rule does
    fn description(&self) -> &'static str;

    /// Priority for rule ordering (higher priority runs first)
    fn priority(&self) -> u32 {
        100
    }

    /// Check if this rule applies to the unit
    fn matches(&self, unit: &FramedUnit, context: &TransformationContext) -> bool {
        let _ = (unit, context);
        true
    }

    /// Apply the rule, returning whether anything changed
    fn apply(
        &self,
        unit: &mut FramedUnit,
        context: &TransformationContext,
    ) -> Result<bool, TransformError>;

    /// Check the unit is consistent after the rule ran
    fn validate(&self, unit: &FramedUnit, context: &TransformationContext) -> Result<(), TransformError> {
        let _ = (unit, context);
        Ok(())
    }
}

/// Rule execution statistics
#[derive(Debug, Default, Clone)]
pub struct RuleStats {
    pub rule_name: String,
    pub applications: u64,
    pub transformations: u64,
    pub errors: u64,
    pub total_time_us: u64,
}

impl RuleStats {
    pub fn new(rule_name: String) -> Self {
        Self {
            rule_name,
            ..Self::default()
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.applications == 0 {
            0.0
        } else {
            (self.transformations as f64) / (self.applications as f64)
        }
    }

    pub fn average_time_us(&self) -> f64 {
        if self.applications == 0 {
            0.0
        } else {
            (self.total_time_us as f64) / (self.applications as f64)
        }
    }
}
