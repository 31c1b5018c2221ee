use thiserror::Error;

/// Reasons a class cannot be framed; each one is fatal for that class only
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    #[error("{class}.{property} has no backing field; computed-only properties cannot be framed")]
    MissingBackingField { class: String, property: String },

    #[error("{class}: base record type {base} is not known to the class environment")]
    MissingRecordBase { class: String, base: String },

    #[error("{class}: base record type {base} has no zero-argument constructor")]
    MissingBaseConstructor { class: String, base: String },

    #[error("{class}: {name:?} is not a valid identifier")]
    InvalidIdentifier { class: String, name: String },

    #[error("{class}: property name {name:?} is reserved for generated members")]
    ReservedName { class: String, name: String },

    #[error("{class}: rule {rule} left the class inconsistent: {message}")]
    Rule {
        rule: &'static str,
        class: String,
        message: String,
    },
}

impl TransformError {
    /// Class the diagnostic is about
    pub fn class(&self) -> &str {
        match self {
            Self::MissingBackingField { class, .. }
            | Self::MissingRecordBase { class, .. }
            | Self::MissingBaseConstructor { class, .. }
            | Self::InvalidIdentifier { class, .. }
            | Self::ReservedName { class, .. }
            | Self::Rule { class, .. } => class,
        }
    }

    pub fn rule(rule: &'static str, class: &str, message: impl Into<String>) -> Self {
        Self::Rule {
            rule,
            class: class.to_string(),
            message: message.into(),
        }
    }
}
