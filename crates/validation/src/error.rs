//! Validation error types and handling

use std::collections::BTreeMap;
use std::fmt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type ValidationResult<T> = Result<T, ValidationErrors>;

/// A failed rule for a specific field
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationError {
    /// The field that failed validation
    pub field: String,
    /// Rendered, human-readable message
    pub message: String,
    /// Name of the rule that failed (`required`, `max_length`, ...)
    pub rule: String,
}

impl ValidationError {
    /// Create a new validation error
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            rule: "validation_failed".to_string(),
        }
    }

    /// Create a validation error attributed to a rule
    pub fn for_rule(field: impl Into<String>, message: impl Into<String>, rule: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            rule: rule.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Errors collected by one validation run.
///
/// Only the first failing rule of a field is kept, so there is at most one
/// message per field.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Error)]
pub struct ValidationErrors {
    pub errors: BTreeMap<String, ValidationError>,
}

impl ValidationErrors {
    /// Create a new empty validation errors collection
    pub fn new() -> Self {
        Self {
            errors: BTreeMap::new(),
        }
    }

    /// Record an error; an existing error for the same field wins
    pub fn add(&mut self, error: ValidationError) {
        self.errors.entry(error.field.clone()).or_insert(error);
    }

    /// Record a plain message for a field
    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.add(ValidationError::new(field, message));
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn clear(&mut self) {
        self.errors.clear();
    }

    /// Get the error recorded for a field
    pub fn get(&self, field: &str) -> Option<&ValidationError> {
        self.errors.get(field)
    }

    pub fn has_field_error(&self, field: &str) -> bool {
        self.errors.contains_key(field)
    }

    /// Field → message map, the shape handed back to model callers
    pub fn messages(&self) -> BTreeMap<String, String> {
        self.errors
            .iter()
            .map(|(field, error)| (field.clone(), error.message.clone()))
            .collect()
    }

    /// Merge another collection; fields already present keep their error
    pub fn merge(&mut self, other: ValidationErrors) {
        for (_, error) in other.errors {
            self.add(error);
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errors.is_empty() {
            write!(f, "No validation errors")
        } else {
            write!(f, "Validation failed for {} field(s):", self.errors.len())?;
            for (field, error) in &self.errors {
                write!(f, "\n  {}: {}", field, error.message)?;
            }
            Ok(())
        }
    }
}

impl From<ValidationError> for ValidationErrors {
    fn from(error: ValidationError) -> Self {
        let mut errors = Self::new();
        errors.add(error);
        errors
    }
}

/// Problems with the rule definitions themselves, as opposed to the data
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuleError {
    #[error("\"{0}\" is not a valid rule.")]
    UnknownRule(String),

    #[error("Rule \"{rule}\" has an invalid parameter: {reason}")]
    InvalidParameter { rule: String, reason: String },

    #[error("\"{0}\" is not a validation rule group.")]
    UnknownGroup(String),

    #[error("No validation rules for the placeholder: {0}")]
    PlaceholderWithoutRules(String),

    #[error("The placeholder field cannot use placeholder: {0}")]
    NestedPlaceholder(String),

    #[error("Invalid validation configuration: {0}")]
    Config(String),
}
