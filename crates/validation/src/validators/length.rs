//! Length-based validators for strings

use crate::traits::{value_text, RuleContext, ValidationRule};
use async_trait::async_trait;
use serde_json::Value;

/// Which bound a length rule enforces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthKind {
    Min,
    Max,
    Exact,
}

/// Validator for `min_length`, `max_length` and `exact_length`
#[derive(Debug, Clone)]
pub struct LengthValidator {
    pub kind: LengthKind,
    pub length: usize,
}

impl LengthValidator {
    pub fn min(length: usize) -> Self {
        Self { kind: LengthKind::Min, length }
    }

    pub fn max(length: usize) -> Self {
        Self { kind: LengthKind::Max, length }
    }

    pub fn exact(length: usize) -> Self {
        Self { kind: LengthKind::Exact, length }
    }

    /// Character count of the value's text form
    fn get_length(value: &Value) -> usize {
        value_text(value).chars().count() // Unicode-aware length
    }
}

#[async_trait]
impl ValidationRule for LengthValidator {
    async fn passes(&self, value: &Value, _ctx: &RuleContext<'_>) -> bool {
        let length = Self::get_length(value);
        match self.kind {
            LengthKind::Min => length >= self.length,
            LengthKind::Max => length <= self.length,
            LengthKind::Exact => length == self.length,
        }
    }

    fn rule_name(&self) -> &str {
        match self.kind {
            LengthKind::Min => "min_length",
            LengthKind::Max => "max_length",
            LengthKind::Exact => "exact_length",
        }
    }

    fn parameter(&self) -> Option<String> {
        Some(self.length.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::Data;
    use serde_json::json;

    fn ctx(data: &Data) -> RuleContext<'_> {
        RuleContext { field: "name", label: "name", data, db_group: None }
    }

    #[tokio::test]
    async fn test_min_length() {
        let data = Data::new();
        let validator = LengthValidator::min(3);

        assert!(validator.passes(&json!("abc"), &ctx(&data)).await);
        assert!(!validator.passes(&json!("ab"), &ctx(&data)).await);
        assert!(!validator.passes(&json!(""), &ctx(&data)).await);
    }

    #[tokio::test]
    async fn test_max_length_counts_characters() {
        let data = Data::new();
        let validator = LengthValidator::max(3);

        assert!(validator.passes(&json!("héé"), &ctx(&data)).await);
        assert!(!validator.passes(&json!("abcd"), &ctx(&data)).await);
        assert!(validator.passes(&json!(123), &ctx(&data)).await);
    }

    #[tokio::test]
    async fn test_exact_length() {
        let data = Data::new();
        let validator = LengthValidator::exact(2);

        assert!(validator.passes(&json!("ab"), &ctx(&data)).await);
        assert!(!validator.passes(&json!("abc"), &ctx(&data)).await);
        assert_eq!(validator.rule_name(), "exact_length");
        assert_eq!(validator.parameter().as_deref(), Some("2"));
    }
}
