//! Required field validator

use crate::traits::{value_text, RuleContext, ValidationRule};
use async_trait::async_trait;
use serde_json::Value;

/// Fails on null, whitespace-only strings, `false` and empty collections
#[derive(Debug, Clone, Default)]
pub struct RequiredValidator;

impl RequiredValidator {
    pub fn new() -> Self {
        Self
    }

    /// Whether a value counts as present for `required`
    pub fn is_present(value: &Value) -> bool {
        match value {
            Value::Array(arr) => !arr.is_empty(),
            Value::Object(obj) => !obj.is_empty(),
            other => !value_text(other).trim().is_empty(),
        }
    }
}

#[async_trait]
impl ValidationRule for RequiredValidator {
    async fn passes(&self, value: &Value, _ctx: &RuleContext<'_>) -> bool {
        Self::is_present(value)
    }

    fn rule_name(&self) -> &str {
        "required"
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
    async fn test_required_rejects_empty_values() {
        let data = Data::new();
        let validator = RequiredValidator::new();

        assert!(!validator.passes(&Value::Null, &ctx(&data)).await);
        assert!(!validator.passes(&json!(""), &ctx(&data)).await);
        assert!(!validator.passes(&json!("   "), &ctx(&data)).await);
        assert!(!validator.passes(&json!([]), &ctx(&data)).await);
        assert!(!validator.passes(&json!(false), &ctx(&data)).await);
    }

    #[tokio::test]
    async fn test_required_accepts_values() {
        let data = Data::new();
        let validator = RequiredValidator::new();

        assert!(validator.passes(&json!("John"), &ctx(&data)).await);
        assert!(validator.passes(&json!(0), &ctx(&data)).await);
        assert!(validator.passes(&json!("0"), &ctx(&data)).await);
        assert!(validator.passes(&json!([1]), &ctx(&data)).await);
    }
}
