//! Cross-field validators

use crate::traits::{RuleContext, ValidationRule};
use async_trait::async_trait;
use serde_json::Value;

/// Validator for `matches[other]` and `differs[other]`
#[derive(Debug, Clone)]
pub struct FieldComparisonValidator {
    pub other: String,
    /// `true` for `matches`, `false` for `differs`
    pub must_match: bool,
}

impl FieldComparisonValidator {
    pub fn matches(other: impl Into<String>) -> Self {
        Self {
            other: other.into(),
            must_match: true,
        }
    }

    pub fn differs(other: impl Into<String>) -> Self {
        Self {
            other: other.into(),
            must_match: false,
        }
    }
}

#[async_trait]
impl ValidationRule for FieldComparisonValidator {
    async fn passes(&self, value: &Value, ctx: &RuleContext<'_>) -> bool {
        match ctx.data.get(&self.other) {
            Some(other) if self.must_match => other == value,
            Some(other) => other != value,
            // A missing field never matches and always differs
            None => !self.must_match,
        }
    }

    fn rule_name(&self) -> &str {
        if self.must_match {
            "matches"
        } else {
            "differs"
        }
    }

    fn parameter(&self) -> Option<String> {
        Some(self.other.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::Data;
    use serde_json::json;

    fn data() -> Data {
        let mut data = Data::new();
        data.insert("password".into(), json!("secret"));
        data
    }

    #[tokio::test]
    async fn test_matches() {
        let data = data();
        let ctx = RuleContext { field: "confirm", label: "confirm", data: &data, db_group: None };
        let validator = FieldComparisonValidator::matches("password");

        assert!(validator.passes(&json!("secret"), &ctx).await);
        assert!(!validator.passes(&json!("other"), &ctx).await);
        assert!(!FieldComparisonValidator::matches("missing").passes(&json!("x"), &ctx).await);
    }

    #[tokio::test]
    async fn test_differs() {
        let data = data();
        let ctx = RuleContext { field: "new", label: "new", data: &data, db_group: None };
        let validator = FieldComparisonValidator::differs("password");

        assert!(validator.passes(&json!("fresh"), &ctx).await);
        assert!(!validator.passes(&json!("secret"), &ctx).await);
        assert!(FieldComparisonValidator::differs("missing").passes(&json!("x"), &ctx).await);
    }
}
