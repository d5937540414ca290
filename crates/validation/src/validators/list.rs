//! Membership validator

use crate::traits::{value_text, RuleContext, ValidationRule};
use async_trait::async_trait;
use serde_json::Value;

/// Validator for `in_list[a,b,c]`
#[derive(Debug, Clone)]
pub struct InListValidator {
    pub allowed: Vec<String>,
}

impl InListValidator {
    /// Parse a comma separated list; surrounding whitespace is ignored
    pub fn parse(param: &str) -> Self {
        Self {
            allowed: param.split(',').map(|item| item.trim().to_string()).collect(),
        }
    }
}

#[async_trait]
impl ValidationRule for InListValidator {
    async fn passes(&self, value: &Value, _ctx: &RuleContext<'_>) -> bool {
        let text = value_text(value);
        self.allowed.iter().any(|item| *item == text)
    }

    fn rule_name(&self) -> &str {
        "in_list"
    }

    fn parameter(&self) -> Option<String> {
        Some(self.allowed.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::Data;
    use serde_json::json;

    #[tokio::test]
    async fn test_in_list() {
        let data = Data::new();
        let ctx = RuleContext { field: "status", label: "status", data: &data, db_group: None };
        let validator = InListValidator::parse("draft, published,1");

        assert!(validator.passes(&json!("draft"), &ctx).await);
        assert!(validator.passes(&json!("published"), &ctx).await);
        assert!(validator.passes(&json!(1), &ctx).await);
        assert!(!validator.passes(&json!("archived"), &ctx).await);
        assert!(!validator.passes(&json!("Draft"), &ctx).await);
    }
}
