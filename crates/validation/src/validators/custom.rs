//! Custom validation functions and closures

use crate::traits::{Data, RuleContext, ValidationRule};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Signature of a custom rule: value, bracketed parameter, full data set
pub type CustomRuleFn = Arc<dyn Fn(&Value, Option<&str>, &Data) -> bool + Send + Sync>;

/// Custom validator that accepts user-defined validation functions.
///
/// Registered once by name, then bound to a parameter each time a rule
/// string references it.
#[derive(Clone)]
pub struct CustomValidator {
    /// Name the rule is referenced by in rule strings
    pub name: String,
    validator: CustomRuleFn,
    /// Message template overriding the generic fallback
    pub message: Option<String>,
    param: Option<String>,
}

impl CustomValidator {
    /// Create a new custom validator
    pub fn new<F>(name: impl Into<String>, validator: F) -> Self
    where
        F: Fn(&Value, Option<&str>, &Data) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            validator: Arc::new(validator),
            message: None,
            param: None,
        }
    }

    /// Set custom error message template
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// A copy bound to the parameter of one rule occurrence
    pub fn with_param(&self, param: Option<String>) -> Self {
        Self {
            param,
            ..self.clone()
        }
    }

    /// Get the validator name
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for CustomValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomValidator")
            .field("name", &self.name)
            .field("message", &self.message)
            .field("param", &self.param)
            .finish()
    }
}

#[async_trait]
impl ValidationRule for CustomValidator {
    async fn passes(&self, value: &Value, ctx: &RuleContext<'_>) -> bool {
        (self.validator)(value, self.param.as_deref(), ctx.data)
    }

    fn rule_name(&self) -> &str {
        &self.name
    }

    fn parameter(&self) -> Option<String> {
        self.param.clone()
    }

    fn message_template(&self) -> &str {
        self.message
            .as_deref()
            .unwrap_or(crate::messages::FALLBACK_TEMPLATE)
    }
}
