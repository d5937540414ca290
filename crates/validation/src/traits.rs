//! Core validation traits

use crate::messages::{default_template, FALLBACK_TEMPLATE};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

/// The data being validated: field name → value
pub type Data = HashMap<String, Value>;

/// Everything a rule may look at besides the value under test
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    /// Field being validated
    pub field: &'a str,
    /// Human label of the field (defaults to the field name)
    pub label: &'a str,
    /// The complete data set, for cross-field rules
    pub data: &'a Data,
    /// Connection group the caller validates against, if any
    pub db_group: Option<&'a str>,
}

/// Core validation trait that all validators implement
#[async_trait]
pub trait ValidationRule: Send + Sync {
    /// Whether `value` satisfies the rule
    async fn passes(&self, value: &Value, ctx: &RuleContext<'_>) -> bool;

    /// Rule name as written in rule strings
    fn rule_name(&self) -> &str;

    /// The bracketed parameter, if the rule takes one
    fn parameter(&self) -> Option<String> {
        None
    }

    /// Default message template; `{field}`, `{param}` and `{value}` are filled in
    fn message_template(&self) -> &str {
        default_template(self.rule_name()).unwrap_or(FALLBACK_TEMPLATE)
    }
}

/// String form of a value as rules see it
pub fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => String::new(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// Whether a value counts as "not provided"
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(arr) => arr.is_empty(),
        Value::Object(obj) => obj.is_empty(),
        _ => false,
    }
}

/// Numeric reading of a value: numbers as-is, numeric strings parsed
pub fn value_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_text() {
        assert_eq!(value_text(&json!("abc")), "abc");
        assert_eq!(value_text(&json!(42)), "42");
        assert_eq!(value_text(&json!(true)), "1");
        assert_eq!(value_text(&Value::Null), "");
    }

    #[test]
    fn test_is_blank() {
        assert!(is_blank(&Value::Null));
        assert!(is_blank(&json!("   ")));
        assert!(is_blank(&json!([])));
        assert!(!is_blank(&json!(0)));
        assert!(!is_blank(&json!(false)));
    }

    #[test]
    fn test_value_number() {
        assert_eq!(value_number(&json!("15.5")), Some(15.5));
        assert_eq!(value_number(&json!(3)), Some(3.0));
        assert_eq!(value_number(&json!("abc")), None);
        assert_eq!(value_number(&json!(null)), None);
    }
}
