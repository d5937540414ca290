//! Email format validator

use crate::traits::{value_text, RuleContext, ValidationRule};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

// ASCII-only with TLD requirement (no consecutive dots at the edges)
static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9]([a-zA-Z0-9._%+-]*[a-zA-Z0-9])?@[a-zA-Z0-9]([a-zA-Z0-9.-]*[a-zA-Z0-9])?\.[a-zA-Z]{2,}$",
    )
    .unwrap()
});

/// Validator for `valid_email`
#[derive(Debug, Clone, Default)]
pub struct EmailValidator;

impl EmailValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate email format
    pub fn is_valid(email: &str) -> bool {
        let Some((local_part, domain_part)) = email.split_once('@') else {
            return false;
        };

        // RFC 5321 limits
        if local_part.is_empty() || local_part.len() > 64 {
            return false;
        }
        if domain_part.is_empty() || domain_part.len() > 255 || domain_part.contains('@') {
            return false;
        }
        if email.contains("..") {
            return false;
        }

        EMAIL.is_match(email)
    }
}

#[async_trait]
impl ValidationRule for EmailValidator {
    async fn passes(&self, value: &Value, _ctx: &RuleContext<'_>) -> bool {
        Self::is_valid(value_text(value).trim())
    }

    fn rule_name(&self) -> &str {
        "valid_email"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_emails() {
        assert!(EmailValidator::is_valid("user@example.com"));
        assert!(EmailValidator::is_valid("first.last+tag@sub.example.org"));
    }

    #[test]
    fn test_invalid_emails() {
        assert!(!EmailValidator::is_valid(""));
        assert!(!EmailValidator::is_valid("user"));
        assert!(!EmailValidator::is_valid("user@"));
        assert!(!EmailValidator::is_valid("@example.com"));
        assert!(!EmailValidator::is_valid("a@b@example.com"));
        assert!(!EmailValidator::is_valid("user..name@example.com"));
        assert!(!EmailValidator::is_valid("user@localhost"));
    }
}
