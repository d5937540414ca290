//! Numeric format and comparison validators

use crate::traits::{value_number, value_text, RuleContext, ValidationRule};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static NUMERIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[-+]?\d*\.?\d+$").unwrap());
static INTEGER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[-+]?\d+$").unwrap());
static DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").unwrap());

/// Accepted textual number shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberFormat {
    /// Optional sign, optional decimal point
    Numeric,
    /// Optional sign, digits only
    Integer,
    /// Same shape as `Numeric`, reported as a decimal
    Decimal,
    /// Digits only
    Natural,
    /// Digits only, not zero
    NaturalNoZero,
}

/// Validator for number-shaped input
#[derive(Debug, Clone)]
pub struct NumericValidator {
    pub format: NumberFormat,
}

impl NumericValidator {
    pub fn new(format: NumberFormat) -> Self {
        Self { format }
    }
}

#[async_trait]
impl ValidationRule for NumericValidator {
    async fn passes(&self, value: &Value, _ctx: &RuleContext<'_>) -> bool {
        let text = value_text(value);
        match self.format {
            NumberFormat::Numeric | NumberFormat::Decimal => NUMERIC.is_match(&text),
            NumberFormat::Integer => INTEGER.is_match(&text),
            NumberFormat::Natural => DIGITS.is_match(&text),
            NumberFormat::NaturalNoZero => {
                DIGITS.is_match(&text) && text.trim_start_matches('0').len() > 0
            }
        }
    }

    fn rule_name(&self) -> &str {
        match self.format {
            NumberFormat::Numeric => "numeric",
            NumberFormat::Integer => "integer",
            NumberFormat::Decimal => "decimal",
            NumberFormat::Natural => "is_natural",
            NumberFormat::NaturalNoZero => "is_natural_no_zero",
        }
    }
}

/// Comparison operator of a bound rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
}

/// Validator comparing a numeric value against a fixed bound
#[derive(Debug, Clone)]
pub struct ComparisonValidator {
    pub comparison: Comparison,
    pub bound: f64,
    raw_bound: String,
}

impl ComparisonValidator {
    pub fn new(comparison: Comparison, bound: f64) -> Self {
        Self {
            comparison,
            bound,
            raw_bound: bound.to_string(),
        }
    }

    /// Parse the bracketed parameter; non-numeric bounds are rejected
    pub fn parse(comparison: Comparison, param: &str) -> Option<Self> {
        let bound = param.trim().parse::<f64>().ok()?;
        Some(Self {
            comparison,
            bound,
            raw_bound: param.trim().to_string(),
        })
    }
}

#[async_trait]
impl ValidationRule for ComparisonValidator {
    async fn passes(&self, value: &Value, _ctx: &RuleContext<'_>) -> bool {
        let Some(number) = value_number(value) else {
            return false;
        };
        match self.comparison {
            Comparison::GreaterThan => number > self.bound,
            Comparison::GreaterThanOrEqual => number >= self.bound,
            Comparison::LessThan => number < self.bound,
            Comparison::LessThanOrEqual => number <= self.bound,
        }
    }

    fn rule_name(&self) -> &str {
        match self.comparison {
            Comparison::GreaterThan => "greater_than",
            Comparison::GreaterThanOrEqual => "greater_than_equal_to",
            Comparison::LessThan => "less_than",
            Comparison::LessThanOrEqual => "less_than_equal_to",
        }
    }

    fn parameter(&self) -> Option<String> {
        Some(self.raw_bound.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::Data;
    use serde_json::json;

    fn ctx(data: &Data) -> RuleContext<'_> {
        RuleContext { field: "amount", label: "amount", data, db_group: None }
    }

    #[tokio::test]
    async fn test_numeric_formats() {
        let data = Data::new();
        let numeric = NumericValidator::new(NumberFormat::Numeric);
        let integer = NumericValidator::new(NumberFormat::Integer);

        assert!(numeric.passes(&json!("-12.5"), &ctx(&data)).await);
        assert!(numeric.passes(&json!(".5"), &ctx(&data)).await);
        assert!(!numeric.passes(&json!("12a"), &ctx(&data)).await);
        assert!(!numeric.passes(&json!(""), &ctx(&data)).await);

        assert!(integer.passes(&json!("+42"), &ctx(&data)).await);
        assert!(integer.passes(&json!(42), &ctx(&data)).await);
        assert!(!integer.passes(&json!("4.2"), &ctx(&data)).await);
    }

    #[tokio::test]
    async fn test_natural_numbers() {
        let data = Data::new();
        let natural = NumericValidator::new(NumberFormat::Natural);
        let no_zero = NumericValidator::new(NumberFormat::NaturalNoZero);

        assert!(natural.passes(&json!("0"), &ctx(&data)).await);
        assert!(!natural.passes(&json!("-1"), &ctx(&data)).await);
        assert!(!no_zero.passes(&json!("0"), &ctx(&data)).await);
        assert!(!no_zero.passes(&json!("000"), &ctx(&data)).await);
        assert!(no_zero.passes(&json!("7"), &ctx(&data)).await);
    }

    #[tokio::test]
    async fn test_comparisons() {
        let data = Data::new();
        let greater = ComparisonValidator::parse(Comparison::GreaterThan, "10").unwrap();
        let at_most = ComparisonValidator::parse(Comparison::LessThanOrEqual, "10").unwrap();

        assert!(greater.passes(&json!(11), &ctx(&data)).await);
        assert!(!greater.passes(&json!("10"), &ctx(&data)).await);
        assert!(!greater.passes(&json!("abc"), &ctx(&data)).await);
        assert!(at_most.passes(&json!("10"), &ctx(&data)).await);
        assert_eq!(greater.parameter().as_deref(), Some("10"));
    }

    #[test]
    fn test_non_numeric_bound_rejected() {
        assert!(ComparisonValidator::parse(Comparison::LessThan, "ten").is_none());
    }
}
