//! Pattern-based validators using regular expressions

use crate::error::RuleError;
use crate::traits::{value_text, RuleContext, ValidationRule};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static ALPHA: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z]+$").unwrap());
static ALPHA_NUMERIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9]+$").unwrap());
static ALPHA_NUMERIC_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9 ]+$").unwrap());
static ALPHA_DASH: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap());

/// Validator for `regex_match[/pattern/flags]`
#[derive(Debug, Clone)]
pub struct PatternValidator {
    pattern: Regex,
    source: String,
}

impl PatternValidator {
    /// Create a validator from a bare regular expression
    pub fn new(pattern: &str) -> Result<Self, RuleError> {
        let regex = Regex::new(pattern).map_err(|e| invalid(e.to_string()))?;
        Ok(Self {
            pattern: regex,
            source: pattern.to_string(),
        })
    }

    /// Parse a delimited pattern such as `/^[a-z]+$/i`.
    ///
    /// The first character is the delimiter; trailing `i`, `m`, `s`, `x`
    /// and `u` flags are honored. Undelimited input is used as-is.
    pub fn parse(param: &str) -> Result<Self, RuleError> {
        let mut chars = param.chars();
        let delimiter = match chars.next() {
            Some(c) if !c.is_alphanumeric() && c != '\\' && !c.is_whitespace() => c,
            _ => return Self::new(param),
        };

        let body = &param[delimiter.len_utf8()..];
        let end = body
            .rfind(delimiter)
            .ok_or_else(|| invalid(format!("missing closing delimiter in {}", param)))?;
        let (pattern, flags) = (&body[..end], &body[end + delimiter.len_utf8()..]);

        let mut inline = String::new();
        for flag in flags.chars() {
            match flag {
                'i' | 'm' | 's' | 'x' => inline.push(flag),
                'u' => {}
                other => return Err(invalid(format!("unsupported flag '{}'", other))),
            }
        }

        let full = if inline.is_empty() {
            pattern.to_string()
        } else {
            format!("(?{}){}", inline, pattern)
        };
        let regex = Regex::new(&full).map_err(|e| invalid(e.to_string()))?;
        Ok(Self {
            pattern: regex,
            source: param.to_string(),
        })
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }
}

fn invalid(reason: String) -> RuleError {
    RuleError::InvalidParameter {
        rule: "regex_match".to_string(),
        reason,
    }
}

#[async_trait]
impl ValidationRule for PatternValidator {
    async fn passes(&self, value: &Value, _ctx: &RuleContext<'_>) -> bool {
        self.pattern.is_match(&value_text(value))
    }

    fn rule_name(&self) -> &str {
        "regex_match"
    }

    fn parameter(&self) -> Option<String> {
        Some(self.source.clone())
    }
}

/// The ASCII character classes of the `alpha*` rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharacterClass {
    Alpha,
    AlphaNumeric,
    AlphaNumericSpace,
    AlphaDash,
}

/// Validator requiring a non-empty value made of one character class
#[derive(Debug, Clone)]
pub struct CharacterClassValidator {
    pub class: CharacterClass,
}

impl CharacterClassValidator {
    pub fn new(class: CharacterClass) -> Self {
        Self { class }
    }
}

#[async_trait]
impl ValidationRule for CharacterClassValidator {
    async fn passes(&self, value: &Value, _ctx: &RuleContext<'_>) -> bool {
        let text = value_text(value);
        let pattern: &Regex = match self.class {
            CharacterClass::Alpha => &ALPHA,
            CharacterClass::AlphaNumeric => &ALPHA_NUMERIC,
            CharacterClass::AlphaNumericSpace => &ALPHA_NUMERIC_SPACE,
            CharacterClass::AlphaDash => &ALPHA_DASH,
        };
        pattern.is_match(&text)
    }

    fn rule_name(&self) -> &str {
        match self.class {
            CharacterClass::Alpha => "alpha",
            CharacterClass::AlphaNumeric => "alpha_numeric",
            CharacterClass::AlphaNumericSpace => "alpha_numeric_space",
            CharacterClass::AlphaDash => "alpha_dash",
        }
    }
}
