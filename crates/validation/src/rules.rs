//! Rule definitions: parsing rule strings and compiling them to validators

use crate::error::RuleError;
use crate::validators::*;
use crate::traits::ValidationRule;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{(.+?)\}").unwrap());

/// Rules of one field: a bare rule string or a structured definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldRules {
    Rules(String),
    Detailed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
        rules: String,
        /// Per-rule message overrides
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        errors: BTreeMap<String, String>,
    },
}

impl FieldRules {
    pub fn rules(&self) -> &str {
        match self {
            FieldRules::Rules(rules) => rules,
            FieldRules::Detailed { rules, .. } => rules,
        }
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            FieldRules::Rules(_) => None,
            FieldRules::Detailed { label, .. } => label.as_deref(),
        }
    }

    /// Message overrides declared inline with the rules
    pub fn errors(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            FieldRules::Rules(_) => None,
            FieldRules::Detailed { errors, .. } => Some(errors),
        }
    }

    /// Same definition with a different rule string
    pub fn with_rules(&self, rules: impl Into<String>) -> Self {
        match self {
            FieldRules::Rules(_) => FieldRules::Rules(rules.into()),
            FieldRules::Detailed { label, errors, .. } => FieldRules::Detailed {
                label: label.clone(),
                rules: rules.into(),
                errors: errors.clone(),
            },
        }
    }

    /// Individual rules, split on `|`
    pub fn split(&self) -> Vec<String> {
        split_rules(self.rules())
    }
}

impl From<&str> for FieldRules {
    fn from(rules: &str) -> Self {
        FieldRules::Rules(rules.to_string())
    }
}

impl From<String> for FieldRules {
    fn from(rules: String) -> Self {
        FieldRules::Rules(rules)
    }
}

/// Field → rules
pub type RuleSet = BTreeMap<String, FieldRules>;

/// Field → rule → message template
pub type MessageSet = BTreeMap<String, BTreeMap<String, String>>;

/// Split a rule string on `|`, leaving pipes inside `[...]` alone
pub fn split_rules(rules: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;

    for c in rules.chars() {
        match c {
            '[' => {
                depth += 1;
                current.push(c);
            }
            ']' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            '|' if depth == 0 => {
                if !current.is_empty() {
                    parts.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }

    parts
}

/// Field names referenced as `{name}` in a rule string
pub fn placeholders(rules: &str) -> Vec<String> {
    PLACEHOLDER
        .captures_iter(rules)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// One rule occurrence: `name` or `name[param]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRule {
    pub name: String,
    pub param: Option<String>,
}

impl ParsedRule {
    pub fn parse(rule: &str) -> Self {
        let rule = rule.trim();
        match (rule.find('['), rule.ends_with(']')) {
            (Some(open), true) => Self {
                name: rule[..open].to_string(),
                param: Some(rule[open + 1..rule.len() - 1].to_string()),
            },
            _ => Self {
                name: rule.to_string(),
                param: None,
            },
        }
    }

    fn require_param(&self) -> Result<&str, RuleError> {
        self.param.as_deref().ok_or_else(|| RuleError::InvalidParameter {
            rule: self.name.clone(),
            reason: "a parameter is required".to_string(),
        })
    }

    fn length_param(&self) -> Result<usize, RuleError> {
        let param = self.require_param()?;
        param.trim().parse().map_err(|_| RuleError::InvalidParameter {
            rule: self.name.clone(),
            reason: format!("'{}' is not a length", param),
        })
    }

    fn comparison(&self, comparison: Comparison) -> Result<Arc<dyn ValidationRule>, RuleError> {
        let param = self.require_param()?;
        let validator = ComparisonValidator::parse(comparison, param).ok_or_else(|| {
            RuleError::InvalidParameter {
                rule: self.name.clone(),
                reason: format!("'{}' is not a number", param),
            }
        })?;
        Ok(Arc::new(validator))
    }
}

/// Rules of one field, ready to run
#[derive(Clone, Default)]
pub struct CompiledField {
    /// Skip the field entirely when it is absent from the data
    pub if_exist: bool,
    /// Empty values pass without running the remaining rules
    pub permit_empty: bool,
    pub required: bool,
    pub rules: Vec<Arc<dyn ValidationRule>>,
}

impl std::fmt::Debug for CompiledField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledField")
            .field("if_exist", &self.if_exist)
            .field("permit_empty", &self.permit_empty)
            .field("required", &self.required)
            .field(
                "rules",
                &self.rules.iter().map(|r| r.rule_name().to_string()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Compile a rule string against the built-in rules and the custom registry
pub fn compile(
    rules: &str,
    custom: &HashMap<String, CustomValidator>,
) -> Result<CompiledField, RuleError> {
    let mut compiled = CompiledField::default();

    for raw in split_rules(rules) {
        let rule = ParsedRule::parse(&raw);
        match rule.name.as_str() {
            "if_exist" => compiled.if_exist = true,
            "permit_empty" => compiled.permit_empty = true,
            _ => {
                if rule.name == "required" {
                    compiled.required = true;
                }
                compiled.rules.push(build_rule(&rule, custom)?);
            }
        }
    }

    Ok(compiled)
}

/// Build the validator for a single parsed rule
pub fn build_rule(
    rule: &ParsedRule,
    custom: &HashMap<String, CustomValidator>,
) -> Result<Arc<dyn ValidationRule>, RuleError> {
    let validator: Arc<dyn ValidationRule> = match rule.name.as_str() {
        "required" => Arc::new(RequiredValidator::new()),
        "min_length" => Arc::new(LengthValidator::min(rule.length_param()?)),
        "max_length" => Arc::new(LengthValidator::max(rule.length_param()?)),
        "exact_length" => Arc::new(LengthValidator::exact(rule.length_param()?)),
        "numeric" => Arc::new(NumericValidator::new(NumberFormat::Numeric)),
        "integer" => Arc::new(NumericValidator::new(NumberFormat::Integer)),
        "decimal" => Arc::new(NumericValidator::new(NumberFormat::Decimal)),
        "is_natural" => Arc::new(NumericValidator::new(NumberFormat::Natural)),
        "is_natural_no_zero" => Arc::new(NumericValidator::new(NumberFormat::NaturalNoZero)),
        "alpha" => Arc::new(CharacterClassValidator::new(CharacterClass::Alpha)),
        "alpha_numeric" => Arc::new(CharacterClassValidator::new(CharacterClass::AlphaNumeric)),
        "alpha_numeric_space" => {
            Arc::new(CharacterClassValidator::new(CharacterClass::AlphaNumericSpace))
        }
        "alpha_dash" => Arc::new(CharacterClassValidator::new(CharacterClass::AlphaDash)),
        "valid_email" => Arc::new(EmailValidator::new()),
        "regex_match" => Arc::new(PatternValidator::parse(rule.require_param()?)?),
        "in_list" => Arc::new(InListValidator::parse(rule.require_param()?)),
        "matches" => Arc::new(FieldComparisonValidator::matches(rule.require_param()?)),
        "differs" => Arc::new(FieldComparisonValidator::differs(rule.require_param()?)),
        "greater_than" => rule.comparison(Comparison::GreaterThan)?,
        "greater_than_equal_to" => rule.comparison(Comparison::GreaterThanOrEqual)?,
        "less_than" => rule.comparison(Comparison::LessThan)?,
        "less_than_equal_to" => rule.comparison(Comparison::LessThanOrEqual)?,
        name => match custom.get(name) {
            Some(validator) => Arc::new(validator.with_param(rule.param.clone())),
            None => return Err(RuleError::UnknownRule(name.to_string())),
        },
    };
    Ok(validator)
}
