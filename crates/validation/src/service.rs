//! The validation service consumed by models

use crate::config::{RuleGroup, ValidationConfig};
use crate::error::{RuleError, ValidationError, ValidationErrors};
use crate::messages::render;
use crate::rules::{compile, placeholders, CompiledField, FieldRules, MessageSet, RuleSet};
use crate::traits::{value_text, Data, RuleContext, ValidationRule};
use crate::validators::{CustomValidator, RequiredValidator};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::debug;

/// A stateful validator: configure rules, run against data, read errors
#[async_trait]
pub trait ValidationService: Send + Sync {
    /// Forget rules, messages and errors of the previous run
    fn reset(&mut self);

    /// Replace the active rules and message overrides
    fn set_rules(&mut self, rules: RuleSet, messages: MessageSet);

    /// Validate `data`; `group` loads a named rule group first.
    ///
    /// Returns `Ok(false)` when no rules are set. Errors are problems with
    /// the rules themselves, never with the data.
    async fn run(
        &mut self,
        data: &Data,
        group: Option<&str>,
        db_group: Option<&str>,
    ) -> Result<bool, RuleError>;

    /// Errors of the last run, one per field
    fn get_errors(&self) -> &ValidationErrors;

    /// Rules and messages registered under a group name
    fn load_rule_group(&self, name: &str) -> Result<RuleGroup, RuleError>;
}

/// Default [`ValidationService`] implementation
#[derive(Debug, Clone, Default)]
pub struct Validator {
    config: ValidationConfig,
    rules: RuleSet,
    messages: MessageSet,
    errors: ValidationErrors,
    custom: HashMap<String, CustomValidator>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `config` for named rule groups
    pub fn with_config(mut self, config: ValidationConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a custom rule under its name
    pub fn register(mut self, rule: CustomValidator) -> Self {
        self.custom.insert(rule.name().to_string(), rule);
        self
    }

    /// Add or replace the rules of a single field
    pub fn set_rule(
        &mut self,
        field: impl Into<String>,
        label: Option<String>,
        rules: impl Into<String>,
        errors: BTreeMap<String, String>,
    ) -> &mut Self {
        self.rules.insert(
            field.into(),
            FieldRules::Detailed {
                label,
                rules: rules.into(),
                errors,
            },
        );
        self
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Validate a single value against a rule string
    pub async fn check(&mut self, value: Value, rules: &str) -> Result<bool, RuleError> {
        self.reset();
        self.set_rule("check", None, rules, BTreeMap::new());

        let mut data = Data::new();
        data.insert("check".to_string(), value);
        self.run(&data, None, None).await
    }

    /// Substitute `{field}` placeholders with values from `data`.
    ///
    /// A placeholder is only filled when the referenced field has rules of
    /// its own and its value passes them.
    async fn fill_placeholders(&self, data: &Data) -> Result<RuleSet, RuleError> {
        let mut filled = self.rules.clone();

        for (field, definition) in filled.iter_mut() {
            let mut rules = definition.rules().to_string();

            for name in placeholders(definition.rules()) {
                let Some(value) = data.get(&name) else {
                    continue;
                };

                let own_rules = self
                    .rules
                    .get(&name)
                    .ok_or_else(|| RuleError::PlaceholderWithoutRules(name.clone()))?;
                if placeholders(own_rules.rules())
                    .iter()
                    .any(|nested| data.contains_key(nested))
                {
                    return Err(RuleError::NestedPlaceholder(name.clone()));
                }

                let compiled = compile(own_rules.rules(), &self.custom)?;
                let ctx = RuleContext {
                    field: name.as_str(),
                    label: name.as_str(),
                    data,
                    db_group: None,
                };
                if first_failure(&compiled, value, &ctx).await.is_some() {
                    debug!("Placeholder {{{}}} in rules of {} left unfilled", name, field);
                    continue;
                }

                rules = rules.replace(&format!("{{{}}}", name), &value_text(value));
            }

            *definition = definition.with_rules(rules);
        }

        Ok(filled)
    }

    /// Message for a failed rule: field override, inline override, default
    fn error_message(
        &self,
        rules: &RuleSet,
        field: &str,
        label: &str,
        rule: &dyn ValidationRule,
        value: &Value,
    ) -> String {
        let rule_name = rule.rule_name();
        let template = self
            .messages
            .get(field)
            .and_then(|messages| messages.get(rule_name))
            .or_else(|| {
                rules
                    .get(field)
                    .and_then(FieldRules::errors)
                    .and_then(|errors| errors.get(rule_name))
            })
            .map(String::as_str)
            .unwrap_or_else(|| rule.message_template());

        // A parameter naming another labelled field shows that label
        let param = rule.parameter().map(|param| {
            rules
                .get(&param)
                .and_then(FieldRules::label)
                .map(str::to_string)
                .unwrap_or(param)
        });

        render(template, label, param.as_deref(), &value_text(value))
    }
}

/// The first rule of a field the value fails, honoring `permit_empty`
async fn first_failure(
    compiled: &CompiledField,
    value: &Value,
    ctx: &RuleContext<'_>,
) -> Option<Arc<dyn ValidationRule>> {
    if compiled.permit_empty && !compiled.required && !RequiredValidator::is_present(value) {
        return None;
    }

    for rule in &compiled.rules {
        if !rule.passes(value, ctx).await {
            return Some(rule.clone());
        }
    }
    None
}

#[async_trait]
impl ValidationService for Validator {
    fn reset(&mut self) {
        self.rules.clear();
        self.messages.clear();
        self.errors.clear();
    }

    fn set_rules(&mut self, rules: RuleSet, messages: MessageSet) {
        self.rules = rules;
        self.messages = messages;
    }

    async fn run(
        &mut self,
        data: &Data,
        group: Option<&str>,
        db_group: Option<&str>,
    ) -> Result<bool, RuleError> {
        if let Some(group) = group {
            let loaded = self.load_rule_group(group)?;
            self.rules = loaded.rules;
            self.messages = loaded.messages;
        }

        // Nothing to check is treated as a forgotten configuration
        if self.rules.is_empty() {
            return Ok(false);
        }

        let rules = self.fill_placeholders(data).await?;
        let mut errors = ValidationErrors::new();

        for (field, definition) in &rules {
            let compiled = compile(definition.rules(), &self.custom)?;
            if compiled.if_exist && !data.contains_key(field) {
                continue;
            }

            let value = data.get(field).cloned().unwrap_or(Value::Null);
            let label = definition.label().unwrap_or(field.as_str());
            let ctx = RuleContext {
                field: field.as_str(),
                label,
                data,
                db_group,
            };

            if let Some(rule) = first_failure(&compiled, &value, &ctx).await {
                let message = self.error_message(&rules, field, label, rule.as_ref(), &value);
                errors.add(ValidationError::for_rule(field, message, rule.rule_name()));
            }
        }

        debug!("Validated {} field(s), {} failed", rules.len(), errors.len());
        self.errors = errors;
        Ok(self.errors.is_empty())
    }

    fn get_errors(&self) -> &ValidationErrors {
        &self.errors
    }

    fn load_rule_group(&self, name: &str) -> Result<RuleGroup, RuleError> {
        self.config.group(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(pairs: &[(&str, Value)]) -> Data {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn rules(pairs: &[(&str, &str)]) -> RuleSet {
        pairs
            .iter()
            .map(|(field, rules)| (field.to_string(), FieldRules::from(*rules)))
            .collect()
    }

    #[tokio::test]
    async fn test_no_rules_fails() {
        let mut validator = Validator::new();
        assert!(!validator.run(&Data::new(), None, None).await.unwrap());
    }

    #[tokio::test]
    async fn test_first_failing_rule_reported() {
        let mut validator = Validator::new();
        validator.set_rules(rules(&[("name", "required|min_length[3]")]), MessageSet::new());

        let ok = validator.run(&data(&[("name", json!(""))]), None, None).await.unwrap();
        assert!(!ok);
        let error = validator.get_errors().get("name").unwrap();
        assert_eq!(error.rule, "required");
        assert_eq!(error.message, "The name field is required.");
    }

    #[tokio::test]
    async fn test_custom_message_and_label() {
        let mut validator = Validator::new();
        validator.set_rule(
            "email",
            Some("Email address".into()),
            "valid_email",
            BTreeMap::new(),
        );
        let ok = validator.run(&data(&[("email", json!("nope"))]), None, None).await.unwrap();
        assert!(!ok);
        assert_eq!(
            validator.get_errors().get("email").unwrap().message,
            "The Email address field must contain a valid email address."
        );

        let mut messages = MessageSet::new();
        messages.insert(
            "email".into(),
            BTreeMap::from([("valid_email".to_string(), "{value} is no email".to_string())]),
        );
        validator.set_rules(rules(&[("email", "valid_email")]), messages);
        validator.run(&data(&[("email", json!("nope"))]), None, None).await.unwrap();
        assert_eq!(validator.get_errors().get("email").unwrap().message, "nope is no email");
    }

    #[tokio::test]
    async fn test_param_shows_field_label() {
        let mut validator = Validator::new();
        validator.set_rule("password", Some("Password".into()), "required", BTreeMap::new());
        validator.set_rule("confirm", None, "matches[password]", BTreeMap::new());

        let input = data(&[("password", json!("a")), ("confirm", json!("b"))]);
        assert!(!validator.run(&input, None, None).await.unwrap());
        assert_eq!(
            validator.get_errors().get("confirm").unwrap().message,
            "The confirm field does not match the Password field."
        );
    }

    #[tokio::test]
    async fn test_permit_empty_and_if_exist() {
        let mut validator = Validator::new();
        validator.set_rules(
            rules(&[("nick", "permit_empty|min_length[3]"), ("age", "if_exist|integer")]),
            MessageSet::new(),
        );

        assert!(validator.run(&data(&[("nick", json!(""))]), None, None).await.unwrap());
        assert!(!validator.run(&data(&[("nick", json!("ab"))]), None, None).await.unwrap());
        assert!(!validator
            .run(&data(&[("nick", json!("abc")), ("age", json!("x"))]), None, None)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_placeholder_substitution() {
        let mut validator = Validator::new();
        validator.set_rules(
            rules(&[("id", "is_natural_no_zero"), ("max", "less_than[{id}]")]),
            MessageSet::new(),
        );

        let input = data(&[("id", json!(10)), ("max", json!(5))]);
        assert!(validator.run(&input, None, None).await.unwrap());

        let input = data(&[("id", json!(10)), ("max", json!(50))]);
        assert!(!validator.run(&input, None, None).await.unwrap());
        assert_eq!(
            validator.get_errors().get("max").unwrap().message,
            "The max field must contain a number less than 10."
        );
    }

    #[tokio::test]
    async fn test_placeholder_without_rules() {
        let mut validator = Validator::new();
        validator.set_rules(rules(&[("max", "less_than[{id}]")]), MessageSet::new());

        let err = validator
            .run(&data(&[("id", json!(1)), ("max", json!(0))]), None, None)
            .await
            .unwrap_err();
        assert_eq!(err, RuleError::PlaceholderWithoutRules("id".into()));
    }

    #[tokio::test]
    async fn test_named_group() {
        let config = ValidationConfig::new().with_group(
            "signup",
            RuleGroup {
                rules: rules(&[("name", "required")]),
                messages: MessageSet::new(),
            },
        );
        let mut validator = Validator::new().with_config(config);

        assert!(!validator.run(&Data::new(), Some("signup"), None).await.unwrap());
        assert!(validator.get_errors().has_field_error("name"));
        assert_eq!(
            validator.run(&Data::new(), Some("nope"), None).await.unwrap_err(),
            RuleError::UnknownGroup("nope".into())
        );
    }

    #[tokio::test]
    async fn test_custom_rule_and_check() {
        let mut validator = Validator::new().register(CustomValidator::new(
            "even",
            |value, _, _| value.as_i64().map_or(false, |n| n % 2 == 0),
        ));

        assert!(validator.check(json!(4), "required|even").await.unwrap());
        assert!(!validator.check(json!(3), "required|even").await.unwrap());
        assert_eq!(validator.get_errors().get("check").unwrap().rule, "even");
    }
}
