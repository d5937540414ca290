//! Model configuration
//!
//! Everything a model declares up front: table, keys, mass-assignment
//! allow-list, timestamps, soft deletes, casts, validation rules and the
//! callback pipelines. Loadable from YAML or JSON, or built in code.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tabula_validation::{FieldRules, MessageSet, RuleSet};

use crate::error::ConfigError;
use crate::events::ModelEvent;

/// How dates are written to storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum DateFormat {
    /// Unix timestamp in seconds
    Int,
    /// `Y-m-d`
    Date,
    /// `Y-m-d H:i:s`
    #[default]
    DateTime,
}

impl FromStr for DateFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "int" => Ok(DateFormat::Int),
            "date" => Ok(DateFormat::Date),
            "datetime" => Ok(DateFormat::DateTime),
            other => Err(ConfigError::NoDateFormat(other.to_string())),
        }
    }
}

impl TryFrom<String> for DateFormat {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DateFormat> for String {
    fn from(format: DateFormat) -> Self {
        format.to_string()
    }
}

impl fmt::Display for DateFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DateFormat::Int => "int",
            DateFormat::Date => "date",
            DateFormat::DateTime => "datetime",
        };
        write!(f, "{}", name)
    }
}

/// Validation rules are either declared inline or name a rule group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValidationRules {
    Group(String),
    Inline(RuleSet),
}

impl Default for ValidationRules {
    fn default() -> Self {
        ValidationRules::Inline(RuleSet::new())
    }
}

/// Ordered handler names per lifecycle event
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Callbacks {
    pub before_insert: Vec<String>,
    pub after_insert: Vec<String>,
    pub before_insert_batch: Vec<String>,
    pub after_insert_batch: Vec<String>,
    pub before_update: Vec<String>,
    pub after_update: Vec<String>,
    pub before_update_batch: Vec<String>,
    pub after_update_batch: Vec<String>,
    pub before_find: Vec<String>,
    pub after_find: Vec<String>,
    pub before_delete: Vec<String>,
    pub after_delete: Vec<String>,
}

impl Callbacks {
    pub fn for_event(&self, event: ModelEvent) -> &[String] {
        match event {
            ModelEvent::BeforeInsert => &self.before_insert,
            ModelEvent::AfterInsert => &self.after_insert,
            ModelEvent::BeforeInsertBatch => &self.before_insert_batch,
            ModelEvent::AfterInsertBatch => &self.after_insert_batch,
            ModelEvent::BeforeUpdate => &self.before_update,
            ModelEvent::AfterUpdate => &self.after_update,
            ModelEvent::BeforeUpdateBatch => &self.before_update_batch,
            ModelEvent::AfterUpdateBatch => &self.after_update_batch,
            ModelEvent::BeforeFind => &self.before_find,
            ModelEvent::AfterFind => &self.after_find,
            ModelEvent::BeforeDelete => &self.before_delete,
            ModelEvent::AfterDelete => &self.after_delete,
        }
    }

    fn for_event_mut(&mut self, event: ModelEvent) -> &mut Vec<String> {
        match event {
            ModelEvent::BeforeInsert => &mut self.before_insert,
            ModelEvent::AfterInsert => &mut self.after_insert,
            ModelEvent::BeforeInsertBatch => &mut self.before_insert_batch,
            ModelEvent::AfterInsertBatch => &mut self.after_insert_batch,
            ModelEvent::BeforeUpdate => &mut self.before_update,
            ModelEvent::AfterUpdate => &mut self.after_update,
            ModelEvent::BeforeUpdateBatch => &mut self.before_update_batch,
            ModelEvent::AfterUpdateBatch => &mut self.after_update_batch,
            ModelEvent::BeforeFind => &mut self.before_find,
            ModelEvent::AfterFind => &mut self.after_find,
            ModelEvent::BeforeDelete => &mut self.before_delete,
            ModelEvent::AfterDelete => &mut self.after_delete,
        }
    }

    /// Append a handler name to an event's chain
    pub fn push(&mut self, event: ModelEvent, name: impl Into<String>) {
        self.for_event_mut(event).push(name.into());
    }
}

/// Behaviour switches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Features {
    /// `find_all(Some(0), _)` returns everything instead of nothing
    pub limit_zero_as_all: bool,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            limit_zero_as_all: true,
        }
    }
}

/// Declared settings of one model
///
/// An empty `created_field`, `updated_field` or `deleted_field` disables
/// that column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub table: String,
    pub primary_key: String,
    pub use_auto_increment: bool,
    pub allowed_fields: Vec<String>,
    pub protect_fields: bool,
    pub allow_empty_inserts: bool,
    pub use_timestamps: bool,
    pub date_format: DateFormat,
    pub created_field: String,
    pub updated_field: String,
    pub deleted_field: String,
    pub use_soft_deletes: bool,
    pub casts: BTreeMap<String, String>,
    pub validation_rules: ValidationRules,
    pub validation_messages: MessageSet,
    pub skip_validation: bool,
    pub clean_validation_rules: bool,
    pub allow_callbacks: bool,
    pub callbacks: Callbacks,
    pub db_group: Option<String>,
    pub features: Features,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            table: String::new(),
            primary_key: "id".to_string(),
            use_auto_increment: true,
            allowed_fields: Vec::new(),
            protect_fields: true,
            allow_empty_inserts: false,
            use_timestamps: false,
            date_format: DateFormat::DateTime,
            created_field: "created_at".to_string(),
            updated_field: "updated_at".to_string(),
            deleted_field: "deleted_at".to_string(),
            use_soft_deletes: false,
            casts: BTreeMap::new(),
            validation_rules: ValidationRules::default(),
            validation_messages: MessageSet::new(),
            skip_validation: false,
            clean_validation_rules: true,
            allow_callbacks: true,
            callbacks: Callbacks::default(),
            db_group: None,
            features: Features::default(),
        }
    }
}

impl ModelConfig {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    /// Load configuration from a YAML string
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)
            .map_err(|e| ConfigError::parsing(format!("Invalid model configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a `.yaml`/`.yml` or `.json` file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::parsing(format!("Cannot read {}: {}", path.display(), e))
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => {
                let config: Self = serde_json::from_str(&content).map_err(|e| {
                    ConfigError::parsing(format!("Invalid model configuration: {}", e))
                })?;
                config.validate()?;
                Ok(config)
            }
            _ => Self::from_yaml(&content),
        }
    }

    /// Check the configuration is usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.primary_key.trim().is_empty() {
            return Err(ConfigError::NoPrimaryKey(self.table.clone()));
        }
        if self.table.trim().is_empty() {
            return Err(ConfigError::missing_required(
                "table",
                "Every model needs the name of its table.",
            ));
        }
        Ok(())
    }

    pub fn primary_key(mut self, primary_key: impl Into<String>) -> Self {
        self.primary_key = primary_key.into();
        self
    }

    pub fn auto_increment(mut self, enabled: bool) -> Self {
        self.use_auto_increment = enabled;
        self
    }

    pub fn allowed_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn protect_fields(mut self, protect: bool) -> Self {
        self.protect_fields = protect;
        self
    }

    pub fn allow_empty_inserts(mut self, allow: bool) -> Self {
        self.allow_empty_inserts = allow;
        self
    }

    pub fn timestamps(mut self, enabled: bool) -> Self {
        self.use_timestamps = enabled;
        self
    }

    pub fn date_format(mut self, format: DateFormat) -> Self {
        self.date_format = format;
        self
    }

    pub fn created_field(mut self, field: impl Into<String>) -> Self {
        self.created_field = field.into();
        self
    }

    pub fn updated_field(mut self, field: impl Into<String>) -> Self {
        self.updated_field = field.into();
        self
    }

    pub fn deleted_field(mut self, field: impl Into<String>) -> Self {
        self.deleted_field = field.into();
        self
    }

    pub fn soft_deletes(mut self, enabled: bool) -> Self {
        self.use_soft_deletes = enabled;
        self
    }

    pub fn cast(mut self, field: impl Into<String>, cast: impl Into<String>) -> Self {
        self.casts.insert(field.into(), cast.into());
        self
    }

    pub fn rule(mut self, field: impl Into<String>, rules: impl Into<FieldRules>) -> Self {
        match &mut self.validation_rules {
            ValidationRules::Inline(set) => {
                set.insert(field.into(), rules.into());
            }
            ValidationRules::Group(_) => {
                let mut set = RuleSet::new();
                set.insert(field.into(), rules.into());
                self.validation_rules = ValidationRules::Inline(set);
            }
        }
        self
    }

    pub fn rule_group(mut self, group: impl Into<String>) -> Self {
        self.validation_rules = ValidationRules::Group(group.into());
        self
    }

    pub fn message(
        mut self,
        field: impl Into<String>,
        rule: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        self.validation_messages
            .entry(field.into())
            .or_default()
            .insert(rule.into(), message.into());
        self
    }

    pub fn skip_validation(mut self, skip: bool) -> Self {
        self.skip_validation = skip;
        self
    }

    pub fn clean_validation_rules(mut self, clean: bool) -> Self {
        self.clean_validation_rules = clean;
        self
    }

    pub fn allow_callbacks(mut self, allow: bool) -> Self {
        self.allow_callbacks = allow;
        self
    }

    pub fn callback(mut self, event: ModelEvent, name: impl Into<String>) -> Self {
        self.callbacks.push(event, name);
        self
    }

    pub fn db_group(mut self, group: impl Into<String>) -> Self {
        self.db_group = Some(group.into());
        self
    }

    pub fn limit_zero_as_all(mut self, enabled: bool) -> Self {
        self.features.limit_zero_as_all = enabled;
        self
    }

    pub fn created_column(&self) -> Option<&str> {
        Some(self.created_field.as_str()).filter(|field| self.use_timestamps && !field.is_empty())
    }

    pub fn updated_column(&self) -> Option<&str> {
        Some(self.updated_field.as_str()).filter(|field| self.use_timestamps && !field.is_empty())
    }

    pub fn deleted_column(&self) -> Option<&str> {
        Some(self.deleted_field.as_str()).filter(|field| self.use_soft_deletes && !field.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ModelConfig::new("users");
        assert_eq!(config.primary_key, "id");
        assert!(config.protect_fields);
        assert!(config.clean_validation_rules);
        assert!(config.features.limit_zero_as_all);
        assert_eq!(config.date_format, DateFormat::DateTime);
        assert_eq!(config.created_column(), None);
    }

    #[test]
    fn test_from_yaml() {
        let config = ModelConfig::from_yaml(
            r#"
table: users
allowed_fields: [name, email]
use_timestamps: true
date_format: int
use_soft_deletes: true
casts:
  active: bool
validation_rules:
  name: required|min_length[3]
callbacks:
  before_insert: [hash_password]
"#,
        )
        .unwrap();

        assert_eq!(config.table, "users");
        assert_eq!(config.date_format, DateFormat::Int);
        assert_eq!(config.created_column(), Some("created_at"));
        assert_eq!(config.deleted_column(), Some("deleted_at"));
        assert_eq!(
            config.callbacks.for_event(ModelEvent::BeforeInsert),
            &["hash_password".to_string()]
        );
        assert!(matches!(config.validation_rules, ValidationRules::Inline(ref rules) if rules.contains_key("name")));
    }

    #[test]
    fn test_rule_group_by_name() {
        let config = ModelConfig::from_yaml("table: users\nvalidation_rules: signup\n").unwrap();
        assert_eq!(config.validation_rules, ValidationRules::Group("signup".into()));
    }

    #[test]
    fn test_bad_date_format() {
        assert_eq!(
            "week".parse::<DateFormat>(),
            Err(ConfigError::NoDateFormat("week".into()))
        );
        assert!(ModelConfig::from_yaml("table: users\ndate_format: week\n").is_err());
    }

    #[test]
    fn test_missing_primary_key() {
        let config = ModelConfig::new("users").primary_key("");
        assert_eq!(config.validate(), Err(ConfigError::NoPrimaryKey("users".into())));
    }
}
