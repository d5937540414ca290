//! Named rule groups loaded from YAML or JSON

use crate::error::RuleError;
use crate::rules::{MessageSet, RuleSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Rules and messages registered under one group name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleGroup {
    pub rules: RuleSet,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub messages: MessageSet,
}

/// Validation configuration: the named rule groups models can refer to
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationConfig {
    #[serde(default)]
    pub groups: BTreeMap<String, RuleGroup>,
}

impl ValidationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a YAML document (JSON is valid YAML too)
    pub fn from_yaml(content: &str) -> Result<Self, RuleError> {
        serde_yaml::from_str(content).map_err(|e| RuleError::Config(e.to_string()))
    }

    /// Load from a `.yaml`/`.yml`/`.json` file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, RuleError> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| RuleError::Config(format!("{}: {}", path.as_ref().display(), e)))?;

        let extension = path
            .as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("");

        match extension.to_lowercase().as_str() {
            "json" => serde_json::from_str(&content).map_err(|e| RuleError::Config(e.to_string())),
            _ => Self::from_yaml(&content),
        }
    }

    /// Register a group, replacing any group with the same name
    pub fn with_group(mut self, name: impl Into<String>, group: RuleGroup) -> Self {
        self.groups.insert(name.into(), group);
        self
    }

    pub fn group(&self, name: &str) -> Result<&RuleGroup, RuleError> {
        self.groups
            .get(name)
            .ok_or_else(|| RuleError::UnknownGroup(name.to_string()))
    }

    pub fn has_group(&self, name: &str) -> bool {
        self.groups.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
groups:
  signup:
    rules:
      name: required|min_length[3]
      email: required|valid_email
    messages:
      name:
        required: Tell us your name
  contact:
    rules:
      email: valid_email
"#;

    #[test]
    fn test_load_groups_from_yaml() {
        let config = ValidationConfig::from_yaml(YAML).unwrap();

        let signup = config.group("signup").unwrap();
        assert_eq!(signup.rules.len(), 2);
        assert_eq!(signup.messages["name"]["required"], "Tell us your name");
        assert!(config.group("contact").unwrap().messages.is_empty());
    }

    #[test]
    fn test_unknown_group() {
        let config = ValidationConfig::from_yaml(YAML).unwrap();
        assert_eq!(
            config.group("missing").unwrap_err(),
            RuleError::UnknownGroup("missing".into())
        );
        assert!(!config.has_group("missing"));
    }

    #[test]
    fn test_invalid_yaml() {
        assert!(matches!(
            ValidationConfig::from_yaml("groups: [1, 2"),
            Err(RuleError::Config(_))
        ));
    }
}
