//! # tabula-validation
//!
//! Rule-string validation for tabula models. Rules are written as
//! `required|min_length[3]|valid_email`, grouped per field, optionally
//! loaded by group name from configuration, and checked by a stateful
//! [`Validator`] that keeps the first error of each field.
//!
//! ```
//! use serde_json::json;
//! use tabula_validation::Validator;
//!
//! # tokio_test::block_on(async {
//! let mut validator = Validator::new();
//! assert!(validator.check(json!("jane@example.com"), "required|valid_email").await.unwrap());
//! assert!(!validator.check(json!("ab"), "min_length[3]").await.unwrap());
//! # });
//! ```

pub mod config;
pub mod error;
pub mod messages;
pub mod rules;
pub mod service;
pub mod traits;
pub mod validators;

// Re-exports for easy access
pub use config::{RuleGroup, ValidationConfig};
pub use error::{RuleError, ValidationError, ValidationErrors, ValidationResult};
pub use rules::{split_rules, FieldRules, MessageSet, ParsedRule, RuleSet};
pub use service::{ValidationService, Validator};
pub use traits::{Data, RuleContext, ValidationRule};

// Built-in validators
pub use validators::{
    custom::CustomValidator, email::EmailValidator, fields::FieldComparisonValidator,
    length::LengthValidator, list::InListValidator, numeric::ComparisonValidator,
    numeric::NumericValidator, pattern::CharacterClassValidator, pattern::PatternValidator,
    required::RequiredValidator,
};
