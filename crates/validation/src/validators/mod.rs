//! Built-in validators for common validation scenarios

pub mod custom;
pub mod email;
pub mod fields;
pub mod length;
pub mod list;
pub mod numeric;
pub mod pattern;
pub mod required;

pub use custom::{CustomRuleFn, CustomValidator};
pub use email::EmailValidator;
pub use fields::FieldComparisonValidator;
pub use length::{LengthKind, LengthValidator};
pub use list::InListValidator;
pub use numeric::{Comparison, ComparisonValidator, NumberFormat, NumericValidator};
pub use pattern::{CharacterClass, CharacterClassValidator, PatternValidator};
pub use required::RequiredValidator;
