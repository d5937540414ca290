//! Model System
//!
//! - `base`: the [`BaseModel`] lifecycle orchestration
//! - `scope`: per-call options consumed by a terminal call
//! - `config`: declarative model configuration
//! - `primary_key`: key types and the id whitelist validator
//! - `entity`: explicit entity ↔ row conversion
//! - `pager`: page bookkeeping for `paginate()`

pub mod base;
pub mod config;
pub mod entity;
pub mod pager;
pub mod primary_key;
pub mod scope;

// Re-export main types for convenience
pub use base::{BaseModel, Clock, RuleFilter};
pub use config::{Callbacks, DateFormat, Features, ModelConfig, ValidationRules};
pub use entity::{entity_from_fields, fields_from_serialize, FromFields, Record, ToFields};
pub use pager::{Pager, DEFAULT_PER_PAGE};
pub use primary_key::{validate_id, IdArg, PrimaryKey, RawSql};
pub use scope::{Scope, ScopeState};
