//! Primary keys and primary key validation
//!
//! Finders accept any [`PrimaryKey`] directly. Writes that target rows by id
//! (`update`, `delete`) accept a loose [`IdArg`] and run it through
//! [`validate_id`] before anything reaches the driver.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::{ModelError, ModelResult};
use crate::value::Value;

/// A raw SQL fragment used in place of a key value. It is never checked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RawSql(String);

impl RawSql {
    pub fn new(sql: impl Into<String>) -> Self {
        Self(sql.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RawSql {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Primary key value of a single row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PrimaryKey {
    /// Integer key, usually auto-incremented
    Int(i64),
    /// String key (natural keys, UUIDs, numeric strings as given)
    Str(String),
    /// Raw SQL passthrough
    Raw(RawSql),
}

impl std::fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PrimaryKey::Int(id) => write!(f, "{}", id),
            PrimaryKey::Str(id) => write!(f, "{}", id),
            PrimaryKey::Raw(sql) => write!(f, "{}", sql),
        }
    }
}

impl PrimaryKey {
    /// Extract as i64 if this is an integer key
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PrimaryKey::Int(id) => Some(*id),
            _ => None,
        }
    }

    pub fn is_raw(&self) -> bool {
        matches!(self, PrimaryKey::Raw(_))
    }

    /// The key as a column value. Raw SQL has no value form.
    pub fn to_value(&self) -> Option<Value> {
        match self {
            PrimaryKey::Int(id) => Some(Value::Int(*id)),
            PrimaryKey::Str(id) => Some(Value::String(id.clone())),
            PrimaryKey::Raw(_) => None,
        }
    }

    /// Read a key back from a column value. Empty-like values are not keys.
    pub fn from_value(value: &Value) -> Option<Self> {
        if value.is_empty_like() {
            return None;
        }
        match value {
            Value::Int(id) => Some(PrimaryKey::Int(*id)),
            Value::Float(f) if f.fract() == 0.0 => Some(PrimaryKey::Int(*f as i64)),
            Value::String(s) => Some(PrimaryKey::Str(s.clone())),
            Value::Uuid(u) => Some(PrimaryKey::Str(u.to_string())),
            _ => None,
        }
    }
}

impl From<i64> for PrimaryKey {
    fn from(id: i64) -> Self {
        PrimaryKey::Int(id)
    }
}

impl From<i32> for PrimaryKey {
    fn from(id: i32) -> Self {
        PrimaryKey::Int(id as i64)
    }
}

impl From<&str> for PrimaryKey {
    fn from(id: &str) -> Self {
        PrimaryKey::Str(id.to_string())
    }
}

impl From<String> for PrimaryKey {
    fn from(id: String) -> Self {
        PrimaryKey::Str(id)
    }
}

impl From<Uuid> for PrimaryKey {
    fn from(id: Uuid) -> Self {
        PrimaryKey::Str(id.to_string())
    }
}

impl From<RawSql> for PrimaryKey {
    fn from(sql: RawSql) -> Self {
        PrimaryKey::Raw(sql)
    }
}

/// Caller supplied id argument, before validation
#[derive(Debug, Clone, PartialEq)]
pub enum IdArg {
    /// Any JSON scalar or array, exactly as the caller passed it
    Json(JsonValue),
    Raw(RawSql),
    List(Vec<IdArg>),
    Key(PrimaryKey),
}

impl From<JsonValue> for IdArg {
    fn from(value: JsonValue) -> Self {
        IdArg::Json(value)
    }
}

impl From<i64> for IdArg {
    fn from(id: i64) -> Self {
        IdArg::Json(JsonValue::from(id))
    }
}

impl From<i32> for IdArg {
    fn from(id: i32) -> Self {
        IdArg::Json(JsonValue::from(id))
    }
}

impl From<bool> for IdArg {
    fn from(flag: bool) -> Self {
        IdArg::Json(JsonValue::Bool(flag))
    }
}

impl From<&str> for IdArg {
    fn from(id: &str) -> Self {
        IdArg::Json(JsonValue::String(id.to_string()))
    }
}

impl From<String> for IdArg {
    fn from(id: String) -> Self {
        IdArg::Json(JsonValue::String(id))
    }
}

impl From<RawSql> for IdArg {
    fn from(sql: RawSql) -> Self {
        IdArg::Raw(sql)
    }
}

impl From<PrimaryKey> for IdArg {
    fn from(key: PrimaryKey) -> Self {
        IdArg::Key(key)
    }
}

impl<T: Into<IdArg>> From<Vec<T>> for IdArg {
    fn from(ids: Vec<T>) -> Self {
        IdArg::List(ids.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<IdArg>> From<Option<T>> for IdArg {
    fn from(id: Option<T>) -> Self {
        id.map(Into::into).unwrap_or(IdArg::Json(JsonValue::Null))
    }
}

/// Validate a caller supplied id and flatten it into keys.
///
/// Arrays must be non-empty, one level deep, and every element must pass
/// the single value check. Single values `null`, `0`, `"0"`, `""`, `true`
/// and `false` are rejected; raw SQL is accepted unchecked; anything else
/// must be an integer or a string.
pub fn validate_id(id: &IdArg) -> ModelResult<Vec<PrimaryKey>> {
    match id {
        IdArg::List(items) => validate_list(items.iter().map(Element::Arg).collect()),
        IdArg::Json(JsonValue::Array(items)) => {
            validate_list(items.iter().map(Element::Json).collect())
        }
        single => validate_single(single).map(|key| vec![key]),
    }
}

enum Element<'a> {
    Arg(&'a IdArg),
    Json(&'a JsonValue),
}

fn validate_list(items: Vec<Element<'_>>) -> ModelResult<Vec<PrimaryKey>> {
    if items.is_empty() {
        return Err(ModelError::invalid_argument(
            "Invalid primary key: cannot be an empty array.",
        ));
    }

    let nested = items.iter().any(|item| match item {
        Element::Arg(IdArg::List(_)) | Element::Arg(IdArg::Json(JsonValue::Array(_))) => true,
        Element::Json(JsonValue::Array(_)) => true,
        _ => false,
    });
    if nested {
        return Err(ModelError::invalid_argument(
            "Invalid primary key: only a single array level is allowed.",
        ));
    }

    items
        .into_iter()
        .map(|item| match item {
            Element::Arg(arg) => validate_single(arg),
            Element::Json(json) => validate_json(json),
        })
        .collect()
}

fn validate_single(id: &IdArg) -> ModelResult<PrimaryKey> {
    match id {
        IdArg::Raw(sql) => Ok(PrimaryKey::Raw(sql.clone())),
        IdArg::Json(json) => validate_json(json),
        IdArg::Key(PrimaryKey::Int(id)) => validate_json(&JsonValue::from(*id)),
        IdArg::Key(PrimaryKey::Str(id)) => validate_json(&JsonValue::String(id.clone())),
        IdArg::Key(raw @ PrimaryKey::Raw(_)) => Ok(raw.clone()),
        IdArg::List(_) => Err(ModelError::invalid_argument(
            "Invalid primary key: only a single array level is allowed.",
        )),
    }
}

fn validate_json(id: &JsonValue) -> ModelResult<PrimaryKey> {
    match id {
        JsonValue::Null => Err(ModelError::invalid_argument(
            "Invalid primary key: NULL is not allowed.",
        )),
        JsonValue::Bool(flag) => Err(ModelError::invalid_argument(format!(
            "Invalid primary key: boolean {} is not allowed.",
            flag
        ))),
        JsonValue::Number(n) => match n.as_i64() {
            Some(0) => Err(ModelError::invalid_argument(
                "Invalid primary key: 0 is not allowed.",
            )),
            Some(id) => Ok(PrimaryKey::Int(id)),
            None => Err(ModelError::invalid_argument(
                "Invalid type \"float\" for primary key.",
            )),
        },
        JsonValue::String(s) if s.is_empty() || s == "0" => Err(ModelError::invalid_argument(
            format!("Invalid primary key: '{}' is not allowed.", s),
        )),
        JsonValue::String(s) => Ok(PrimaryKey::Str(s.clone())),
        JsonValue::Array(_) => Err(ModelError::invalid_argument(
            "Invalid primary key: only a single array level is allowed.",
        )),
        JsonValue::Object(_) => Err(ModelError::invalid_argument(
            "Invalid type \"object\" for primary key.",
        )),
    }
}
