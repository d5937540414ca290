//! Field casting between storage rows and domain values
//!
//! A model's cast map (`field => cast`) is compiled once into a
//! [`DataConverter`]. `to_data_source` turns domain values into storage
//! scalars before a write; `from_data_source` turns storage scalars back into
//! typed values after a read.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value as JsonValue;

use crate::error::{ConfigError, DataError, ModelResult};
use crate::model::entity::{FromFields, ToFields};
use crate::value::{Row, Value};

/// Supported cast types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastKind {
    Int,
    Float,
    Bool,
    IntBool,
    String,
    Json,
    JsonArray,
    Csv,
    DateTime,
    Date,
    Timestamp,
}

impl FromStr for CastKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "int" | "integer" => Ok(CastKind::Int),
            "float" | "double" => Ok(CastKind::Float),
            "bool" | "boolean" => Ok(CastKind::Bool),
            "int-bool" => Ok(CastKind::IntBool),
            "string" => Ok(CastKind::String),
            "json" => Ok(CastKind::Json),
            "json-array" | "array" => Ok(CastKind::JsonArray),
            "csv" => Ok(CastKind::Csv),
            "datetime" => Ok(CastKind::DateTime),
            "date" => Ok(CastKind::Date),
            "timestamp" => Ok(CastKind::Timestamp),
            other => Err(ConfigError::UnknownCast(other.to_string())),
        }
    }
}

impl fmt::Display for CastKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CastKind::Int => "int",
            CastKind::Float => "float",
            CastKind::Bool => "bool",
            CastKind::IntBool => "int-bool",
            CastKind::String => "string",
            CastKind::Json => "json",
            CastKind::JsonArray => "json-array",
            CastKind::Csv => "csv",
            CastKind::DateTime => "datetime",
            CastKind::Date => "date",
            CastKind::Timestamp => "timestamp",
        };
        write!(f, "{}", name)
    }
}

/// One field's cast. A leading `?` makes it nullable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cast {
    pub kind: CastKind,
    pub nullable: bool,
}

impl FromStr for Cast {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (nullable, name) = match s.strip_prefix('?') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        Ok(Cast {
            kind: name.parse()?,
            nullable,
        })
    }
}

impl fmt::Display for Cast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nullable {
            write!(f, "?{}", self.kind)
        } else {
            write!(f, "{}", self.kind)
        }
    }
}

/// Compiled cast map of one model
#[derive(Debug, Clone, Default)]
pub struct DataConverter {
    casts: BTreeMap<String, Cast>,
}

impl DataConverter {
    pub fn new(casts: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let casts = casts
            .iter()
            .map(|(field, cast)| Ok((field.clone(), cast.parse()?)))
            .collect::<Result<_, ConfigError>>()?;
        Ok(Self { casts })
    }

    pub fn is_empty(&self) -> bool {
        self.casts.is_empty()
    }

    pub fn cast_for(&self, field: &str) -> Option<Cast> {
        self.casts.get(field).copied()
    }

    /// Domain row to storage row
    pub fn to_data_source(&self, row: Row) -> ModelResult<Row> {
        self.convert(row, Direction::ToStorage)
    }

    /// Storage row to domain row
    pub fn from_data_source(&self, row: Row) -> ModelResult<Row> {
        self.convert(row, Direction::FromStorage)
    }

    /// Entity to storage row
    pub fn extract<E: ToFields + ?Sized>(&self, entity: &E) -> ModelResult<Row> {
        self.to_data_source(entity.to_fields()?)
    }

    /// Storage row to entity
    pub fn reconstruct<E: FromFields>(&self, row: Row) -> ModelResult<E> {
        E::from_fields(&self.from_data_source(row)?)
    }

    fn convert(&self, row: Row, direction: Direction) -> ModelResult<Row> {
        row.into_iter()
            .map(|(field, value)| {
                let value = match self.casts.get(&field) {
                    Some(cast) => cast_value(&field, *cast, value, direction)?,
                    None => value,
                };
                Ok((field, value))
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    ToStorage,
    FromStorage,
}

fn cast_value(field: &str, cast: Cast, value: Value, direction: Direction) -> ModelResult<Value> {
    if value.is_null() {
        if cast.nullable {
            return Ok(Value::Null);
        }
        return Err(DataError::cast(field, cast.to_string(), "null is not allowed").into());
    }

    let fail = |reason: String| -> crate::error::ModelError {
        DataError::cast(field, cast.to_string(), reason).into()
    };

    let converted = match (cast.kind, direction) {
        (CastKind::Int, _) => to_int(&value).map(Value::Int),
        (CastKind::Float, _) => value.as_f64().map(Value::Float),
        (CastKind::Bool, _) => to_bool(&value).map(Value::Bool),
        (CastKind::IntBool, Direction::ToStorage) => to_bool(&value).map(|b| Value::Int(b as i64)),
        (CastKind::IntBool, Direction::FromStorage) => to_bool(&value).map(Value::Bool),
        (CastKind::String, _) => Some(Value::String(value.to_text())),
        (CastKind::Json | CastKind::JsonArray, Direction::ToStorage) => match &value {
            Value::String(s) => Some(Value::String(s.clone())),
            other => Some(Value::String(other.to_json().to_string())),
        },
        (CastKind::Json, Direction::FromStorage) => match &value {
            Value::String(s) => {
                let parsed: JsonValue = serde_json::from_str(s)
                    .map_err(|e| fail(format!("invalid JSON: {}", e)))?;
                Some(Value::from_json(parsed))
            }
            Value::Json(_) | Value::Array(_) => Some(value.clone()),
            _ => None,
        },
        (CastKind::JsonArray, Direction::FromStorage) => match &value {
            Value::String(s) => match serde_json::from_str::<JsonValue>(s) {
                Ok(parsed @ (JsonValue::Array(_) | JsonValue::Object(_))) => {
                    Some(Value::from_json(parsed))
                }
                Ok(_) => None,
                Err(e) => return Err(fail(format!("invalid JSON: {}", e))),
            },
            Value::Json(_) | Value::Array(_) => Some(value.clone()),
            _ => None,
        },
        (CastKind::Csv, Direction::ToStorage) => match &value {
            Value::Array(items) => Some(Value::String(
                items.iter().map(Value::to_text).collect::<Vec<_>>().join(","),
            )),
            Value::String(s) => Some(Value::String(s.clone())),
            _ => None,
        },
        (CastKind::Csv, Direction::FromStorage) => match &value {
            Value::String(s) if s.is_empty() => Some(Value::Array(Vec::new())),
            Value::String(s) => Some(Value::Array(
                s.split(',').map(|item| Value::String(item.to_string())).collect(),
            )),
            Value::Array(_) => Some(value.clone()),
            _ => None,
        },
        (CastKind::DateTime, _) => to_datetime(&value).map(Value::DateTime),
        (CastKind::Date, _) => match &value {
            Value::Date(d) => Some(Value::Date(*d)),
            Value::DateTime(dt) => Some(Value::Date(dt.date_naive())),
            Value::String(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .ok()
                .or_else(|| to_datetime(&value).map(|dt| dt.date_naive()))
                .map(Value::Date),
            _ => None,
        },
        (CastKind::Timestamp, Direction::ToStorage) => {
            to_datetime(&value).map(|dt| Value::Int(dt.timestamp()))
        }
        (CastKind::Timestamp, Direction::FromStorage) => to_datetime(&value).map(Value::DateTime),
    };

    converted.ok_or_else(|| fail(format!("cannot convert {:?}", value)))
}

fn to_int(value: &Value) -> Option<i64> {
    match value {
        Value::Bool(b) => Some(*b as i64),
        Value::Float(f) => Some(f.trunc() as i64),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .ok()
            .or_else(|| s.trim().parse::<f64>().ok().map(|f| f.trunc() as i64)),
        other => other.as_i64(),
    }
}

fn to_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Int(i) => Some(*i != 0),
        Value::Float(f) => Some(*f != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "t" | "true" | "y" | "yes" | "on" => Some(true),
            "0" | "f" | "false" | "n" | "no" | "off" | "" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn to_datetime(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::DateTime(dt) => Some(*dt),
        Value::Date(d) => d.and_hms_opt(0, 0, 0).map(|naive| Utc.from_utc_datetime(&naive)),
        Value::Int(ts) => Utc.timestamp_opt(*ts, 0).single(),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(ts) = s.parse::<i64>() {
                return Utc.timestamp_opt(ts, 0).single();
            }
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .map(|naive| Utc.from_utc_datetime(&naive))
                .ok()
                .or_else(|| {
                    DateTime::parse_from_rfc3339(s)
                        .map(|dt| dt.with_timezone(&Utc))
                        .ok()
                })
        }
        _ => None,
    }
}
