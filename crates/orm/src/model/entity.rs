//! Entities and write records
//!
//! Domain types opt in to the model layer by implementing [`ToFields`] and
//! [`FromFields`]. Types that already derive serde traits can delegate to
//! [`fields_from_serialize`] and [`entity_from_fields`].

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{ModelError, ModelResult};
use crate::value::Row;

/// Entity to row
pub trait ToFields: Send + Sync {
    fn to_fields(&self) -> ModelResult<Row>;
}

/// Row to entity
pub trait FromFields: Sized {
    fn from_fields(row: &Row) -> ModelResult<Self>;
}

impl ToFields for Row {
    fn to_fields(&self) -> ModelResult<Row> {
        Ok(self.clone())
    }
}

impl FromFields for Row {
    fn from_fields(row: &Row) -> ModelResult<Self> {
        Ok(row.clone())
    }
}

/// Serialize any serde struct into a row. The value must serialize to a map.
pub fn fields_from_serialize<T: Serialize + ?Sized>(entity: &T) -> ModelResult<Row> {
    let json = serde_json::to_value(entity)?;
    Row::from_json(json).map_err(|_| {
        ModelError::Serialization("Entities must serialize to a map of fields".to_string())
    })
}

/// Deserialize any serde struct from a row
pub fn entity_from_fields<T: DeserializeOwned>(row: &Row) -> ModelResult<T> {
    Ok(serde_json::from_value(row.to_json())?)
}

/// Input of a write: a plain row or a borrowed entity
pub enum Record<'a> {
    Row(Row),
    Entity(&'a dyn ToFields),
}

impl<'a> Record<'a> {
    pub(crate) fn into_row(self) -> ModelResult<Row> {
        match self {
            Record::Row(row) => Ok(row),
            Record::Entity(entity) => entity.to_fields(),
        }
    }
}

impl From<Row> for Record<'_> {
    fn from(row: Row) -> Self {
        Record::Row(row)
    }
}

impl<'a, T: ToFields> From<&'a T> for Record<'a> {
    fn from(entity: &'a T) -> Self {
        Record::Entity(entity)
    }
}

impl std::fmt::Debug for Record<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Record::Row(row) => f.debug_tuple("Row").field(row).finish(),
            Record::Entity(_) => f.write_str("Entity(..)"),
        }
    }
}
