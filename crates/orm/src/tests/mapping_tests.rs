//! Mapping and Hydration Tests
//!
//! Tests field casting and entity hydration through the model, using the
//! in-memory driver as storage so the stored shape can be inspected.

use crate::converter::DataConverter;
use crate::driver::MemoryDriver;
use crate::error::{ConfigError, DataError, ModelError, ModelResult};
use crate::model::{entity_from_fields, fields_from_serialize, BaseModel, DateFormat, FromFields, ModelConfig, ToFields};
use crate::row;
use crate::value::{Row, Value};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Profile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<i64>,
    name: String,
    active: bool,
    tags: Vec<String>,
}

impl ToFields for Profile {
    fn to_fields(&self) -> ModelResult<Row> {
        fields_from_serialize(self)
    }
}

impl FromFields for Profile {
    fn from_fields(row: &Row) -> ModelResult<Self> {
        entity_from_fields(row)
    }
}

fn profile_config() -> ModelConfig {
    ModelConfig::new("profiles")
        .allowed_fields(["name", "active", "tags", "meta", "age", "born_on"])
        .cast("id", "int")
        .cast("active", "int-bool")
        .cast("tags", "csv")
        .cast("meta", "?json")
}

fn profile_model(config: ModelConfig) -> (BaseModel, Arc<MemoryDriver>) {
    let driver = Arc::new(MemoryDriver::new());
    let model = BaseModel::new(config, driver.clone()).unwrap();
    (model, driver)
}

#[tokio::test]
async fn test_casts_apply_on_write() {
    let (mut model, driver) = profile_model(profile_config());

    model
        .insert(
            row! {
                "name" => "Jane",
                "active" => true,
                "tags" => vec!["admin", "staff"],
                "meta" => json!({"level": 3}),
            },
            false,
        )
        .await
        .unwrap();

    let stored = &driver.rows("profiles")[0];
    assert_eq!(stored.get("active"), Some(&Value::Int(1)));
    assert_eq!(stored.get("tags"), Some(&Value::from("admin,staff")));
    assert_eq!(stored.get("meta"), Some(&Value::from(r#"{"level":3}"#)));
}

#[tokio::test]
async fn test_casts_apply_on_read() {
    let (model, driver) = profile_model(profile_config());
    driver.seed(
        "profiles",
        "id",
        vec![row! {
            "id" => "7",
            "name" => "Jane",
            "active" => 0,
            "tags" => "a,b",
            "meta" => Value::Null,
        }],
    );

    let row = model.find(7).await.unwrap().unwrap();
    assert_eq!(row.get("id"), Some(&Value::Int(7)));
    assert_eq!(row.get("active"), Some(&Value::Bool(false)));
    assert_eq!(
        row.get("tags"),
        Some(&Value::Array(vec![Value::from("a"), Value::from("b")]))
    );
    assert_eq!(row.get("meta"), Some(&Value::Null));

    let active = model.find_column("active").await.unwrap().unwrap();
    assert_eq!(active, vec![Value::Bool(false)]);
}

#[tokio::test]
async fn test_entity_round_trip_through_storage() {
    let (mut model, driver) = profile_model(profile_config());
    let profile = Profile {
        id: None,
        name: "Jane".to_string(),
        active: true,
        tags: vec!["admin".to_string()],
    };

    model.insert(&profile, true).await.unwrap();
    assert_eq!(driver.rows("profiles")[0].get("tags"), Some(&Value::from("admin")));

    let found: Profile = model.find_as(1).await.unwrap().unwrap();
    assert_eq!(found, Profile { id: Some(1), ..profile });
}

#[tokio::test]
async fn test_uncastable_value_is_a_data_error() {
    let (mut model, driver) = profile_model(profile_config().cast("age", "int"));

    let err = model
        .insert(row! { "name" => "Jane", "age" => "forty" }, false)
        .await
        .unwrap_err();
    assert!(matches!(err, ModelError::Data(DataError::Cast { ref field, .. }) if field == "age"));
    assert!(driver.rows("profiles").is_empty());
}

#[tokio::test]
async fn test_null_needs_nullable_cast() {
    let (mut model, _driver) = profile_model(profile_config());

    let err = model
        .insert(row! { "name" => "Jane", "active" => Value::Null }, false)
        .await
        .unwrap_err();
    assert!(matches!(err, ModelError::Data(DataError::Cast { .. })));

    // `?json` accepts null
    model
        .insert(row! { "name" => "Jane", "meta" => Value::Null }, false)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_dates_are_written_in_date_format() {
    let config = profile_config()
        .cast("born_on", "date")
        .date_format(DateFormat::Date);
    let (mut model, driver) = profile_model(config);

    model
        .insert(row! { "name" => "Jane", "born_on" => "1990-02-14" }, false)
        .await
        .unwrap();

    let born_on = NaiveDate::from_ymd_opt(1990, 2, 14).unwrap();
    assert_eq!(driver.rows("profiles")[0].get("born_on"), Some(&Value::Date(born_on)));
}

#[test]
fn test_unknown_cast_is_refused_at_construction() {
    let config = ModelConfig::new("profiles").cast("active", "boolish");
    let err = BaseModel::new(config, Arc::new(MemoryDriver::new())).unwrap_err();
    assert!(matches!(err, ModelError::Config(ConfigError::UnknownCast(ref c)) if c == "boolish"));
}

#[test]
fn test_converter_extract_and_reconstruct() {
    let casts: BTreeMap<String, String> = [("active", "int-bool"), ("tags", "csv")]
        .into_iter()
        .map(|(field, cast)| (field.to_string(), cast.to_string()))
        .collect();
    let converter = DataConverter::new(&casts).unwrap();

    let profile = Profile {
        id: Some(3),
        name: "Jane".to_string(),
        active: false,
        tags: vec!["a".to_string(), "b".to_string()],
    };

    let stored = converter.extract(&profile).unwrap();
    assert_eq!(stored.get("active"), Some(&Value::Int(0)));
    assert_eq!(stored.get("tags"), Some(&Value::from("a,b")));

    let rebuilt: Profile = converter.reconstruct(stored).unwrap();
    assert_eq!(rebuilt, profile);
}
