//! Example: a users model end to end
//!
//! Runs against PostgreSQL when `DATABASE_URL` is set, otherwise against
//! the in-memory driver. Set `RUST_LOG=tabula_orm=debug` to watch the
//! model at work.
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tabula_orm::{
    create_pool, entity_from_fields, fields_from_serialize, row, BaseModel, DatabaseConfig, EventData,
    EventPayload, FromFields, MemoryDriver, ModelConfig, ModelDriver, ModelEvent, ModelResult, PostgresDriver,
    Row, ToFields,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Serialize, Deserialize)]
pub struct User {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub email: String,
    pub name: String,
}

impl ToFields for User {
    fn to_fields(&self) -> ModelResult<Row> {
        fields_from_serialize(self)
    }
}

impl FromFields for User {
    fn from_fields(row: &Row) -> ModelResult<Self> {
        entity_from_fields(row)
    }
}

fn lowercase_email(mut payload: EventPayload) -> ModelResult<EventPayload> {
    if let EventData::Row(row) = &mut payload.data {
        if let Some(email) = row.get("email").map(|v| v.to_text().to_lowercase()) {
            row.insert("email", email);
        }
    }
    Ok(payload)
}

async fn driver() -> ModelResult<Arc<dyn ModelDriver>> {
    match DatabaseConfig::from_env() {
        Ok(config) => {
            let pool = create_pool(&config).await?;
            Ok(Arc::new(PostgresDriver::new(pool)))
        }
        Err(_) => {
            info!("DATABASE_URL not set, using the in-memory driver");
            Ok(Arc::new(MemoryDriver::new()))
        }
    }
}

#[tokio::main]
async fn main() -> ModelResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = ModelConfig::new("users")
        .allowed_fields(["email", "name"])
        .timestamps(true)
        .soft_deletes(true)
        .rule("email", "required|valid_email")
        .rule("name", "required|min_length[2]")
        .callback(ModelEvent::BeforeInsert, "lowercaseEmail");

    let mut users = BaseModel::new(config, driver().await?)?;
    users.register_callback("lowercaseEmail", lowercase_email);

    let jane = User {
        id: None,
        email: "Jane@Example.com".to_string(),
        name: "Jane".to_string(),
    };
    let outcome = users.insert(&jane, true).await?;
    info!("Inserted Jane: {:?}", outcome);
    let jane_id = outcome.insert_id().cloned();

    let outcome = users.insert(row! { "email" => "not-an-email", "name" => "X" }, true).await?;
    info!("Invalid insert: {:?}, errors: {:?}", outcome, users.errors(false));

    if let Some(id) = jane_id {
        users.update(id.clone(), row! { "name" => "Janet" }).await?;
        let user: Option<User> = users.find_as(id.clone()).await?;
        info!("After update: {:?}", user);

        users.delete(id, false).await?;
    }

    info!("Visible users: {}", users.count_all_results().await?);
    info!("Including deleted: {}", users.with_deleted(true).count_all_results().await?);

    Ok(())
}
