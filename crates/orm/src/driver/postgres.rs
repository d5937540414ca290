//! PostgreSQL driver
//!
//! Renders statements with [`QueryBuilder`], binds the collected values and
//! runs them on a sqlx pool. Database-side refusals (constraint violations,
//! type errors) are kept for `do_errors()` and reported as failed writes.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{Column, PgPool, Postgres, Row as SqlxRow, TypeInfo, ValueRef};
use tracing::{debug, warn};

use super::{DriverContext, ModelDriver, WriteOutcome};
use crate::error::{ModelError, ModelResult};
use crate::model::primary_key::PrimaryKey;
use crate::query::{QueryBuilder, WhereCondition};
use crate::value::{Row, Value};

/// Driver running statements on a PostgreSQL pool
///
/// `do_errors()` reports the refusal of the latest write, if any.
#[derive(Debug)]
pub struct PostgresDriver {
    pool: Arc<PgPool>,
    last_error: RwLock<BTreeMap<String, String>>,
}

impl PostgresDriver {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self {
            pool,
            last_error: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch(&self, builder: &QueryBuilder) -> ModelResult<Vec<Row>> {
        let (sql, params) = builder.to_sql_with_params()?;
        debug!("Executing query: {}", sql);

        let mut query = sqlx::query(&sql);
        for param in &params {
            query = bind_value(query, param);
        }

        let rows = query.fetch_all(&*self.pool).await?;
        rows.iter().map(row_from_postgres).collect()
    }

    /// Run a write. `Ok(None)` means the database refused it.
    async fn execute(&self, builder: &QueryBuilder) -> ModelResult<Option<u64>> {
        let (sql, params) = builder.to_sql_with_params()?;
        debug!("Executing statement: {}", sql);

        self.last_error.write().clear();
        let mut query = sqlx::query(&sql);
        for param in &params {
            query = bind_value(query, param);
        }

        match query.execute(&*self.pool).await {
            Ok(result) => Ok(Some(result.rows_affected())),
            Err(sqlx::Error::Database(error)) => {
                self.record(error.as_ref());
                Ok(None)
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Run a write with `RETURNING`. `Ok(None)` means the database refused it.
    async fn execute_returning(&self, builder: &QueryBuilder) -> ModelResult<Option<Vec<Row>>> {
        let (sql, params) = builder.to_sql_with_params()?;
        debug!("Executing statement: {}", sql);

        self.last_error.write().clear();
        let mut query = sqlx::query(&sql);
        for param in &params {
            query = bind_value(query, param);
        }

        match query.fetch_all(&*self.pool).await {
            Ok(rows) => Ok(Some(rows.iter().map(row_from_postgres).collect::<ModelResult<_>>()?)),
            Err(sqlx::Error::Database(error)) => {
                self.record(error.as_ref());
                Ok(None)
            }
            Err(error) => Err(error.into()),
        }
    }

    fn record(&self, error: &dyn sqlx::error::DatabaseError) {
        warn!("Database refused statement: {}", error.message());
        let code = error.code().map(|c| c.into_owned()).unwrap_or_else(|| "database".to_string());
        let mut errors = self.last_error.write();
        errors.clear();
        errors.insert(code, error.message().to_string());
    }

    fn select(&self, ctx: &DriverContext<'_>) -> QueryBuilder {
        QueryBuilder::select(ctx.table())
            .where_all(&ctx.read_conditions())
            .order_by_all(ctx.order_by)
    }
}

#[async_trait]
impl ModelDriver for PostgresDriver {
    async fn do_find(&self, ctx: &DriverContext<'_>, ids: &[PrimaryKey]) -> ModelResult<Vec<Row>> {
        let mut builder = self.select(ctx);
        if !ids.is_empty() {
            builder = builder.where_condition(WhereCondition::for_keys(ctx.primary_key(), ids));
        }
        self.fetch(&builder).await
    }

    async fn do_find_column(&self, ctx: &DriverContext<'_>, column: &str) -> ModelResult<Vec<Value>> {
        let rows = self.fetch(&self.select(ctx).columns(&[column])).await?;
        Ok(rows.into_iter().filter_map(|mut row| row.remove(column)).collect())
    }

    async fn do_find_all(
        &self,
        ctx: &DriverContext<'_>,
        limit: Option<u64>,
        offset: u64,
    ) -> ModelResult<Vec<Row>> {
        let mut builder = self.select(ctx).offset(offset);
        if let Some(limit) = limit {
            builder = builder.limit(limit);
        }
        self.fetch(&builder).await
    }

    async fn do_first(&self, ctx: &DriverContext<'_>) -> ModelResult<Option<Row>> {
        let builder = QueryBuilder::select(ctx.table())
            .where_all(&ctx.read_conditions())
            .order_by_all(&ctx.first_order())
            .limit(1);
        Ok(self.fetch(&builder).await?.into_iter().next())
    }

    async fn do_insert(&self, ctx: &DriverContext<'_>, row: &Row) -> ModelResult<WriteOutcome> {
        let builder = QueryBuilder::insert_into(ctx.table())
            .set_row(row)
            .returning(ctx.primary_key());

        let Some(rows) = self.execute_returning(&builder).await? else {
            return Ok(WriteOutcome::Failed);
        };

        let id = rows
            .first()
            .and_then(|returned| returned.get(ctx.primary_key()))
            .or_else(|| row.get(ctx.primary_key()))
            .and_then(PrimaryKey::from_value);

        Ok(match id {
            Some(id) => WriteOutcome::Inserted(id),
            None => WriteOutcome::Done,
        })
    }

    async fn do_insert_batch(
        &self,
        ctx: &DriverContext<'_>,
        rows: &[Row],
        batch_size: usize,
        testing: bool,
    ) -> ModelResult<WriteOutcome> {
        let builders: Vec<QueryBuilder> = rows
            .chunks(batch_size.max(1))
            .map(|chunk| QueryBuilder::insert_batch(ctx.table(), chunk.to_vec()))
            .collect();

        if testing {
            let statements = builders.iter().map(QueryBuilder::to_sql).collect::<ModelResult<Vec<_>>>()?;
            return Ok(WriteOutcome::Sql(statements.join(";\n")));
        }

        let mut affected = 0;
        for builder in &builders {
            match self.execute(builder).await? {
                Some(n) => affected += n,
                None => return Ok(WriteOutcome::Failed),
            }
        }
        Ok(WriteOutcome::Affected(affected))
    }

    async fn do_update(&self, ctx: &DriverContext<'_>, ids: &[PrimaryKey], row: &Row) -> ModelResult<bool> {
        let builder = QueryBuilder::update(ctx.table())
            .set_row(row)
            .where_all(&ctx.write_conditions(ids));
        Ok(self.execute(&builder).await?.is_some())
    }

    async fn do_update_batch(
        &self,
        ctx: &DriverContext<'_>,
        rows: &[Row],
        index: &str,
        batch_size: usize,
        return_sql: bool,
    ) -> ModelResult<WriteOutcome> {
        let builders: Vec<QueryBuilder> = rows
            .chunks(batch_size.max(1))
            .map(|chunk| {
                QueryBuilder::update_batch(ctx.table(), chunk.to_vec(), index).where_all(ctx.constraints)
            })
            .collect();

        if return_sql {
            let statements = builders.iter().map(QueryBuilder::to_sql).collect::<ModelResult<Vec<_>>>()?;
            return Ok(WriteOutcome::Sql(statements.join(";\n")));
        }

        let mut affected = 0;
        for builder in &builders {
            match self.execute(builder).await? {
                Some(n) => affected += n,
                None => return Ok(WriteOutcome::Failed),
            }
        }
        Ok(WriteOutcome::Affected(affected))
    }

    async fn do_delete(
        &self,
        ctx: &DriverContext<'_>,
        ids: &[PrimaryKey],
        purge: bool,
    ) -> ModelResult<WriteOutcome> {
        let conditions = ctx.write_conditions(ids);

        let builder = match ctx.soft_delete_set(purge) {
            Some(set) => {
                let mut builder = QueryBuilder::update(ctx.table()).set_row(&set).where_all(&conditions);
                if !conditions.is_empty() {
                    if let Some(deleted) = ctx.config.deleted_column() {
                        builder = builder.where_null(deleted);
                    }
                }
                builder
            }
            None => QueryBuilder::delete_from(ctx.table()).where_all(&conditions),
        };

        Ok(match self.execute(&builder).await? {
            Some(n) => WriteOutcome::Affected(n),
            None => WriteOutcome::Failed,
        })
    }

    async fn do_purge_deleted(&self, ctx: &DriverContext<'_>) -> ModelResult<WriteOutcome> {
        let Some(deleted) = ctx.config.deleted_column() else {
            return Ok(WriteOutcome::Done);
        };
        let builder = QueryBuilder::delete_from(ctx.table()).where_not_null(deleted);
        Ok(match self.execute(&builder).await? {
            Some(n) => WriteOutcome::Affected(n),
            None => WriteOutcome::Failed,
        })
    }

    async fn do_replace(
        &self,
        ctx: &DriverContext<'_>,
        row: &Row,
        return_sql: bool,
    ) -> ModelResult<WriteOutcome> {
        let builder = QueryBuilder::upsert(ctx.table(), ctx.primary_key()).set_row(row);
        if return_sql {
            return Ok(WriteOutcome::Sql(builder.to_sql()?));
        }

        Ok(match self.execute(&builder).await? {
            Some(n) => WriteOutcome::Affected(n),
            None => WriteOutcome::Failed,
        })
    }

    async fn do_count_all_results(&self, ctx: &DriverContext<'_>) -> ModelResult<u64> {
        let builder = QueryBuilder::count(ctx.table()).where_all(&ctx.read_conditions());
        let rows = self.fetch(&builder).await?;
        let count = rows
            .first()
            .and_then(|row| row.get("numrows"))
            .and_then(Value::as_i64)
            .unwrap_or(0);
        Ok(count.max(0) as u64)
    }

    fn do_errors(&self) -> BTreeMap<String, String> {
        self.last_error.read().clone()
    }
}

/// Bind a value to a PostgreSQL query
fn bind_value<'q>(query: Query<'q, Postgres, PgArguments>, value: &Value) -> Query<'q, Postgres, PgArguments> {
    match value {
        Value::Null => query.bind(Option::<String>::None),
        Value::Bool(b) => query.bind(*b),
        Value::Int(i) => query.bind(*i),
        Value::Float(f) => query.bind(*f),
        Value::String(s) => query.bind(s.clone()),
        Value::Bytes(b) => query.bind(b.clone()),
        Value::Uuid(u) => query.bind(*u),
        Value::DateTime(dt) => query.bind(*dt),
        Value::Date(d) => query.bind(*d),
        Value::Json(j) => query.bind(j.clone()),
        Value::Array(items) => query.bind(items.iter().map(Value::to_text).collect::<Vec<String>>()),
    }
}

/// Convert a PostgreSQL row into a [`Row`]
fn row_from_postgres(row: &PgRow) -> ModelResult<Row> {
    let mut result = Row::new();
    for (index, column) in row.columns().iter().enumerate() {
        result.insert(column.name(), column_value(row, index)?);
    }
    Ok(result)
}

fn column_value(row: &PgRow, index: usize) -> ModelResult<Value> {
    if row.try_get_raw(index)?.is_null() {
        return Ok(Value::Null);
    }

    let type_name = row.columns()[index].type_info().name().to_string();
    let value = match type_name.as_str() {
        "BOOL" => Value::Bool(row.try_get(index)?),
        "INT2" => Value::Int(row.try_get::<i16, _>(index)? as i64),
        "INT4" => Value::Int(row.try_get::<i32, _>(index)? as i64),
        "INT8" => Value::Int(row.try_get(index)?),
        "FLOAT4" => Value::Float(row.try_get::<f32, _>(index)? as f64),
        "FLOAT8" => Value::Float(row.try_get(index)?),
        "BYTEA" => Value::Bytes(row.try_get(index)?),
        "UUID" => Value::Uuid(row.try_get(index)?),
        "TIMESTAMPTZ" => Value::DateTime(row.try_get(index)?),
        "TIMESTAMP" => Value::DateTime(row.try_get::<chrono::NaiveDateTime, _>(index)?.and_utc()),
        "DATE" => Value::Date(row.try_get(index)?),
        "JSON" | "JSONB" => Value::Json(row.try_get(index)?),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => Value::String(row.try_get(index)?),
        other => match row.try_get::<String, _>(index) {
            Ok(text) => Value::String(text),
            Err(error) => {
                return Err(ModelError::Database(format!(
                    "Unsupported column type {} for column {}: {}",
                    other,
                    row.columns()[index].name(),
                    error
                )))
            }
        },
    };
    Ok(value)
}
