//! In-process driver
//!
//! Keeps every table as a vector of rows behind a lock and evaluates
//! conditions with [`WhereCondition::matches`]. Statements are still run
//! through [`QueryBuilder`] so test-mode SQL and the where-less write guard
//! behave exactly like the PostgreSQL driver.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use super::{DriverContext, ModelDriver, WriteOutcome};
use crate::error::{DataError, ModelError, ModelResult};
use crate::model::primary_key::PrimaryKey;
use crate::query::{OrderDirection, QueryBuilder, WhereCondition};
use crate::value::{Row, Value};

#[derive(Debug, Default)]
struct MemoryTable {
    rows: Vec<Row>,
    next_id: i64,
}

impl MemoryTable {
    fn position(&self, primary_key: &str, key: &Value) -> Option<usize> {
        self.rows
            .iter()
            .position(|row| row.get(primary_key).map_or(false, |value| value.loose_eq(key)))
    }

    fn bump(&mut self, key: &Value) {
        if let Some(id) = key.as_i64() {
            self.next_id = self.next_id.max(id);
        }
    }
}

/// Driver that keeps rows in memory
#[derive(Debug, Default)]
pub struct MemoryDriver {
    tables: RwLock<HashMap<String, MemoryTable>>,
    last_error: RwLock<BTreeMap<String, String>>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store rows as-is, bypassing the model
    pub fn seed(&self, table: &str, primary_key: &str, rows: Vec<Row>) {
        let mut tables = self.tables.write();
        let storage = tables.entry(table.to_string()).or_default();
        for row in rows {
            if let Some(key) = row.get(primary_key) {
                storage.bump(key);
            }
            storage.rows.push(row);
        }
    }

    /// Every stored row of a table, soft-deleted ones included
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables
            .read()
            .get(table)
            .map(|storage| storage.rows.clone())
            .unwrap_or_default()
    }

    /// Errors describe the latest write only
    fn begin_write(&self) {
        self.last_error.write().clear();
    }

    fn fail(&self, code: &str, message: String) {
        debug!("Memory driver refused write: {}", message);
        let mut errors = self.last_error.write();
        errors.clear();
        errors.insert(code.to_string(), message);
    }

    fn select(&self, table: &str, conditions: &[WhereCondition], order: &[(String, OrderDirection)]) -> ModelResult<Vec<Row>> {
        ensure_evaluable(conditions)?;

        let tables = self.tables.read();
        let mut rows: Vec<Row> = tables
            .get(table)
            .map(|storage| {
                storage
                    .rows
                    .iter()
                    .filter(|row| conditions.iter().all(|c| c.matches(row)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        sort_rows(&mut rows, order);
        Ok(rows)
    }

    /// Apply `set` to every row matching `conditions`. Returns the number of
    /// rows touched, or `None` when a primary key change would collide.
    fn apply_update(
        &self,
        table: &str,
        primary_key: &str,
        conditions: &[WhereCondition],
        set: &Row,
    ) -> ModelResult<Option<u64>> {
        ensure_evaluable(conditions)?;

        let mut tables = self.tables.write();
        let storage = tables.entry(table.to_string()).or_default();

        let matched: Vec<usize> = storage
            .rows
            .iter()
            .enumerate()
            .filter(|(_, row)| conditions.iter().all(|c| c.matches(row)))
            .map(|(i, _)| i)
            .collect();

        if let Some(new_key) = set.get(primary_key) {
            let collides = storage.rows.iter().enumerate().any(|(i, row)| {
                !matched.contains(&i) && row.get(primary_key).map_or(false, |key| key.loose_eq(new_key))
            });
            if collides || matched.len() > 1 {
                drop(tables);
                self.fail(
                    "23505",
                    format!("Duplicate entry '{}' for key '{}.{}'", new_key, table, primary_key),
                );
                return Ok(None);
            }
        }

        for &i in &matched {
            for (column, value) in set.iter() {
                storage.rows[i].insert(column.clone(), value.clone());
            }
        }
        Ok(Some(matched.len() as u64))
    }

    fn insert_one(&self, ctx: &DriverContext<'_>, row: &Row) -> ModelResult<Option<PrimaryKey>> {
        let primary_key = ctx.primary_key();
        let mut tables = self.tables.write();
        let storage = tables.entry(ctx.table().to_string()).or_default();

        let mut row = row.clone();
        let key = match row.get(primary_key).filter(|value| !value.is_null()) {
            Some(value) => value.clone(),
            None if ctx.config.use_auto_increment => {
                let id = Value::Int(storage.next_id + 1);
                row.insert(primary_key, id.clone());
                id
            }
            None => return Err(DataError::EmptyPrimaryKey("insert".to_string()).into()),
        };

        if storage.position(primary_key, &key).is_some() {
            drop(tables);
            self.fail(
                "23505",
                format!("Duplicate entry '{}' for key '{}.{}'", key, ctx.table(), primary_key),
            );
            return Ok(None);
        }

        storage.bump(&key);
        storage.rows.push(row);
        Ok(PrimaryKey::from_value(&key).or(Some(PrimaryKey::Str(key.to_text()))))
    }

    fn remove_where(&self, table: &str, conditions: &[WhereCondition]) -> ModelResult<u64> {
        ensure_evaluable(conditions)?;

        let mut tables = self.tables.write();
        let Some(storage) = tables.get_mut(table) else {
            return Ok(0);
        };
        let before = storage.rows.len();
        storage.rows.retain(|row| !conditions.iter().all(|c| c.matches(row)));
        Ok((before - storage.rows.len()) as u64)
    }
}

#[async_trait]
impl ModelDriver for MemoryDriver {
    async fn do_find(&self, ctx: &DriverContext<'_>, ids: &[PrimaryKey]) -> ModelResult<Vec<Row>> {
        let mut conditions = ctx.read_conditions();
        if !ids.is_empty() {
            conditions.push(WhereCondition::for_keys(ctx.primary_key(), ids));
        }
        self.select(ctx.table(), &conditions, ctx.order_by)
    }

    async fn do_find_column(&self, ctx: &DriverContext<'_>, column: &str) -> ModelResult<Vec<Value>> {
        let rows = self.select(ctx.table(), &ctx.read_conditions(), ctx.order_by)?;
        Ok(rows.into_iter().filter_map(|mut row| row.remove(column)).collect())
    }

    async fn do_find_all(
        &self,
        ctx: &DriverContext<'_>,
        limit: Option<u64>,
        offset: u64,
    ) -> ModelResult<Vec<Row>> {
        let rows = self.select(ctx.table(), &ctx.read_conditions(), ctx.order_by)?;
        let rows = rows.into_iter().skip(offset as usize);
        Ok(match limit {
            Some(limit) => rows.take(limit as usize).collect(),
            None => rows.collect(),
        })
    }

    async fn do_first(&self, ctx: &DriverContext<'_>) -> ModelResult<Option<Row>> {
        let rows = self.select(ctx.table(), &ctx.read_conditions(), &ctx.first_order())?;
        Ok(rows.into_iter().next())
    }

    async fn do_insert(&self, ctx: &DriverContext<'_>, row: &Row) -> ModelResult<WriteOutcome> {
        self.begin_write();
        Ok(match self.insert_one(ctx, row)? {
            Some(id) => WriteOutcome::Inserted(id),
            None => WriteOutcome::Failed,
        })
    }

    async fn do_insert_batch(
        &self,
        ctx: &DriverContext<'_>,
        rows: &[Row],
        batch_size: usize,
        testing: bool,
    ) -> ModelResult<WriteOutcome> {
        self.begin_write();
        if testing {
            let statements = rows
                .chunks(batch_size.max(1))
                .map(|chunk| QueryBuilder::insert_batch(ctx.table(), chunk.to_vec()).to_sql())
                .collect::<ModelResult<Vec<_>>>()?;
            return Ok(WriteOutcome::Sql(statements.join(";\n")));
        }

        let mut affected = 0;
        for row in rows {
            match self.insert_one(ctx, row)? {
                Some(_) => affected += 1,
                None => return Ok(WriteOutcome::Failed),
            }
        }
        Ok(WriteOutcome::Affected(affected))
    }

    async fn do_update(&self, ctx: &DriverContext<'_>, ids: &[PrimaryKey], row: &Row) -> ModelResult<bool> {
        self.begin_write();
        let conditions = ctx.write_conditions(ids);
        QueryBuilder::update(ctx.table())
            .set_row(row)
            .where_all(&conditions)
            .to_sql()?;

        Ok(self
            .apply_update(ctx.table(), ctx.primary_key(), &conditions, row)?
            .is_some())
    }

    async fn do_update_batch(
        &self,
        ctx: &DriverContext<'_>,
        rows: &[Row],
        index: &str,
        batch_size: usize,
        return_sql: bool,
    ) -> ModelResult<WriteOutcome> {
        self.begin_write();
        let mut statements = Vec::new();
        for chunk in rows.chunks(batch_size.max(1)) {
            let sql = QueryBuilder::update_batch(ctx.table(), chunk.to_vec(), index)
                .where_all(ctx.constraints)
                .to_sql()?;
            statements.push(sql);
        }
        if return_sql {
            return Ok(WriteOutcome::Sql(statements.join(";\n")));
        }

        let mut affected = 0;
        for row in rows {
            let Some(key) = row.get(index) else {
                return Err(ModelError::missing_batch_index(index));
            };
            let mut conditions = ctx.constraints.to_vec();
            conditions.push(WhereCondition::eq(index, key.clone()));

            let mut set = row.clone();
            set.remove(index);
            match self.apply_update(ctx.table(), ctx.primary_key(), &conditions, &set)? {
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
        self.begin_write();
        let mut conditions = ctx.write_conditions(ids);

        if let Some(set) = ctx.soft_delete_set(purge) {
            QueryBuilder::update(ctx.table())
                .set_row(&set)
                .where_all(&conditions)
                .to_sql()?;
            if let Some(deleted) = ctx.config.deleted_column() {
                conditions.push(WhereCondition::null(deleted));
            }
            return Ok(match self.apply_update(ctx.table(), ctx.primary_key(), &conditions, &set)? {
                Some(n) => WriteOutcome::Affected(n),
                None => WriteOutcome::Failed,
            });
        }

        QueryBuilder::delete_from(ctx.table()).where_all(&conditions).to_sql()?;
        Ok(WriteOutcome::Affected(self.remove_where(ctx.table(), &conditions)?))
    }

    async fn do_purge_deleted(&self, ctx: &DriverContext<'_>) -> ModelResult<WriteOutcome> {
        self.begin_write();
        let Some(deleted) = ctx.config.deleted_column() else {
            return Ok(WriteOutcome::Done);
        };
        let conditions = vec![WhereCondition::not_null(deleted)];
        Ok(WriteOutcome::Affected(self.remove_where(ctx.table(), &conditions)?))
    }

    async fn do_replace(
        &self,
        ctx: &DriverContext<'_>,
        row: &Row,
        return_sql: bool,
    ) -> ModelResult<WriteOutcome> {
        self.begin_write();
        if return_sql {
            let sql = QueryBuilder::upsert(ctx.table(), ctx.primary_key())
                .set_row(row)
                .to_sql()?;
            return Ok(WriteOutcome::Sql(sql));
        }

        let primary_key = ctx.primary_key();
        let existing = row.get(primary_key).filter(|value| !value.is_null()).and_then(|key| {
            self.tables
                .read()
                .get(ctx.table())
                .and_then(|storage| storage.position(primary_key, key))
        });

        if existing.is_some() {
            let mut conditions = Vec::new();
            if let Some(key) = row.get(primary_key) {
                conditions.push(WhereCondition::eq(primary_key, key.clone()));
            }
            return Ok(match self.apply_update(ctx.table(), primary_key, &conditions, row)? {
                Some(n) => WriteOutcome::Affected(n),
                None => WriteOutcome::Failed,
            });
        }

        Ok(match self.insert_one(ctx, row)? {
            Some(_) => WriteOutcome::Affected(1),
            None => WriteOutcome::Failed,
        })
    }

    async fn do_count_all_results(&self, ctx: &DriverContext<'_>) -> ModelResult<u64> {
        Ok(self.select(ctx.table(), &ctx.read_conditions(), &[])?.len() as u64)
    }

    fn do_errors(&self) -> BTreeMap<String, String> {
        self.last_error.read().clone()
    }
}

fn ensure_evaluable(conditions: &[WhereCondition]) -> ModelResult<()> {
    match conditions.iter().find(|c| c.is_raw()) {
        Some(condition) => Err(ModelError::Database(format!(
            "Raw SQL cannot be evaluated in memory: {}",
            condition.raw.as_deref().unwrap_or_default()
        ))),
        None => Ok(()),
    }
}

/// Sort like PostgreSQL: nulls last ascending, first descending
fn sort_rows(rows: &mut [Row], order: &[(String, OrderDirection)]) {
    if order.is_empty() {
        return;
    }
    let null = Value::Null;
    rows.sort_by(|a, b| {
        for (column, direction) in order {
            let left = a.get(column).unwrap_or(&null);
            let right = b.get(column).unwrap_or(&null);
            let ordering = match (left.is_null(), right.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => left.loose_cmp(right).unwrap_or(Ordering::Equal),
            };
            let ordering = match direction {
                OrderDirection::Asc => ordering,
                OrderDirection::Desc => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::SoftDeleteMode;
    use crate::model::config::ModelConfig;
    use crate::row;

    fn context(config: &ModelConfig) -> DriverContext<'_> {
        DriverContext {
            config,
            soft_deletes: SoftDeleteMode::Exclude,
            constraints: &[],
            order_by: &[],
            now: Value::from("2024-01-01 00:00:00"),
        }
    }

    #[tokio::test]
    async fn test_auto_increment_and_duplicates() {
        let driver = MemoryDriver::new();
        let config = ModelConfig::new("users");
        let ctx = context(&config);

        let first = driver.do_insert(&ctx, &row! { "name" => "a" }).await.unwrap();
        assert_eq!(first, WriteOutcome::Inserted(PrimaryKey::Int(1)));

        let second = driver.do_insert(&ctx, &row! { "id" => 7, "name" => "b" }).await.unwrap();
        assert_eq!(second, WriteOutcome::Inserted(PrimaryKey::Int(7)));

        let third = driver.do_insert(&ctx, &row! { "name" => "c" }).await.unwrap();
        assert_eq!(third, WriteOutcome::Inserted(PrimaryKey::Int(8)));

        let duplicate = driver.do_insert(&ctx, &row! { "id" => 7 }).await.unwrap();
        assert_eq!(duplicate, WriteOutcome::Failed);
        assert!(driver.do_errors().contains_key("23505"));
    }

    #[tokio::test]
    async fn test_soft_delete_marks_rows() {
        let driver = MemoryDriver::new();
        let config = ModelConfig::new("users").soft_deletes(true);
        driver.seed("users", "id", vec![row! { "id" => 1, "deleted_at" => Value::Null }]);
        let ctx = context(&config);

        let outcome = driver.do_delete(&ctx, &[PrimaryKey::Int(1)], false).await.unwrap();
        assert_eq!(outcome, WriteOutcome::Affected(1));
        assert!(driver.do_find(&ctx, &[]).await.unwrap().is_empty());
        assert_eq!(driver.rows("users").len(), 1);

        let purged = driver.do_purge_deleted(&ctx).await.unwrap();
        assert_eq!(purged, WriteOutcome::Affected(1));
        assert!(driver.rows("users").is_empty());
    }

    #[tokio::test]
    async fn test_raw_conditions_are_refused() {
        let driver = MemoryDriver::new();
        let config = ModelConfig::new("users");
        let constraints = vec![WhereCondition::raw("id > 3")];
        let ctx = DriverContext {
            constraints: &constraints,
            ..context(&config)
        };

        let err = driver.do_find_all(&ctx, None, 0).await.unwrap_err();
        assert!(matches!(err, ModelError::Database(_)));
    }

    #[test]
    fn test_sort_rows_nulls_last() {
        let mut rows = vec![
            row! { "n" => Value::Null },
            row! { "n" => 2 },
            row! { "n" => 1 },
        ];
        sort_rows(&mut rows, &[("n".to_string(), OrderDirection::Asc)]);
        assert_eq!(rows[0].get("n"), Some(&Value::Int(1)));
        assert_eq!(rows[2].get("n"), Some(&Value::Null));
    }
}
