//! Storage drivers
//!
//! `BaseModel` never talks to storage directly. It prepares rows and ids and
//! hands them to a [`ModelDriver`] together with a [`DriverContext`]
//! describing the call: model configuration, soft-delete mode, scope
//! constraints, ordering and the current date.

pub mod memory;
pub mod postgres;

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::ModelResult;
use crate::model::config::ModelConfig;
use crate::model::primary_key::PrimaryKey;
use crate::query::{OrderDirection, WhereCondition};
use crate::value::{Row, Value};

pub use memory::MemoryDriver;
pub use postgres::PostgresDriver;

/// Which rows reads see when soft deletes are enabled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SoftDeleteMode {
    /// Only rows that are not soft-deleted
    #[default]
    Exclude,
    /// Every row
    Include,
    /// Only soft-deleted rows
    Only,
}

/// Per-call context handed to every driver method
#[derive(Debug, Clone)]
pub struct DriverContext<'a> {
    pub config: &'a ModelConfig,
    pub soft_deletes: SoftDeleteMode,
    pub constraints: &'a [WhereCondition],
    pub order_by: &'a [(String, OrderDirection)],
    /// Current date rendered in the model's date format
    pub now: Value,
}

impl<'a> DriverContext<'a> {
    pub fn table(&self) -> &str {
        &self.config.table
    }

    pub fn primary_key(&self) -> &str {
        &self.config.primary_key
    }

    /// Scope constraints plus the soft-delete filter, for reads
    pub fn read_conditions(&self) -> Vec<WhereCondition> {
        let mut conditions = self.constraints.to_vec();
        if let Some(deleted) = self.config.deleted_column() {
            match self.soft_deletes {
                SoftDeleteMode::Exclude => conditions.push(WhereCondition::null(deleted)),
                SoftDeleteMode::Only => conditions.push(WhereCondition::not_null(deleted)),
                SoftDeleteMode::Include => {}
            }
        }
        conditions
    }

    /// Scope constraints plus a key condition, for writes by id
    pub fn write_conditions(&self, ids: &[PrimaryKey]) -> Vec<WhereCondition> {
        let mut conditions = self.constraints.to_vec();
        if !ids.is_empty() {
            conditions.push(WhereCondition::for_keys(self.primary_key(), ids));
        }
        conditions
    }

    /// Columns to set when a delete becomes a soft delete, or `None` for a
    /// hard delete
    pub fn soft_delete_set(&self, purge: bool) -> Option<Row> {
        if purge {
            return None;
        }
        let deleted = self.config.deleted_column()?;

        let mut set = Row::new();
        set.insert(deleted, self.now.clone());
        if let Some(updated) = self.config.updated_column() {
            set.insert(updated, self.now.clone());
        }
        Some(set)
    }

    /// Ordering for `first()`: the scope's, or primary key ascending
    pub fn first_order(&self) -> Vec<(String, OrderDirection)> {
        if self.order_by.is_empty() {
            vec![(self.primary_key().to_string(), OrderDirection::Asc)]
        } else {
            self.order_by.to_vec()
        }
    }
}

/// Result of a driver write
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    /// Validation failed, nothing reached the driver
    Rejected,
    /// The driver refused the write; see `errors()`
    Failed,
    Done,
    Inserted(PrimaryKey),
    Affected(u64),
    /// Test mode: the statement that would have run
    Sql(String),
}

impl WriteOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, WriteOutcome::Rejected | WriteOutcome::Failed)
    }

    pub fn insert_id(&self) -> Option<&PrimaryKey> {
        match self {
            WriteOutcome::Inserted(id) => Some(id),
            _ => None,
        }
    }

    pub fn affected(&self) -> Option<u64> {
        match self {
            WriteOutcome::Affected(n) => Some(*n),
            _ => None,
        }
    }

    pub fn sql(&self) -> Option<&str> {
        match self {
            WriteOutcome::Sql(sql) => Some(sql),
            _ => None,
        }
    }
}

/// Storage operations a model delegates to
///
/// Constraint violations (duplicate keys and the like) are reported as
/// `WriteOutcome::Failed` or `false` with the details kept for
/// [`ModelDriver::do_errors`]. Anything else is an error.
#[async_trait]
pub trait ModelDriver: Send + Sync {
    /// Rows matching `ids`, or every visible row when `ids` is empty
    async fn do_find(&self, ctx: &DriverContext<'_>, ids: &[PrimaryKey]) -> ModelResult<Vec<Row>>;

    /// Values of one column over the visible rows
    async fn do_find_column(&self, ctx: &DriverContext<'_>, column: &str) -> ModelResult<Vec<Value>>;

    /// Visible rows; `limit = None` means no limit
    async fn do_find_all(
        &self,
        ctx: &DriverContext<'_>,
        limit: Option<u64>,
        offset: u64,
    ) -> ModelResult<Vec<Row>>;

    async fn do_first(&self, ctx: &DriverContext<'_>) -> ModelResult<Option<Row>>;

    /// Insert one row. Success is `Inserted(id)`.
    async fn do_insert(&self, ctx: &DriverContext<'_>, row: &Row) -> ModelResult<WriteOutcome>;

    /// Insert rows in chunks of `batch_size`. With `testing` the SQL is
    /// returned and nothing runs.
    async fn do_insert_batch(
        &self,
        ctx: &DriverContext<'_>,
        rows: &[Row],
        batch_size: usize,
        testing: bool,
    ) -> ModelResult<WriteOutcome>;

    /// Update rows by `ids`, or by the scope constraints when `ids` is empty
    async fn do_update(&self, ctx: &DriverContext<'_>, ids: &[PrimaryKey], row: &Row) -> ModelResult<bool>;

    /// Update rows matched on the `index` column, in chunks of `batch_size`
    async fn do_update_batch(
        &self,
        ctx: &DriverContext<'_>,
        rows: &[Row],
        index: &str,
        batch_size: usize,
        return_sql: bool,
    ) -> ModelResult<WriteOutcome>;

    /// Delete by `ids` (or scope constraints). Soft deletes mark rows
    /// unless `purge` is set.
    async fn do_delete(
        &self,
        ctx: &DriverContext<'_>,
        ids: &[PrimaryKey],
        purge: bool,
    ) -> ModelResult<WriteOutcome>;

    /// Hard delete every soft-deleted row
    async fn do_purge_deleted(&self, ctx: &DriverContext<'_>) -> ModelResult<WriteOutcome>;

    /// Insert, or update the row with the same primary key
    async fn do_replace(
        &self,
        ctx: &DriverContext<'_>,
        row: &Row,
        return_sql: bool,
    ) -> ModelResult<WriteOutcome>;

    async fn do_count_all_results(&self, ctx: &DriverContext<'_>) -> ModelResult<u64>;

    /// Last storage error, `source => message`
    fn do_errors(&self) -> BTreeMap<String, String>;
}
