//! Per-call options
//!
//! A [`Scope`] borrows the model, collects options and query constraints,
//! and is consumed by its terminal call. The model's own configuration is
//! never touched, so the next call starts from the declared defaults again.

use crate::driver::{SoftDeleteMode, WriteOutcome};
use crate::error::{ModelError, ModelResult};
use crate::query::{OrderDirection, QueryOperator, WhereCondition};
use crate::value::{Row, Value};

use super::base::BaseModel;
use super::config::ModelConfig;
use super::entity::{FromFields, Record};
use super::pager::Pager;
use super::primary_key::{validate_id, IdArg, PrimaryKey};

/// Options of a single call
#[derive(Debug, Clone, PartialEq)]
pub struct ScopeState {
    pub soft_deletes: SoftDeleteMode,
    pub allow_callbacks: bool,
    pub constraints: Vec<WhereCondition>,
    pub order_by: Vec<(String, OrderDirection)>,
}

impl ScopeState {
    /// The model's declared defaults
    pub fn new(config: &ModelConfig) -> Self {
        Self {
            soft_deletes: SoftDeleteMode::Exclude,
            allow_callbacks: config.allow_callbacks,
            constraints: Vec::new(),
            order_by: Vec::new(),
        }
    }
}

/// A model call under construction
#[derive(Debug)]
pub struct Scope<'m> {
    model: &'m mut BaseModel,
    state: ScopeState,
    invalid: Option<String>,
}

impl<'m> Scope<'m> {
    pub(crate) fn new(model: &'m mut BaseModel) -> Self {
        let state = model.default_state();
        Self {
            model,
            state,
            invalid: None,
        }
    }

    pub fn state(&self) -> &ScopeState {
        &self.state
    }

    pub fn with_deleted(mut self, with_deleted: bool) -> Self {
        self.state.soft_deletes = if with_deleted {
            SoftDeleteMode::Include
        } else {
            SoftDeleteMode::Exclude
        };
        self
    }

    pub fn only_deleted(mut self) -> Self {
        self.state.soft_deletes = SoftDeleteMode::Only;
        self
    }

    pub fn allow_callbacks(mut self, allow: bool) -> Self {
        self.state.allow_callbacks = allow;
        self
    }

    pub fn where_condition(mut self, condition: WhereCondition) -> Self {
        self.state.constraints.push(condition);
        self
    }

    pub fn where_eq<T: Into<Value>>(self, column: &str, value: T) -> Self {
        self.where_condition(WhereCondition::eq(column, value))
    }

    /// Constraint with a textual operator (`=`, `<>`, `>`, `LIKE`, ...).
    /// An unknown operator makes the terminal call fail.
    pub fn where_op<T: Into<Value>>(mut self, column: &str, operator: &str, value: T) -> Self {
        match QueryOperator::parse(operator) {
            Some(parsed) => self.where_condition(WhereCondition::new(column, parsed, vec![value.into()])),
            None => {
                if self.invalid.is_none() {
                    self.invalid = Some(format!("Unknown operator \"{}\" for column {}", operator, column));
                }
                self
            }
        }
    }

    pub fn where_in<T: Into<Value>>(self, column: &str, values: Vec<T>) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.where_condition(WhereCondition::in_list(column, values))
    }

    pub fn where_null(self, column: &str) -> Self {
        self.where_condition(WhereCondition::null(column))
    }

    pub fn where_not_null(self, column: &str) -> Self {
        self.where_condition(WhereCondition::not_null(column))
    }

    pub fn where_like(self, column: &str, pattern: &str) -> Self {
        self.where_condition(WhereCondition::new(column, QueryOperator::Like, vec![pattern.into()]))
    }

    /// Raw SQL constraint; only drivers that speak SQL can honour it
    pub fn where_raw(self, sql: &str) -> Self {
        self.where_condition(WhereCondition::raw(sql))
    }

    pub fn order_by(mut self, column: &str, direction: OrderDirection) -> Self {
        self.state.order_by.push((column.to_string(), direction));
        self
    }

    // Terminal calls

    fn check(&self) -> ModelResult<()> {
        match &self.invalid {
            Some(message) => Err(ModelError::invalid_argument(message.clone())),
            None => Ok(()),
        }
    }

    pub async fn find(self, id: impl Into<PrimaryKey>) -> ModelResult<Option<Row>> {
        self.check()?;
        self.model.find_with(&self.state, id.into()).await
    }

    pub async fn find_many(self, ids: Vec<PrimaryKey>) -> ModelResult<Vec<Row>> {
        self.check()?;
        self.model.find_many_with(&self.state, ids).await
    }

    pub async fn find_all(self, limit: Option<u64>, offset: u64) -> ModelResult<Vec<Row>> {
        self.check()?;
        self.model.find_all_with(&self.state, limit, offset).await
    }

    pub async fn first(self) -> ModelResult<Option<Row>> {
        self.check()?;
        self.model.first_with(&self.state).await
    }

    pub async fn find_column(self, column: &str) -> ModelResult<Option<Vec<Value>>> {
        self.check()?;
        self.model.find_column_with(&self.state, column).await
    }

    pub async fn find_as<E: FromFields>(self, id: impl Into<PrimaryKey>) -> ModelResult<Option<E>> {
        self.find(id).await?.map(|row| E::from_fields(&row)).transpose()
    }

    pub async fn find_all_as<E: FromFields>(self, limit: Option<u64>, offset: u64) -> ModelResult<Vec<E>> {
        self.find_all(limit, offset)
            .await?
            .iter()
            .map(E::from_fields)
            .collect()
    }

    pub async fn first_as<E: FromFields>(self) -> ModelResult<Option<E>> {
        self.first().await?.map(|row| E::from_fields(&row)).transpose()
    }

    pub async fn count_all_results(self) -> ModelResult<u64> {
        self.check()?;
        self.model.count_with(&self.state).await
    }

    pub async fn chunk<F>(self, size: u64, f: F) -> ModelResult<()>
    where
        F: FnMut(Row) -> bool,
    {
        self.check()?;
        self.model.chunk_with(&self.state, size, f).await
    }

    pub async fn paginate(self, per_page: Option<u64>, page: u64) -> ModelResult<(Vec<Row>, Pager)> {
        self.check()?;
        self.model.paginate_with(&self.state, per_page, page).await
    }

    pub async fn insert<'r>(self, record: impl Into<Record<'r>>, return_id: bool) -> ModelResult<WriteOutcome> {
        self.check()?;
        self.model.insert_with(&self.state, record.into(), return_id).await
    }

    pub async fn insert_batch<'r, I>(self, records: I, batch_size: usize, testing: bool) -> ModelResult<WriteOutcome>
    where
        I: IntoIterator,
        I::Item: Into<Record<'r>>,
    {
        self.check()?;
        let records = records.into_iter().map(Into::into).collect();
        self.model
            .insert_batch_with(&self.state, records, batch_size, testing)
            .await
    }

    pub async fn update<'r>(self, id: impl Into<IdArg>, record: impl Into<Record<'r>>) -> ModelResult<bool> {
        self.check()?;
        let ids = validate_id(&id.into())?;
        self.model.update_with(&self.state, ids, record.into()).await
    }

    /// Update every row matching the scope's constraints. Without
    /// constraints the driver refuses the statement.
    pub async fn update_where<'r>(self, record: impl Into<Record<'r>>) -> ModelResult<bool> {
        self.check()?;
        self.model.update_with(&self.state, Vec::new(), record.into()).await
    }

    pub async fn update_batch<'r, I>(
        self,
        records: I,
        index: &str,
        batch_size: usize,
        return_sql: bool,
    ) -> ModelResult<WriteOutcome>
    where
        I: IntoIterator,
        I::Item: Into<Record<'r>>,
    {
        self.check()?;
        let records = records.into_iter().map(Into::into).collect();
        self.model
            .update_batch_with(&self.state, records, index, batch_size, return_sql)
            .await
    }

    pub async fn delete(self, id: impl Into<IdArg>, purge: bool) -> ModelResult<WriteOutcome> {
        self.check()?;
        let ids = validate_id(&id.into())?;
        self.model.delete_with(&self.state, ids, purge).await
    }

    /// Delete every row matching the scope's constraints. Without
    /// constraints the driver refuses the statement.
    pub async fn delete_where(self, purge: bool) -> ModelResult<WriteOutcome> {
        self.check()?;
        self.model.delete_with(&self.state, Vec::new(), purge).await
    }

    pub async fn save<'r>(self, record: impl Into<Record<'r>>) -> ModelResult<bool> {
        self.check()?;
        self.model.save_with(&self.state, record.into()).await
    }
}
