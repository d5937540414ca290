//! BaseModel - lifecycle orchestration over a storage driver
//!
//! Every public operation follows the same shape: normalize the input to a
//! [`Row`], validate, apply the allow-list, stamp timestamps, fire the
//! `before*` callbacks, delegate to the [`ModelDriver`], fire the `after*`
//! callbacks. Per-call options (soft-delete visibility, callbacks on/off,
//! query constraints) come from a [`ScopeState`], so nothing has to be
//! reset after a call.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Timelike, Utc};
use tabula_validation::{MessageSet, RuleSet, ValidationService, Validator};
use tracing::{debug, warn};

use super::config::{DateFormat, ModelConfig, ValidationRules};
use super::entity::{FromFields, Record};
use super::pager::{Pager, DEFAULT_PER_PAGE};
use super::primary_key::{validate_id, IdArg, PrimaryKey};
use super::scope::{Scope, ScopeState};
use crate::converter::DataConverter;
use crate::driver::{DriverContext, ModelDriver, WriteOutcome};
use crate::error::{DataError, ModelError, ModelResult};
use crate::events::{CallbackRegistry, EventData, EventPayload, ModelEvent};
use crate::value::{Row, Value};

/// Source of the current time
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Which configured validation rules to return
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RuleFilter {
    #[default]
    All,
    Only(Vec<String>),
    Except(Vec<String>),
}

/// A model bound to one table
pub struct BaseModel {
    config: ModelConfig,
    driver: Arc<dyn ModelDriver>,
    validator: Box<dyn ValidationService>,
    callbacks: CallbackRegistry,
    converter: DataConverter,
    clock: Clock,
    insert_id: Option<PrimaryKey>,
}

impl fmt::Debug for BaseModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BaseModel")
            .field("config", &self.config)
            .field("callbacks", &self.callbacks)
            .field("insert_id", &self.insert_id)
            .finish_non_exhaustive()
    }
}

impl BaseModel {
    /// Create a model. The configuration and its cast map are checked here.
    pub fn new(config: ModelConfig, driver: Arc<dyn ModelDriver>) -> ModelResult<Self> {
        config.validate()?;
        let converter = DataConverter::new(&config.casts)?;

        Ok(Self {
            config,
            driver,
            validator: Box::new(Validator::new()),
            callbacks: CallbackRegistry::new(),
            converter,
            clock: Arc::new(Utc::now),
            insert_id: None,
        })
    }

    pub fn with_validator<V: ValidationService + 'static>(mut self, validator: V) -> Self {
        self.validator = Box::new(validator);
        self
    }

    pub fn with_callbacks(mut self, callbacks: CallbackRegistry) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Replace the clock used for timestamps and soft deletes
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    /// Register a callback under the name used in the configuration
    pub fn register_callback<F>(&mut self, name: impl Into<String>, callback: F) -> &mut Self
    where
        F: Fn(EventPayload) -> ModelResult<EventPayload> + Send + Sync + 'static,
    {
        self.callbacks.register(name, callback);
        self
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn driver(&self) -> &Arc<dyn ModelDriver> {
        &self.driver
    }

    pub fn validator(&self) -> &dyn ValidationService {
        self.validator.as_ref()
    }

    /// Start a call with per-call options
    pub fn scope(&mut self) -> Scope<'_> {
        Scope::new(self)
    }

    /// Include soft-deleted rows in the next call (or not)
    pub fn with_deleted(&mut self, with_deleted: bool) -> Scope<'_> {
        self.scope().with_deleted(with_deleted)
    }

    /// Only soft-deleted rows in the next call
    pub fn only_deleted(&mut self) -> Scope<'_> {
        self.scope().only_deleted()
    }

    /// Enable or disable callbacks for the next call
    pub fn allow_callbacks(&mut self, allow: bool) -> Scope<'_> {
        self.scope().allow_callbacks(allow)
    }

    pub(crate) fn default_state(&self) -> ScopeState {
        ScopeState::new(&self.config)
    }

    // ---------------------------------------------------------------------
    // Finders
    // ---------------------------------------------------------------------

    /// Find one row by primary key
    pub async fn find(&self, id: impl Into<PrimaryKey>) -> ModelResult<Option<Row>> {
        self.find_with(&self.default_state(), id.into()).await
    }

    /// Find every row whose primary key is in `ids`
    pub async fn find_many(&self, ids: Vec<PrimaryKey>) -> ModelResult<Vec<Row>> {
        self.find_many_with(&self.default_state(), ids).await
    }

    /// All visible rows. `None` means no limit, as does `Some(0)` while
    /// `limit_zero_as_all` is on.
    pub async fn find_all(&self, limit: Option<u64>, offset: u64) -> ModelResult<Vec<Row>> {
        self.find_all_with(&self.default_state(), limit, offset).await
    }

    pub async fn first(&self) -> ModelResult<Option<Row>> {
        self.first_with(&self.default_state()).await
    }

    /// Values of a single column, `None` when nothing matched
    pub async fn find_column(&self, column: &str) -> ModelResult<Option<Vec<Value>>> {
        self.find_column_with(&self.default_state(), column).await
    }

    pub async fn find_as<E: FromFields>(&self, id: impl Into<PrimaryKey>) -> ModelResult<Option<E>> {
        self.find(id).await?.map(|row| E::from_fields(&row)).transpose()
    }

    pub async fn find_all_as<E: FromFields>(&self, limit: Option<u64>, offset: u64) -> ModelResult<Vec<E>> {
        hydrate(self.find_all(limit, offset).await?)
    }

    pub async fn first_as<E: FromFields>(&self) -> ModelResult<Option<E>> {
        self.first().await?.map(|row| E::from_fields(&row)).transpose()
    }

    pub async fn count_all_results(&self) -> ModelResult<u64> {
        self.count_with(&self.default_state()).await
    }

    /// Walk every visible row in chunks of `size`; stop when `f` returns false
    pub async fn chunk<F>(&self, size: u64, f: F) -> ModelResult<()>
    where
        F: FnMut(Row) -> bool,
    {
        self.chunk_with(&self.default_state(), size, f).await
    }

    /// One page of rows plus its [`Pager`]
    pub async fn paginate(&self, per_page: Option<u64>, page: u64) -> ModelResult<(Vec<Row>, Pager)> {
        self.paginate_with(&self.default_state(), per_page, page).await
    }

    pub(crate) async fn find_with(&self, state: &ScopeState, id: PrimaryKey) -> ModelResult<Option<Row>> {
        let ids = vec![id];
        let before = EventPayload::new(ModelEvent::BeforeFind, "find", EventData::None)
            .with_ids(ids.clone())
            .singleton(true);
        let before = self.trigger(state, before).await?;
        if before.return_data {
            return Ok(before.data.into_row());
        }

        debug!("Finding {} by primary key", self.config.table);
        let rows = {
            let ctx = self.context(state);
            self.driver.do_find(&ctx, &ids).await?
        };
        let row = self.from_storage(rows)?.into_iter().next();

        let data = row.map_or(EventData::None, EventData::Row);
        let after = before.into_event(ModelEvent::AfterFind);
        let after = self.trigger(state, EventPayload { data, ..after }).await?;
        Ok(after.data.into_row())
    }

    pub(crate) async fn find_many_with(&self, state: &ScopeState, ids: Vec<PrimaryKey>) -> ModelResult<Vec<Row>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let before = EventPayload::new(ModelEvent::BeforeFind, "find", EventData::None).with_ids(ids.clone());
        let before = self.trigger(state, before).await?;
        if before.return_data {
            return Ok(before.data.into_rows());
        }

        debug!("Finding {} rows of {}", ids.len(), self.config.table);
        let rows = {
            let ctx = self.context(state);
            self.driver.do_find(&ctx, &ids).await?
        };
        let rows = self.from_storage(rows)?;

        let after = before.into_event(ModelEvent::AfterFind);
        let after = self
            .trigger(state, EventPayload { data: EventData::Rows(rows), ..after })
            .await?;
        Ok(after.data.into_rows())
    }

    pub(crate) async fn find_all_with(
        &self,
        state: &ScopeState,
        limit: Option<u64>,
        offset: u64,
    ) -> ModelResult<Vec<Row>> {
        let limit = match limit {
            Some(0) if self.config.features.limit_zero_as_all => None,
            other => other,
        };

        let before = EventPayload::new(ModelEvent::BeforeFind, "findAll", EventData::None).with_limit(limit, offset);
        let before = self.trigger(state, before).await?;
        if before.return_data {
            return Ok(before.data.into_rows());
        }

        debug!("Finding all rows of {} (limit {:?}, offset {})", self.config.table, limit, offset);
        let rows = {
            let ctx = self.context(state);
            self.driver.do_find_all(&ctx, limit, offset).await?
        };
        let rows = self.from_storage(rows)?;

        let after = before.into_event(ModelEvent::AfterFind);
        let after = self
            .trigger(state, EventPayload { data: EventData::Rows(rows), ..after })
            .await?;
        Ok(after.data.into_rows())
    }

    pub(crate) async fn first_with(&self, state: &ScopeState) -> ModelResult<Option<Row>> {
        let before = EventPayload::new(ModelEvent::BeforeFind, "first", EventData::None).singleton(true);
        let before = self.trigger(state, before).await?;
        if before.return_data {
            return Ok(before.data.into_row());
        }

        let row = {
            let ctx = self.context(state);
            self.driver.do_first(&ctx).await?
        };
        let row = self.from_storage(row.into_iter().collect())?.into_iter().next();

        let data = row.map_or(EventData::None, EventData::Row);
        let after = before.into_event(ModelEvent::AfterFind);
        let after = self.trigger(state, EventPayload { data, ..after }).await?;
        Ok(after.data.into_row())
    }

    pub(crate) async fn find_column_with(&self, state: &ScopeState, column: &str) -> ModelResult<Option<Vec<Value>>> {
        if column.contains(',') {
            return Err(DataError::FindColumnHaveMultipleColumns.into());
        }

        let values = {
            let ctx = self.context(state);
            self.driver.do_find_column(&ctx, column).await?
        };
        if values.is_empty() {
            return Ok(None);
        }

        if self.converter.is_empty() {
            return Ok(Some(values));
        }
        let mut converted = Vec::with_capacity(values.len());
        for value in values {
            let mut row = Row::new();
            row.insert(column, value);
            let mut row = self.converter.from_data_source(row)?;
            converted.push(row.remove(column).unwrap_or_default());
        }
        Ok(Some(converted))
    }

    pub(crate) async fn count_with(&self, state: &ScopeState) -> ModelResult<u64> {
        let ctx = self.context(state);
        self.driver.do_count_all_results(&ctx).await
    }

    pub(crate) async fn chunk_with<F>(&self, state: &ScopeState, size: u64, mut f: F) -> ModelResult<()>
    where
        F: FnMut(Row) -> bool,
    {
        if size == 0 {
            return Err(ModelError::invalid_argument("Chunk size must be greater than zero."));
        }

        let total = self.count_with(state).await?;
        let mut offset = 0;
        while offset < total {
            let rows = {
                let ctx = self.context(state);
                self.driver.do_find_all(&ctx, Some(size), offset).await?
            };
            offset += size;

            for row in self.from_storage(rows)? {
                if !f(row) {
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    pub(crate) async fn paginate_with(
        &self,
        state: &ScopeState,
        per_page: Option<u64>,
        page: u64,
    ) -> ModelResult<(Vec<Row>, Pager)> {
        let total = self.count_with(state).await?;
        let pager = Pager::new(page, per_page.unwrap_or(DEFAULT_PER_PAGE), total);
        let rows = self
            .find_all_with(state, Some(pager.per_page()), pager.offset())
            .await?;
        Ok((rows, pager))
    }

    // ---------------------------------------------------------------------
    // Writes
    // ---------------------------------------------------------------------

    /// Insert a record.
    ///
    /// Returns `Inserted(id)` when `return_id` is set, `Done` otherwise,
    /// `Rejected` when validation fails and `Failed` when the driver refuses.
    pub async fn insert<'r>(&mut self, record: impl Into<Record<'r>>, return_id: bool) -> ModelResult<WriteOutcome> {
        let state = self.default_state();
        self.insert_with(&state, record.into(), return_id).await
    }

    /// Insert many records in chunks of `batch_size`
    pub async fn insert_batch<'r, I>(&mut self, records: I, batch_size: usize, testing: bool) -> ModelResult<WriteOutcome>
    where
        I: IntoIterator,
        I::Item: Into<Record<'r>>,
    {
        let state = self.default_state();
        let records = records.into_iter().map(Into::into).collect();
        self.insert_batch_with(&state, records, batch_size, testing).await
    }

    /// Update the rows identified by `id`. Returns false when validation fails.
    pub async fn update<'r>(&mut self, id: impl Into<IdArg>, record: impl Into<Record<'r>>) -> ModelResult<bool> {
        let ids = validate_id(&id.into())?;
        let state = self.default_state();
        self.update_with(&state, ids, record.into()).await
    }

    /// Update many records matched on the `index` column
    pub async fn update_batch<'r, I>(
        &mut self,
        records: I,
        index: &str,
        batch_size: usize,
        return_sql: bool,
    ) -> ModelResult<WriteOutcome>
    where
        I: IntoIterator,
        I::Item: Into<Record<'r>>,
    {
        let state = self.default_state();
        let records = records.into_iter().map(Into::into).collect();
        self.update_batch_with(&state, records, index, batch_size, return_sql)
            .await
    }

    /// Delete the rows identified by `id`; `purge` skips soft deletes
    pub async fn delete(&mut self, id: impl Into<IdArg>, purge: bool) -> ModelResult<WriteOutcome> {
        let ids = validate_id(&id.into())?;
        let state = self.default_state();
        self.delete_with(&state, ids, purge).await
    }

    /// Insert or update depending on whether the record carries a primary key
    pub async fn save<'r>(&mut self, record: impl Into<Record<'r>>) -> ModelResult<bool> {
        let state = self.default_state();
        self.save_with(&state, record.into()).await
    }

    /// Insert, or overwrite the row with the same primary key
    pub async fn replace<'r>(&mut self, record: impl Into<Record<'r>>, return_sql: bool) -> ModelResult<WriteOutcome> {
        let row = self.normalize(record.into())?;
        if !row.is_empty() {
            let clean = self.config.clean_validation_rules;
            if !self.validate_with(&row, clean).await? {
                warn!("Replace into {} rejected by validation", self.config.table);
                return Ok(WriteOutcome::Rejected);
            }
        }

        let state = self.default_state();
        let ctx = self.context(&state);
        self.driver.do_replace(&ctx, &row, return_sql).await
    }

    /// Hard delete every soft-deleted row. Without soft deletes this does
    /// nothing and returns `Done`.
    pub async fn purge_deleted(&mut self) -> ModelResult<WriteOutcome> {
        if !self.config.use_soft_deletes {
            return Ok(WriteOutcome::Done);
        }

        debug!("Purging soft-deleted rows of {}", self.config.table);
        let state = self.default_state();
        let ctx = self.context(&state);
        self.driver.do_purge_deleted(&ctx).await
    }

    pub(crate) async fn insert_with(
        &mut self,
        state: &ScopeState,
        record: Record<'_>,
        return_id: bool,
    ) -> ModelResult<WriteOutcome> {
        self.insert_id = None;

        let row = self.transform(record, "insert", self.config.allow_empty_inserts)?;

        if !self.validate_with(&row, false).await? {
            warn!("Insert into {} rejected by validation", self.config.table);
            return Ok(WriteOutcome::Rejected);
        }

        let mut row = self.protect_fields_for_insert(row)?;
        if row.is_empty() && !self.config.allow_empty_inserts {
            return Err(DataError::empty_dataset("insert").into());
        }
        if !self.config.use_auto_increment && self.get_id_value(&row).is_none() {
            return Err(DataError::EmptyPrimaryKey("insert".to_string()).into());
        }

        let date = self.set_date(None);
        self.stamp_created(&mut row, &date);

        let before = EventPayload::new(ModelEvent::BeforeInsert, "insert", EventData::Row(row));
        let before = self.trigger(state, before).await?;
        let row = before.data.into_row().unwrap_or_default();

        debug!("Inserting into {}", self.config.table);
        let outcome = {
            let ctx = self.context(state);
            self.driver.do_insert(&ctx, &row).await?
        };
        self.insert_id = outcome.insert_id().cloned();

        let after = EventPayload::new(ModelEvent::AfterInsert, "insert", EventData::Row(row))
            .with_ids(self.insert_id.clone().into_iter().collect())
            .with_result(outcome.is_success());
        self.trigger(state, after).await?;

        if !outcome.is_success() {
            warn!("Insert into {} failed: {:?}", self.config.table, self.driver.do_errors());
            return Ok(outcome);
        }
        Ok(match (&outcome, return_id) {
            (WriteOutcome::Inserted(_), true) => outcome,
            _ => WriteOutcome::Done,
        })
    }

    pub(crate) async fn insert_batch_with(
        &mut self,
        state: &ScopeState,
        records: Vec<Record<'_>>,
        batch_size: usize,
        testing: bool,
    ) -> ModelResult<WriteOutcome> {
        if records.is_empty() {
            return Err(DataError::empty_dataset("insertBatch").into());
        }

        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            rows.push(self.normalize(record)?);
        }

        let mut prepared = Vec::with_capacity(rows.len());
        for row in rows {
            if !self.validate_with(&row, false).await? {
                warn!("Batch insert into {} rejected by validation", self.config.table);
                return Ok(WriteOutcome::Rejected);
            }

            let mut row = self.protect_fields_for_insert(row)?;
            let date = self.set_date(None);
            self.stamp_created(&mut row, &date);
            prepared.push(row);
        }

        let before = EventPayload::new(ModelEvent::BeforeInsertBatch, "insertBatch", EventData::Rows(prepared));
        let before = self.trigger(state, before).await?;
        let rows = before.data.into_rows();

        debug!("Inserting {} rows into {}", rows.len(), self.config.table);
        let outcome = {
            let ctx = self.context(state);
            self.driver.do_insert_batch(&ctx, &rows, batch_size, testing).await?
        };

        let after = EventPayload::new(ModelEvent::AfterInsertBatch, "insertBatch", EventData::Rows(rows))
            .with_result(outcome.is_success());
        self.trigger(state, after).await?;
        Ok(outcome)
    }

    pub(crate) async fn update_with(
        &mut self,
        state: &ScopeState,
        ids: Vec<PrimaryKey>,
        record: Record<'_>,
    ) -> ModelResult<bool> {
        let row = self.transform(record, "update", false)?;

        let clean = self.config.clean_validation_rules;
        if !self.validate_with(&row, clean).await? {
            warn!("Update of {} rejected by validation", self.config.table);
            return Ok(false);
        }

        let mut row = self.protect_fields(row)?;
        if row.is_empty() {
            return Err(DataError::empty_dataset("update").into());
        }

        let date = self.set_date(None);
        self.stamp_updated(&mut row, &date);

        let before = EventPayload::new(ModelEvent::BeforeUpdate, "update", EventData::Row(row)).with_ids(ids.clone());
        let before = self.trigger(state, before).await?;
        let row = before.data.into_row().unwrap_or_default();

        debug!("Updating {} ({} keys)", self.config.table, ids.len());
        let result = {
            let ctx = self.context(state);
            self.driver.do_update(&ctx, &ids, &row).await?
        };

        let after = EventPayload::new(ModelEvent::AfterUpdate, "update", EventData::Row(row))
            .with_ids(ids)
            .with_result(result);
        self.trigger(state, after).await?;
        Ok(result)
    }

    pub(crate) async fn update_batch_with(
        &mut self,
        state: &ScopeState,
        records: Vec<Record<'_>>,
        index: &str,
        batch_size: usize,
        return_sql: bool,
    ) -> ModelResult<WriteOutcome> {
        if records.is_empty() {
            return Err(DataError::empty_dataset("updateBatch").into());
        }

        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            rows.push(self.normalize(record)?);
        }

        let clean = self.config.clean_validation_rules;
        let mut prepared = Vec::with_capacity(rows.len());
        for row in rows {
            if !row.get(index).map_or(false, |value| !value.is_null()) {
                return Err(ModelError::missing_batch_index(index));
            }
            if !self.validate_with(&row, clean).await? {
                warn!("Batch update of {} rejected by validation", self.config.table);
                return Ok(WriteOutcome::Rejected);
            }

            let index_value = row.get(index).cloned();
            let mut row = self.protect_fields(row)?;
            if let Some(value) = index_value {
                row.insert(index, value);
            }

            let date = self.set_date(None);
            self.stamp_updated(&mut row, &date);
            prepared.push(row);
        }

        let before = EventPayload::new(ModelEvent::BeforeUpdateBatch, "updateBatch", EventData::Rows(prepared));
        let before = self.trigger(state, before).await?;
        let rows = before.data.into_rows();

        debug!("Updating {} rows of {} by {}", rows.len(), self.config.table, index);
        let outcome = {
            let ctx = self.context(state);
            self.driver
                .do_update_batch(&ctx, &rows, index, batch_size, return_sql)
                .await?
        };

        let after = EventPayload::new(ModelEvent::AfterUpdateBatch, "updateBatch", EventData::Rows(rows))
            .with_result(outcome.is_success());
        self.trigger(state, after).await?;
        Ok(outcome)
    }

    pub(crate) async fn delete_with(
        &mut self,
        state: &ScopeState,
        ids: Vec<PrimaryKey>,
        purge: bool,
    ) -> ModelResult<WriteOutcome> {
        let before = EventPayload::new(ModelEvent::BeforeDelete, "delete", EventData::None)
            .with_ids(ids.clone())
            .with_purge(purge);
        self.trigger(state, before).await?;

        debug!("Deleting from {} ({} keys, purge {})", self.config.table, ids.len(), purge);
        let outcome = {
            let ctx = self.context(state);
            self.driver.do_delete(&ctx, &ids, purge).await?
        };

        let after = EventPayload::new(ModelEvent::AfterDelete, "delete", EventData::None)
            .with_ids(ids)
            .with_purge(purge)
            .with_result(outcome.is_success());
        self.trigger(state, after).await?;
        Ok(outcome)
    }

    pub(crate) async fn save_with(&mut self, state: &ScopeState, record: Record<'_>) -> ModelResult<bool> {
        let row = record.into_row()?;
        if row.is_empty() {
            return Ok(true);
        }

        match self.get_id_value(&row) {
            Some(id) => self.update_with(state, vec![id], Record::Row(row)).await,
            None => Ok(self
                .insert_with(state, Record::Row(row), false)
                .await?
                .is_success()),
        }
    }

    // ---------------------------------------------------------------------
    // Validation
    // ---------------------------------------------------------------------

    /// Validate a row against the configured rules.
    ///
    /// Returns true without running the validator when validation is
    /// skipped, no rules apply or the row is empty.
    pub async fn validate(&mut self, row: &Row) -> ModelResult<bool> {
        let clean = self.config.clean_validation_rules;
        self.validate_with(row, clean).await
    }

    async fn validate_with(&mut self, row: &Row, clean: bool) -> ModelResult<bool> {
        if self.config.skip_validation || row.is_empty() {
            return Ok(true);
        }

        let (mut rules, messages) = self.resolve_rules()?;
        if clean {
            rules.retain(|field, _| row.contains_key(field));
        }
        if rules.is_empty() {
            return Ok(true);
        }

        self.validator.reset();
        self.validator.set_rules(rules, messages);
        let valid = self
            .validator
            .run(&row.to_data(), None, self.config.db_group.as_deref())
            .await?;
        if !valid {
            debug!("Validation failed on {}: {}", self.config.table, self.validator.get_errors());
        }
        Ok(valid)
    }

    /// Active rules and messages; group messages yield to the model's own
    fn resolve_rules(&self) -> ModelResult<(RuleSet, MessageSet)> {
        match &self.config.validation_rules {
            ValidationRules::Inline(rules) => Ok((rules.clone(), self.config.validation_messages.clone())),
            ValidationRules::Group(name) => {
                let group = self.validator.load_rule_group(name)?;
                let mut messages = group.messages;
                for (field, overrides) in &self.config.validation_messages {
                    messages
                        .entry(field.clone())
                        .or_default()
                        .extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
                Ok((group.rules, messages))
            }
        }
    }

    pub fn get_validation_rules(&self, filter: RuleFilter) -> ModelResult<RuleSet> {
        let (mut rules, _) = self.resolve_rules()?;
        match filter {
            RuleFilter::All => {}
            RuleFilter::Only(fields) => rules.retain(|field, _| fields.contains(field)),
            RuleFilter::Except(fields) => rules.retain(|field, _| !fields.contains(field)),
        }
        Ok(rules)
    }

    pub fn get_validation_messages(&self) -> &MessageSet {
        &self.config.validation_messages
    }

    pub fn set_validation_rules(&mut self, rules: RuleSet) -> &mut Self {
        self.config.validation_rules = ValidationRules::Inline(rules);
        self
    }

    /// Set the rules of one field. A configured rule group is expanded into
    /// inline rules first.
    pub fn set_validation_rule(
        &mut self,
        field: impl Into<String>,
        rules: impl Into<tabula_validation::FieldRules>,
    ) -> ModelResult<&mut Self> {
        let mut current = self.get_validation_rules(RuleFilter::All)?;
        current.insert(field.into(), rules.into());
        self.config.validation_rules = ValidationRules::Inline(current);
        Ok(self)
    }

    pub fn set_validation_messages(&mut self, messages: MessageSet) -> &mut Self {
        self.config.validation_messages = messages;
        self
    }

    pub fn set_validation_message(
        &mut self,
        field: impl Into<String>,
        messages: BTreeMap<String, String>,
    ) -> &mut Self {
        self.config.validation_messages.insert(field.into(), messages);
        self
    }

    pub fn skip_validation(&mut self, skip: bool) -> &mut Self {
        self.config.skip_validation = skip;
        self
    }

    /// Strip rules for absent fields on update-type writes
    pub fn clean_rules(&mut self, clean: bool) -> &mut Self {
        self.config.clean_validation_rules = clean;
        self
    }

    pub fn set_allowed_fields<I, S>(&mut self, fields: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.allowed_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn protect(&mut self, protect: bool) -> &mut Self {
        self.config.protect_fields = protect;
        self
    }

    pub fn allow_empty_inserts(&mut self, allow: bool) -> &mut Self {
        self.config.allow_empty_inserts = allow;
        self
    }

    // ---------------------------------------------------------------------
    // Results
    // ---------------------------------------------------------------------

    /// Validation errors of the last write, or the driver's last error when
    /// there are none (or `force_db` is set)
    pub fn errors(&self, force_db: bool) -> BTreeMap<String, String> {
        let validation = self.validator.get_errors();
        if !force_db && !self.config.skip_validation && !validation.is_empty() {
            return validation.messages();
        }
        self.driver.do_errors()
    }

    /// Primary key generated by the last insert
    pub fn get_insert_id(&self) -> Option<&PrimaryKey> {
        self.insert_id.as_ref()
    }

    /// Primary key value carried by a row, if any non-empty one
    pub fn get_id_value(&self, row: &Row) -> Option<PrimaryKey> {
        row.get(&self.config.primary_key).and_then(PrimaryKey::from_value)
    }

    /// Current date (or `timestamp`) in the configured date format
    pub fn set_date(&self, timestamp: Option<i64>) -> Value {
        let now = timestamp
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
            .unwrap_or_else(|| (self.clock)());
        date_value(now, self.config.date_format)
    }

    // ---------------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------------

    fn context<'a>(&'a self, state: &'a ScopeState) -> DriverContext<'a> {
        DriverContext {
            config: &self.config,
            soft_deletes: state.soft_deletes,
            constraints: &state.constraints,
            order_by: &state.order_by,
            now: self.set_date(None),
        }
    }

    async fn trigger(&self, state: &ScopeState, payload: EventPayload) -> ModelResult<EventPayload> {
        if !state.allow_callbacks {
            return Ok(payload);
        }
        let chain = self.config.callbacks.for_event(payload.event);
        self.callbacks.trigger(chain, payload).await
    }

    /// Record → storage row: entity fields, casts, then dates
    fn normalize(&self, record: Record<'_>) -> ModelResult<Row> {
        let row = record.into_row()?;
        let row = if self.converter.is_empty() {
            row
        } else {
            self.converter.to_data_source(row)?
        };
        Ok(self.render_dates(row))
    }

    fn transform(&self, record: Record<'_>, operation: &str, allow_empty: bool) -> ModelResult<Row> {
        let row = self.normalize(record)?;
        if row.is_empty() && !allow_empty {
            return Err(DataError::empty_dataset(operation).into());
        }
        Ok(row)
    }

    fn render_dates(&self, mut row: Row) -> Row {
        let format = self.config.date_format;
        for (_, value) in row.iter_mut() {
            let moment = match value {
                Value::DateTime(dt) => *dt,
                Value::Date(date) => match date.and_hms_opt(0, 0, 0) {
                    Some(midnight) => midnight.and_utc(),
                    None => continue,
                },
                _ => continue,
            };
            *value = date_value(moment, format);
        }
        row
    }

    /// Drop columns outside the allow-list
    fn protect_fields(&self, row: Row) -> ModelResult<Row> {
        self.retain_allowed(row, None)
    }

    /// Without auto-increment the caller supplies the key, so it survives the allow-list
    fn protect_fields_for_insert(&self, row: Row) -> ModelResult<Row> {
        let key = (!self.config.use_auto_increment).then_some(self.config.primary_key.as_str());
        self.retain_allowed(row, key)
    }

    fn retain_allowed(&self, mut row: Row, keep: Option<&str>) -> ModelResult<Row> {
        if !self.config.protect_fields {
            return Ok(row);
        }
        if self.config.allowed_fields.is_empty() {
            return Err(DataError::InvalidAllowedFields(self.config.table.clone()).into());
        }

        let allowed = &self.config.allowed_fields;
        row.retain(|column, _| Some(column) == keep || allowed.iter().any(|field| field == column));
        Ok(row)
    }

    fn stamp_created(&self, row: &mut Row, date: &Value) {
        if let Some(created) = self.config.created_column() {
            if !row.contains_key(created) {
                row.insert(created, date.clone());
            }
        }
        self.stamp_updated(row, date);
    }

    fn stamp_updated(&self, row: &mut Row, date: &Value) {
        if let Some(updated) = self.config.updated_column() {
            if !row.contains_key(updated) {
                row.insert(updated, date.clone());
            }
        }
    }

    fn from_storage(&self, rows: Vec<Row>) -> ModelResult<Vec<Row>> {
        if self.converter.is_empty() {
            return Ok(rows);
        }
        rows.into_iter()
            .map(|row| self.converter.from_data_source(row))
            .collect()
    }
}

fn hydrate<E: FromFields>(rows: Vec<Row>) -> ModelResult<Vec<E>> {
    rows.iter().map(E::from_fields).collect()
}

/// A moment in the given date format, at second precision
fn date_value(moment: DateTime<Utc>, format: DateFormat) -> Value {
    match format {
        DateFormat::Int => Value::Int(moment.timestamp()),
        DateFormat::Date => Value::Date(moment.date_naive()),
        DateFormat::DateTime => Value::DateTime(moment.with_nanosecond(0).unwrap_or(moment)),
    }
}
