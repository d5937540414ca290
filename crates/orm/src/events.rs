//! Model lifecycle events and named callback chains
//!
//! Each lifecycle point has an ordered list of handler names in the model
//! configuration. Handlers are registered by name in a [`CallbackRegistry`];
//! triggering folds the [`EventPayload`] through the chain in order.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{DataError, ModelResult};
use crate::model::primary_key::PrimaryKey;
use crate::value::Row;

/// Lifecycle points that fire callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelEvent {
    BeforeInsert,
    AfterInsert,
    BeforeInsertBatch,
    AfterInsertBatch,
    BeforeUpdate,
    AfterUpdate,
    BeforeUpdateBatch,
    AfterUpdateBatch,
    BeforeFind,
    AfterFind,
    BeforeDelete,
    AfterDelete,
}

impl fmt::Display for ModelEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelEvent::BeforeInsert => "beforeInsert",
            ModelEvent::AfterInsert => "afterInsert",
            ModelEvent::BeforeInsertBatch => "beforeInsertBatch",
            ModelEvent::AfterInsertBatch => "afterInsertBatch",
            ModelEvent::BeforeUpdate => "beforeUpdate",
            ModelEvent::AfterUpdate => "afterUpdate",
            ModelEvent::BeforeUpdateBatch => "beforeUpdateBatch",
            ModelEvent::AfterUpdateBatch => "afterUpdateBatch",
            ModelEvent::BeforeFind => "beforeFind",
            ModelEvent::AfterFind => "afterFind",
            ModelEvent::BeforeDelete => "beforeDelete",
            ModelEvent::AfterDelete => "afterDelete",
        };
        write!(f, "{}", name)
    }
}

/// The `data` carried by an event
#[derive(Debug, Clone, PartialEq, Default)]
pub enum EventData {
    #[default]
    None,
    Row(Row),
    Rows(Vec<Row>),
}

impl EventData {
    pub fn into_row(self) -> Option<Row> {
        match self {
            EventData::Row(row) => Some(row),
            EventData::Rows(rows) => rows.into_iter().next(),
            EventData::None => None,
        }
    }

    pub fn into_rows(self) -> Vec<Row> {
        match self {
            EventData::Rows(rows) => rows,
            EventData::Row(row) => vec![row],
            EventData::None => Vec::new(),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, EventData::None)
    }
}

/// Payload passed through a callback chain
///
/// `data` is always present; handlers return the (possibly modified)
/// payload.
#[derive(Debug, Clone, PartialEq)]
pub struct EventPayload {
    pub event: ModelEvent,
    /// Name of the model operation that fired the event
    pub method: String,
    pub data: EventData,
    pub ids: Vec<PrimaryKey>,
    pub singleton: bool,
    pub limit: Option<u64>,
    pub offset: u64,
    pub purge: bool,
    pub result: Option<bool>,
    /// Set by a `beforeFind` handler to return `data` without querying
    pub return_data: bool,
}

impl EventPayload {
    pub fn new(event: ModelEvent, method: impl Into<String>, data: EventData) -> Self {
        Self {
            event,
            method: method.into(),
            data,
            ids: Vec::new(),
            singleton: false,
            limit: None,
            offset: 0,
            purge: false,
            result: None,
            return_data: false,
        }
    }

    pub fn with_ids(mut self, ids: Vec<PrimaryKey>) -> Self {
        self.ids = ids;
        self
    }

    pub fn singleton(mut self, singleton: bool) -> Self {
        self.singleton = singleton;
        self
    }

    pub fn with_limit(mut self, limit: Option<u64>, offset: u64) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    pub fn with_purge(mut self, purge: bool) -> Self {
        self.purge = purge;
        self
    }

    pub fn with_result(mut self, result: bool) -> Self {
        self.result = Some(result);
        self
    }

    /// Move the payload on to the next lifecycle point
    pub(crate) fn into_event(mut self, event: ModelEvent) -> Self {
        self.event = event;
        self.return_data = false;
        self
    }
}

/// A named model callback
#[async_trait]
pub trait ModelCallback: Send + Sync {
    async fn call(&self, payload: EventPayload) -> ModelResult<EventPayload>;
}

#[async_trait]
impl<F> ModelCallback for F
where
    F: Fn(EventPayload) -> ModelResult<EventPayload> + Send + Sync,
{
    async fn call(&self, payload: EventPayload) -> ModelResult<EventPayload> {
        self(payload)
    }
}

/// Handlers available to a model's callback chains, by name
#[derive(Clone, Default)]
pub struct CallbackRegistry {
    callbacks: HashMap<String, Arc<dyn ModelCallback>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a closure under `name`
    pub fn register<F>(&mut self, name: impl Into<String>, callback: F)
    where
        F: Fn(EventPayload) -> ModelResult<EventPayload> + Send + Sync + 'static,
    {
        self.callbacks.insert(name.into(), Arc::new(callback));
    }

    /// Register (or replace) a handler object under `name`
    pub fn register_handler<C>(&mut self, name: impl Into<String>, callback: C)
    where
        C: ModelCallback + 'static,
    {
        self.callbacks.insert(name.into(), Arc::new(callback));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.callbacks.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.callbacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// Run `payload` through the handlers named in `chain`, in order.
    /// A name with no registered handler is an error.
    pub async fn trigger(&self, chain: &[String], mut payload: EventPayload) -> ModelResult<EventPayload> {
        for name in chain {
            let callback = self
                .callbacks
                .get(name)
                .ok_or_else(|| DataError::InvalidMethodTriggered(name.clone()))?;

            tracing::debug!("Running {} callback '{}'", payload.event, name);
            payload = callback.call(payload).await?;
        }
        Ok(payload)
    }
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.callbacks.keys().collect();
        names.sort();
        f.debug_struct("CallbackRegistry").field("callbacks", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelError;
    use crate::row;

    #[tokio::test]
    async fn test_chain_runs_in_order() {
        let mut registry = CallbackRegistry::new();
        registry.register("first", |mut payload: EventPayload| {
            if let EventData::Row(row) = &mut payload.data {
                row.insert("trace", "first");
            }
            Ok(payload)
        });
        registry.register("second", |mut payload: EventPayload| {
            if let EventData::Row(row) = &mut payload.data {
                let trace = row.get("trace").map(|v| v.to_text()).unwrap_or_default();
                row.insert("trace", format!("{},second", trace));
            }
            Ok(payload)
        });

        let payload = EventPayload::new(
            ModelEvent::BeforeInsert,
            "insert",
            EventData::Row(row! { "name" => "a" }),
        );
        let chain = vec!["first".to_string(), "second".to_string()];
        let payload = registry.trigger(&chain, payload).await.unwrap();

        let row = payload.data.into_row().unwrap();
        assert_eq!(row.get("trace").unwrap().to_text(), "first,second");
    }

    #[tokio::test]
    async fn test_unknown_callback_is_an_error() {
        let registry = CallbackRegistry::new();
        let payload = EventPayload::new(ModelEvent::BeforeInsert, "insert", EventData::None);

        let err = registry
            .trigger(&["doSomething".to_string()], payload)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ModelError::Data(DataError::InvalidMethodTriggered(ref name)) if name == "doSomething"
        ));
    }

    #[test]
    fn test_event_names() {
        assert_eq!(ModelEvent::BeforeInsert.to_string(), "beforeInsert");
        assert_eq!(ModelEvent::AfterUpdateBatch.to_string(), "afterUpdateBatch");
    }
}
