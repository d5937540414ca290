//! Query Builder - Core builder implementation

use super::types::*;
use crate::value::{Row, Value};

/// Query builder for constructing database statements
#[derive(Debug, Clone, PartialEq)]
pub struct QueryBuilder {
    pub(crate) query_type: QueryType,
    pub(crate) table: String,
    pub(crate) select_fields: Vec<String>,
    pub(crate) set_clauses: Vec<SetClause>,
    pub(crate) rows: Vec<Row>,
    pub(crate) key_column: Option<String>,
    pub(crate) where_conditions: Vec<WhereCondition>,
    pub(crate) order_by: Vec<(String, OrderDirection)>,
    pub(crate) limit_count: Option<u64>,
    pub(crate) offset_value: Option<u64>,
    pub(crate) returning: Option<String>,
}

impl QueryBuilder {
    fn new(query_type: QueryType, table: &str) -> Self {
        Self {
            query_type,
            table: table.to_string(),
            select_fields: Vec::new(),
            set_clauses: Vec::new(),
            rows: Vec::new(),
            key_column: None,
            where_conditions: Vec::new(),
            order_by: Vec::new(),
            limit_count: None,
            offset_value: None,
            returning: None,
        }
    }

    /// Start a SELECT query
    pub fn select(table: &str) -> Self {
        Self::new(QueryType::Select, table)
    }

    /// Start a `SELECT COUNT(*)` query
    pub fn count(table: &str) -> Self {
        Self::new(QueryType::Count, table)
    }

    /// Start an INSERT query
    pub fn insert_into(table: &str) -> Self {
        Self::new(QueryType::Insert, table)
    }

    /// Start a multi-row INSERT
    pub fn insert_batch(table: &str, rows: Vec<Row>) -> Self {
        let mut builder = Self::new(QueryType::InsertBatch, table);
        builder.rows = rows;
        builder
    }

    /// Start an UPDATE query
    pub fn update(table: &str) -> Self {
        Self::new(QueryType::Update, table)
    }

    /// Start a multi-row UPDATE keyed on `index`
    pub fn update_batch(table: &str, rows: Vec<Row>, index: &str) -> Self {
        let mut builder = Self::new(QueryType::UpdateBatch, table);
        builder.rows = rows;
        builder.key_column = Some(index.to_string());
        builder
    }

    /// Start an INSERT that updates the existing row on a `key` conflict
    pub fn upsert(table: &str, key: &str) -> Self {
        let mut builder = Self::new(QueryType::Upsert, table);
        builder.key_column = Some(key.to_string());
        builder
    }

    /// Start a DELETE query
    pub fn delete_from(table: &str) -> Self {
        Self::new(QueryType::Delete, table)
    }

    /// Select specific columns
    pub fn columns<S: AsRef<str>>(mut self, columns: &[S]) -> Self {
        self.select_fields = columns.iter().map(|c| c.as_ref().to_string()).collect();
        self
    }

    /// Set a column value (for INSERT/UPDATE)
    pub fn set<T: Into<Value>>(mut self, column: &str, value: T) -> Self {
        self.set_clauses.push(SetClause {
            column: column.to_string(),
            value: value.into(),
        });
        self
    }

    /// Set every column of a row
    pub fn set_row(mut self, row: &Row) -> Self {
        for (column, value) in row.iter() {
            self.set_clauses.push(SetClause {
                column: column.clone(),
                value: value.clone(),
            });
        }
        self
    }

    /// Add ORDER BY clause
    pub fn order_by(mut self, column: &str, direction: OrderDirection) -> Self {
        self.order_by.push((column.to_string(), direction));
        self
    }

    /// Add several ORDER BY clauses
    pub fn order_by_all(mut self, order: &[(String, OrderDirection)]) -> Self {
        self.order_by.extend(order.iter().cloned());
        self
    }

    /// Add LIMIT clause
    pub fn limit(mut self, count: u64) -> Self {
        self.limit_count = Some(count);
        self
    }

    /// Add OFFSET clause
    pub fn offset(mut self, count: u64) -> Self {
        self.offset_value = Some(count);
        self
    }

    /// Add `RETURNING column`
    pub fn returning(mut self, column: &str) -> Self {
        self.returning = Some(column.to_string());
        self
    }

    pub fn query_type(&self) -> QueryType {
        self.query_type
    }

    pub fn has_conditions(&self) -> bool {
        !self.where_conditions.is_empty()
    }
}
