//! Query Builder WHERE clause operations
//!
//! Conditions are plain data so that the same list can be rendered to SQL
//! or evaluated against in-memory rows.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use std::collections::HashMap;

use super::builder::QueryBuilder;
use super::sql_generation::literal;
use super::types::*;
use crate::model::primary_key::PrimaryKey;
use crate::value::{Row, Value};

/// Compiled LIKE patterns; emptied once it holds this many
const LIKE_CACHE_LIMIT: usize = 256;

static LIKE_PATTERNS: Lazy<Mutex<HashMap<String, Regex>>> = Lazy::new(|| Mutex::new(HashMap::new()));

impl WhereCondition {
    pub fn new(column: &str, operator: QueryOperator, values: Vec<Value>) -> Self {
        Self {
            column: column.to_string(),
            operator,
            values,
            raw: None,
        }
    }

    pub fn eq<T: Into<Value>>(column: &str, value: T) -> Self {
        Self::new(column, QueryOperator::Equal, vec![value.into()])
    }

    pub fn in_list(column: &str, values: Vec<Value>) -> Self {
        Self::new(column, QueryOperator::In, values)
    }

    pub fn null(column: &str) -> Self {
        Self::new(column, QueryOperator::IsNull, Vec::new())
    }

    pub fn not_null(column: &str) -> Self {
        Self::new(column, QueryOperator::IsNotNull, Vec::new())
    }

    /// Raw SQL condition, emitted as written
    pub fn raw(sql: &str) -> Self {
        Self {
            column: String::new(),
            operator: QueryOperator::Equal,
            values: Vec::new(),
            raw: Some(sql.to_string()),
        }
    }

    /// Condition selecting rows by primary key.
    ///
    /// Raw keys force a raw condition with the other keys inlined.
    pub fn for_keys(column: &str, keys: &[PrimaryKey]) -> Self {
        if keys.iter().any(PrimaryKey::is_raw) {
            let items: Vec<String> = keys
                .iter()
                .map(|key| match key {
                    PrimaryKey::Raw(sql) => sql.as_str().to_string(),
                    other => other.to_value().map(|v| literal(&v)).unwrap_or_default(),
                })
                .collect();
            return Self::raw(&format!("{} IN ({})", column, items.join(", ")));
        }

        let mut values: Vec<Value> = keys.iter().filter_map(PrimaryKey::to_value).collect();
        if values.len() == 1 {
            Self::new(column, QueryOperator::Equal, vec![values.remove(0)])
        } else {
            Self::in_list(column, values)
        }
    }

    pub fn is_raw(&self) -> bool {
        self.raw.is_some()
    }

    /// Evaluate the condition against a row, with SQL null semantics.
    /// Raw conditions never match.
    pub fn matches(&self, row: &Row) -> bool {
        if self.raw.is_some() {
            return false;
        }

        let null = Value::Null;
        let actual = row.get(&self.column).unwrap_or(&null);
        let first = self.values.first();

        match self.operator {
            QueryOperator::IsNull => actual.is_null(),
            QueryOperator::IsNotNull => !actual.is_null(),
            QueryOperator::Equal => first.map_or(false, |v| !actual.is_null() && actual.loose_eq(v)),
            QueryOperator::NotEqual => {
                first.map_or(false, |v| !actual.is_null() && !v.is_null() && !actual.loose_eq(v))
            }
            QueryOperator::GreaterThan => compare(actual, first, |o| o.is_gt()),
            QueryOperator::GreaterThanOrEqual => compare(actual, first, |o| o.is_ge()),
            QueryOperator::LessThan => compare(actual, first, |o| o.is_lt()),
            QueryOperator::LessThanOrEqual => compare(actual, first, |o| o.is_le()),
            QueryOperator::Like => first.map_or(false, |p| !actual.is_null() && like(actual, p)),
            QueryOperator::NotLike => first.map_or(false, |p| !actual.is_null() && !like(actual, p)),
            QueryOperator::In => !actual.is_null() && self.values.iter().any(|v| actual.loose_eq(v)),
            QueryOperator::NotIn => {
                !actual.is_null() && !self.values.iter().any(|v| actual.loose_eq(v))
            }
            QueryOperator::Between => match (self.values.first(), self.values.get(1)) {
                (Some(low), Some(high)) => {
                    compare(actual, Some(low), |o| o.is_ge()) && compare(actual, Some(high), |o| o.is_le())
                }
                _ => false,
            },
        }
    }
}

fn compare<F>(actual: &Value, expected: Option<&Value>, accept: F) -> bool
where
    F: Fn(std::cmp::Ordering) -> bool,
{
    expected
        .and_then(|expected| actual.loose_cmp(expected))
        .map_or(false, accept)
}

fn like(actual: &Value, pattern: &Value) -> bool {
    let pattern = pattern.to_text();
    let mut cache = LIKE_PATTERNS.lock();
    if !cache.contains_key(&pattern) {
        let mut expression = String::from("^");
        for ch in pattern.chars() {
            match ch {
                '%' => expression.push_str(".*"),
                '_' => expression.push('.'),
                other => expression.push_str(&regex::escape(&other.to_string())),
            }
        }
        expression.push('$');
        match Regex::new(&expression) {
            Ok(regex) => {
                if cache.len() >= LIKE_CACHE_LIMIT {
                    cache.clear();
                }
                cache.insert(pattern.clone(), regex);
            }
            Err(_) => return false,
        }
    }
    cache
        .get(&pattern)
        .map_or(false, |regex| regex.is_match(&actual.to_text()))
}

impl QueryBuilder {
    /// Add a prepared condition
    pub fn where_condition(mut self, condition: WhereCondition) -> Self {
        self.where_conditions.push(condition);
        self
    }

    /// Add several prepared conditions
    pub fn where_all(mut self, conditions: &[WhereCondition]) -> Self {
        self.where_conditions.extend(conditions.iter().cloned());
        self
    }

    /// Add WHERE condition with equality
    pub fn where_eq<T: Into<Value>>(self, column: &str, value: T) -> Self {
        self.where_condition(WhereCondition::eq(column, value))
    }

    /// Add WHERE condition with IN
    pub fn where_in<T: Into<Value>>(self, column: &str, values: Vec<T>) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.where_condition(WhereCondition::in_list(column, values))
    }

    /// Add WHERE condition with IS NULL
    pub fn where_null(self, column: &str) -> Self {
        self.where_condition(WhereCondition::null(column))
    }

    /// Add WHERE condition with IS NOT NULL
    pub fn where_not_null(self, column: &str) -> Self {
        self.where_condition(WhereCondition::not_null(column))
    }

    /// Add WHERE condition with LIKE
    pub fn where_like(self, column: &str, pattern: &str) -> Self {
        self.where_condition(WhereCondition::new(column, QueryOperator::Like, vec![pattern.into()]))
    }

    /// Add raw WHERE condition for complex cases
    pub fn where_raw(self, raw_condition: &str) -> Self {
        self.where_condition(WhereCondition::raw(raw_condition))
    }
}
