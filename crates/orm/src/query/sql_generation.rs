//! Query Builder SQL generation
//!
//! Every statement is rendered by one writer that either emits `$n`
//! placeholders and collects the bound values, or inlines escaped literals
//! (used by test mode, where the statement is returned instead of run).

use std::collections::BTreeSet;

use super::builder::QueryBuilder;
use super::types::*;
use crate::error::{ModelError, ModelResult};
use crate::value::{Row, Value};

/// Render a value as an SQL literal
pub fn literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => String::from(if *b { "TRUE" } else { "FALSE" }),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        other => format!("'{}'", other.to_text().replace('\'', "''")),
    }
}

struct SqlWriter {
    sql: String,
    params: Vec<Value>,
    inline: bool,
}

impl SqlWriter {
    fn new(inline: bool) -> Self {
        Self {
            sql: String::new(),
            params: Vec::new(),
            inline,
        }
    }

    fn push(&mut self, text: &str) {
        self.sql.push_str(text);
    }

    fn value(&mut self, value: &Value) {
        if self.inline {
            let text = literal(value);
            self.sql.push_str(&text);
        } else {
            self.params.push(value.clone());
            let placeholder = format!("${}", self.params.len());
            self.sql.push_str(&placeholder);
        }
    }

    fn values(&mut self, values: &[Value]) {
        for (i, value) in values.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.value(value);
        }
    }
}

impl QueryBuilder {
    /// Generate SQL with `$n` placeholders and the values to bind
    pub fn to_sql_with_params(&self) -> ModelResult<(String, Vec<Value>)> {
        let writer = self.render(false)?;
        Ok((writer.sql, writer.params))
    }

    /// Generate SQL with values inlined as literals
    pub fn to_sql(&self) -> ModelResult<String> {
        Ok(self.render(true)?.sql)
    }

    fn render(&self, inline: bool) -> ModelResult<SqlWriter> {
        let mut writer = SqlWriter::new(inline);
        match self.query_type {
            QueryType::Select => self.build_select_sql(&mut writer),
            QueryType::Count => self.build_count_sql(&mut writer),
            QueryType::Insert => {
                self.build_insert_sql(&mut writer);
                self.build_returning_clause(&mut writer);
            }
            QueryType::InsertBatch => self.build_insert_batch_sql(&mut writer)?,
            QueryType::Update => self.build_update_sql(&mut writer)?,
            QueryType::UpdateBatch => self.build_update_batch_sql(&mut writer)?,
            QueryType::Upsert => self.build_upsert_sql(&mut writer),
            QueryType::Delete => self.build_delete_sql(&mut writer)?,
        }
        Ok(writer)
    }

    fn build_select_sql(&self, w: &mut SqlWriter) {
        w.push("SELECT ");
        if self.select_fields.is_empty() {
            w.push("*");
        } else {
            w.push(&self.select_fields.join(", "));
        }
        w.push(" FROM ");
        w.push(&self.table);

        self.build_where_clause(w);
        self.build_order_limit_clause(w);
    }

    fn build_count_sql(&self, w: &mut SqlWriter) {
        w.push("SELECT COUNT(*) AS numrows FROM ");
        w.push(&self.table);
        self.build_where_clause(w);
    }

    fn build_insert_sql(&self, w: &mut SqlWriter) {
        w.push("INSERT INTO ");
        w.push(&self.table);

        if self.set_clauses.is_empty() {
            w.push(" DEFAULT VALUES");
        } else {
            let columns: Vec<&str> = self.set_clauses.iter().map(|c| c.column.as_str()).collect();
            w.push(&format!(" ({}) VALUES (", columns.join(", ")));
            let values: Vec<Value> = self.set_clauses.iter().map(|c| c.value.clone()).collect();
            w.values(&values);
            w.push(")");
        }
    }

    fn build_insert_batch_sql(&self, w: &mut SqlWriter) -> ModelResult<()> {
        let columns = batch_columns(&self.rows, None);
        if columns.is_empty() {
            return Err(ModelError::Database("Batch insert requires at least one column.".to_string()));
        }

        w.push(&format!("INSERT INTO {} ({}) VALUES ", self.table, columns.join(", ")));
        for (i, row) in self.rows.iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            w.push("(");
            for (j, column) in columns.iter().enumerate() {
                if j > 0 {
                    w.push(", ");
                }
                match row.get(column) {
                    Some(value) => w.value(value),
                    None => w.push("DEFAULT"),
                }
            }
            w.push(")");
        }
        Ok(())
    }

    fn build_update_sql(&self, w: &mut SqlWriter) -> ModelResult<()> {
        if self.where_conditions.is_empty() {
            return Err(ModelError::Database(
                "Updates are not allowed unless they contain a \"where\" or \"like\" clause.".to_string(),
            ));
        }

        w.push("UPDATE ");
        w.push(&self.table);
        w.push(" SET ");
        for (i, clause) in self.set_clauses.iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            w.push(&format!("{} = ", clause.column));
            w.value(&clause.value);
        }

        self.build_where_clause(w);
        Ok(())
    }

    /// `UPDATE t SET col = CASE WHEN idx = .. THEN .. ELSE col END WHERE idx IN (..)`
    fn build_update_batch_sql(&self, w: &mut SqlWriter) -> ModelResult<()> {
        let index = self.key_column.as_deref().unwrap_or_default();
        if index.is_empty() {
            return Err(ModelError::Database(
                "You must specify an index to match on for batch updates.".to_string(),
            ));
        }
        if self.rows.iter().any(|row| !row.contains_key(index)) {
            return Err(ModelError::Database(format!(
                "One or more rows submitted for batch updating is missing the specified index \"{}\".",
                index
            )));
        }

        let columns = batch_columns(&self.rows, Some(index));
        if columns.is_empty() {
            return Err(ModelError::Database("Batch update requires at least one column.".to_string()));
        }

        w.push(&format!("UPDATE {} SET ", self.table));
        for (i, column) in columns.iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            w.push(&format!("{} = CASE", column));
            for row in &self.rows {
                if let (Some(key), Some(value)) = (row.get(index), row.get(column)) {
                    w.push(&format!(" WHEN {} = ", index));
                    w.value(key);
                    w.push(" THEN ");
                    w.value(value);
                }
            }
            w.push(&format!(" ELSE {} END", column));
        }

        w.push(&format!(" WHERE {} IN (", index));
        let keys: Vec<Value> = self.rows.iter().filter_map(|row| row.get(index).cloned()).collect();
        w.values(&keys);
        w.push(")");

        // Extra conditions (soft-delete filters) apply on top of the index
        for condition in &self.where_conditions {
            w.push(" AND ");
            write_condition(w, condition);
        }
        Ok(())
    }

    /// `INSERT .. ON CONFLICT (key) DO UPDATE SET col = EXCLUDED.col`
    fn build_upsert_sql(&self, w: &mut SqlWriter) {
        self.build_insert_sql(w);

        let key = self.key_column.as_deref().unwrap_or_default();
        if key.is_empty() || !self.set_clauses.iter().any(|c| c.column == key) {
            self.build_returning_clause(w);
            return;
        }

        let updates: Vec<String> = self
            .set_clauses
            .iter()
            .filter(|c| c.column != key)
            .map(|c| format!("{0} = EXCLUDED.{0}", c.column))
            .collect();

        if updates.is_empty() {
            w.push(&format!(" ON CONFLICT ({}) DO NOTHING", key));
        } else {
            w.push(&format!(" ON CONFLICT ({}) DO UPDATE SET {}", key, updates.join(", ")));
        }
        self.build_returning_clause(w);
    }

    fn build_delete_sql(&self, w: &mut SqlWriter) -> ModelResult<()> {
        if self.where_conditions.is_empty() {
            return Err(ModelError::Database(
                "Deletes are not allowed unless they contain a \"where\" or \"like\" clause.".to_string(),
            ));
        }

        w.push("DELETE FROM ");
        w.push(&self.table);
        self.build_where_clause(w);
        Ok(())
    }

    fn build_returning_clause(&self, w: &mut SqlWriter) {
        if let Some(column) = &self.returning {
            w.push(" RETURNING ");
            w.push(column);
        }
    }

    /// Helper method to build WHERE clauses
    fn build_where_clause(&self, w: &mut SqlWriter) {
        if self.where_conditions.is_empty() {
            return;
        }

        w.push(" WHERE ");
        for (i, condition) in self.where_conditions.iter().enumerate() {
            if i > 0 {
                w.push(" AND ");
            }
            write_condition(w, condition);
        }
    }

    /// Helper method to build ORDER BY and LIMIT clauses
    fn build_order_limit_clause(&self, w: &mut SqlWriter) {
        if !self.order_by.is_empty() {
            let order: Vec<String> = self
                .order_by
                .iter()
                .map(|(column, direction)| format!("{} {}", column, direction))
                .collect();
            w.push(" ORDER BY ");
            w.push(&order.join(", "));
        }

        if let Some(limit) = self.limit_count {
            w.push(&format!(" LIMIT {}", limit));
        }

        if let Some(offset) = self.offset_value {
            if offset > 0 {
                w.push(&format!(" OFFSET {}", offset));
            }
        }
    }
}

fn write_condition(w: &mut SqlWriter, condition: &WhereCondition) {
    if let Some(raw) = &condition.raw {
        w.push(raw);
        return;
    }

    w.push(&condition.column);
    w.push(" ");
    w.push(&condition.operator.to_string());

    match condition.operator {
        QueryOperator::In | QueryOperator::NotIn => {
            w.push(" (");
            w.values(&condition.values);
            w.push(")");
        }
        QueryOperator::Between => {
            if let (Some(low), Some(high)) = (condition.values.first(), condition.values.get(1)) {
                w.push(" ");
                w.value(low);
                w.push(" AND ");
                w.value(high);
            }
        }
        QueryOperator::IsNull | QueryOperator::IsNotNull => {}
        _ => {
            if let Some(value) = condition.values.first() {
                w.push(" ");
                w.value(value);
            }
        }
    }
}

/// Union of the columns of every row, sorted, minus `skip`
fn batch_columns(rows: &[Row], skip: Option<&str>) -> Vec<String> {
    let columns: BTreeSet<&String> = rows.iter().flat_map(|row| row.columns()).collect();
    columns
        .into_iter()
        .filter(|column| Some(column.as_str()) != skip)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row;

    #[test]
    fn test_select_with_params() {
        let (sql, params) = QueryBuilder::select("users")
            .where_eq("active", true)
            .where_in("id", vec![1, 2])
            .where_null("deleted_at")
            .order_by("id", OrderDirection::Asc)
            .limit(10)
            .offset(20)
            .to_sql_with_params()
            .unwrap();

        assert_eq!(
            sql,
            "SELECT * FROM users WHERE active = $1 AND id IN ($2, $3) AND deleted_at IS NULL ORDER BY id ASC LIMIT 10 OFFSET 20"
        );
        assert_eq!(params, vec![Value::Bool(true), Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn test_insert_returning() {
        let (sql, params) = QueryBuilder::insert_into("users")
            .set_row(&row! { "name" => "Jane", "email" => "jane@example.com" })
            .returning("id")
            .to_sql_with_params()
            .unwrap();

        assert_eq!(sql, "INSERT INTO users (email, name) VALUES ($1, $2) RETURNING id");
        assert_eq!(params.len(), 2);

        let sql = QueryBuilder::insert_into("users").returning("id").to_sql().unwrap();
        assert_eq!(sql, "INSERT INTO users DEFAULT VALUES RETURNING id");
    }

    #[test]
    fn test_inline_literals_escape_quotes() {
        let sql = QueryBuilder::update("users")
            .set("name", "O'Brien")
            .where_eq("id", 5)
            .to_sql()
            .unwrap();
        assert_eq!(sql, "UPDATE users SET name = 'O''Brien' WHERE id = 5");
    }

    #[test]
    fn test_whereless_update_and_delete_are_refused() {
        let err = QueryBuilder::update("users").set("name", "x").to_sql().unwrap_err();
        assert!(matches!(err, ModelError::Database(ref m) if m.starts_with("Updates are not allowed")));

        let err = QueryBuilder::delete_from("users").to_sql_with_params().unwrap_err();
        assert!(matches!(err, ModelError::Database(ref m) if m.starts_with("Deletes are not allowed")));
    }

    #[test]
    fn test_insert_batch_fills_missing_columns_with_default() {
        let sql = QueryBuilder::insert_batch(
            "users",
            vec![row! { "name" => "a", "email" => "a@x.io" }, row! { "name" => "b" }],
        )
        .to_sql()
        .unwrap();
        assert_eq!(
            sql,
            "INSERT INTO users (email, name) VALUES ('a@x.io', 'a'), (DEFAULT, 'b')"
        );
    }

    #[test]
    fn test_update_batch_case_when() {
        let sql = QueryBuilder::update_batch(
            "users",
            vec![row! { "id" => 1, "name" => "a" }, row! { "id" => 2, "name" => "b" }],
            "id",
        )
        .to_sql()
        .unwrap();
        assert_eq!(
            sql,
            "UPDATE users SET name = CASE WHEN id = 1 THEN 'a' WHEN id = 2 THEN 'b' ELSE name END WHERE id IN (1, 2)"
        );

        let err = QueryBuilder::update_batch("users", vec![row! { "name" => "a" }], "id")
            .to_sql()
            .unwrap_err();
        assert!(matches!(err, ModelError::Database(_)));
    }

    #[test]
    fn test_upsert() {
        let sql = QueryBuilder::upsert("users", "id")
            .set_row(&row! { "id" => 1, "name" => "a" })
            .to_sql()
            .unwrap();
        assert_eq!(
            sql,
            "INSERT INTO users (id, name) VALUES (1, 'a') ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name"
        );
    }
}
