//! Query Builder Module - statement builder shared by the drivers

pub mod builder;
pub mod sql_generation;
pub mod types;
pub mod where_clause;

pub use builder::QueryBuilder;
pub use sql_generation::literal;
pub use types::{OrderDirection, QueryOperator, QueryType, SetClause, WhereCondition};
