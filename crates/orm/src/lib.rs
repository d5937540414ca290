//! # tabula-orm: Model Layer for tabula
//!
//! A storage-independent model layer: [`BaseModel`] runs the find / insert /
//! update / delete / save / replace lifecycle, including batch and
//! soft-delete variants, on top of a pluggable [`ModelDriver`]. It enforces
//! validation, mass-assignment protection, timestamps and named
//! before/after callback chains.
//!
//! Two drivers ship with the crate: [`MemoryDriver`] for tests and tools,
//! and [`PostgresDriver`] on a sqlx pool.

pub mod converter;
pub mod database;
pub mod driver;
pub mod error;
pub mod events;
pub mod model;
pub mod query;
pub mod value;


// Re-export core traits and types
pub use converter::{Cast, CastKind, DataConverter};
pub use database::{create_pool, DatabaseConfig, PoolConfig, PoolError};
pub use driver::{DriverContext, MemoryDriver, ModelDriver, PostgresDriver, SoftDeleteMode, WriteOutcome};
pub use error::*;
pub use events::{CallbackRegistry, EventData, EventPayload, ModelCallback, ModelEvent};
pub use model::*;
pub use query::*;
pub use value::{Row, Value};
