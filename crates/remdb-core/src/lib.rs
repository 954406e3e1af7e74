//! # remdb-core
//!
//! Embedded multi-tenant knowledge store over a single ordered key-value
//! substrate, unifying four retrieval modalities:
//!
//! - key/alias lookup,
//! - structured predicate queries with a SQL-like surface,
//! - approximate-nearest-neighbor vector similarity,
//! - bounded graph traversal over a typed edge set.
//!
//! A [`Database`] handle serves one tenant of a shared on-disk database;
//! isolation is by key prefix. Every mutation commits atomically together
//! with its secondary-index postings and write-ahead-log records, which a
//! replication transport can ship to followers.
//!
//! ```no_run
//! use remdb_core::Database;
//! use serde_json::json;
//!
//! # fn main() -> remdb_core::Result<()> {
//! let db = Database::open("./data", "acme")?;
//! db.register_schema("person", json!({
//!     "properties": {
//!         "name": {"type": "string"},
//!         "role": {"type": "string"},
//!     },
//!     "required": ["name"],
//!     "indexed_fields": ["role"],
//! }))?;
//! let id = db.insert("person", json!({"name": "Alice", "role": "engineer"}))?;
//! let rows = db.sql("SELECT name FROM person WHERE role = 'engineer'")?;
//! assert_eq!(rows.len(), 1);
//! # let _ = id;
//! # Ok(())
//! # }
//! ```

pub mod database;
pub mod embed;
pub mod entity;
pub mod error;
pub mod exec;
pub mod graph;
pub mod index;
pub mod keys;
pub mod kv;
pub mod moment;
pub mod predicate;
pub mod schema;
pub mod sql;
pub mod types;
pub mod vector;
pub mod wal;
pub mod worker;

pub use database::{Database, DatabaseOptions};
pub use embed::Embedder;
pub use error::{DbError, Result};
pub use exec::ExecStatsSnapshot;
pub use graph::{TraversalPath, TraversalStrategy, TraverseOptions};
pub use predicate::{Predicate, Query};
pub use schema::Schema;
pub use types::{Direction, Entity, Moment, Order, StoredEdge, WalEntry, WalOp};
pub use worker::WorkerStatus;
