//! SQLite backend for the Satchel document store.
//!
//! Each document is one JSON row; the Mango selector subset is evaluated
//! in Rust after an optional schema-equality pushdown. Wraps
//! [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime.

mod schema;
mod selector;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteBackend;
