//! Persistence Adapters
//!
//! Implementations of the subscription and credential store ports:
//! - `SqlStore`: SQLite through `sqlx`, used in production
//! - `InMemoryStore`: process-local, used in tests and local runs

mod in_memory;
mod sql;

pub use in_memory::InMemoryStore;
pub use sql::SqlStore;
