//! Ideaforge persistence adapters.
//!
//! Implements the [`community`] store traits ([`community::ConfigStore`],
//! [`community::TeamStore`], [`community::UserStore`],
//! [`community::WarnStore`]) twice:
//!
//! - [`SqliteStore`]: the durable store used in production, via `sqlx`.
//! - [`MemoryStore`]: a process-local store for dry runs and tests.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** SQL, connection pooling and row decoding live here.
//! The workflow crate sees only `dyn community::Store`.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
