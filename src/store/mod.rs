//! Persistence layer — libSQL-backed storage for onboarding progress and the
//! role catalog.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{Database, RoleDirectory, StaleCursor};
