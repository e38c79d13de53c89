//! Database layer for unmark
//!
//! # Modules
//!
//! - `pool`: PostgreSQL connection pool with a start-up health check
//! - `migrations`: schema migration runner (files live in `migrations/` at the workspace root)
//!
//! Row types and their queries live in [`crate::models`]; the trait-level view
//! used by the lifecycle components lives in [`crate::store`].

pub mod migrations;
pub mod pool;
