//! # unmark shared library
//!
//! Domain core of the unmark watermark-removal bot, used by the API server and
//! the background worker.
//!
//! ## Module Organization
//!
//! - `models`: database rows and their queries
//! - `db`: connection pool and migrations
//! - `store`: storage traits with PostgreSQL and in-memory implementations
//! - `lifecycle`: credential selection, submission, failover, reconciliation, expiry
//! - `provider`: outbound job-creation client
//! - `messenger`: chat transport
//! - `payments`: invoice provider and the purchase flow
//! - `accounts`: registration, profile and channel bonus

pub mod accounts;
pub mod db;
pub mod lifecycle;
pub mod messenger;
pub mod models;
pub mod payments;
pub mod provider;
pub mod store;

/// Current version of the unmark shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
