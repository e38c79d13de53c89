//! Database models for unmark
//!
//! Each module holds one table's row type and its queries. Queries are generic
//! over [`sqlx::PgExecutor`] so they run equally against the pool or inside a
//! transaction opened by [`crate::store::postgres::PgStore`].
//!
//! # Models
//!
//! - `user`: chat users and their entitlements
//! - `credential`: upstream provider credentials
//! - `settings`: store-wide toggles (auto-switch)
//! - `task`: the pending-job ledger
//! - `package`: purchasable attempt bundles
//! - `invoice`: purchase attempts at the payment provider

pub mod credential;
pub mod invoice;
pub mod package;
pub mod settings;
pub mod task;
pub mod user;

pub use credential::{Credential, NewCredential};
pub use invoice::{Invoice, InvoiceState, NewInvoice};
pub use package::{NewPackage, Package};
pub use task::{NewTask, Task};
pub use user::User;
