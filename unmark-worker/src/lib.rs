//! # unmark Worker Library
//!
//! Background housekeeping for the bot back end.
//!
//! ## Modules
//!
//! - `config`: Worker configuration
//! - `orchestrator`: Stale-task sweep and invoice watcher loops

pub mod config;
pub mod orchestrator;
