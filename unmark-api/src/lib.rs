//! # unmark API Server Library
//!
//! HTTP surface of the watermark-removal bot.
//!
//! ## Modules
//!
//! - `app`: Application state and router builder
//! - `bot`: Chat command handling
//! - `config`: Configuration management
//! - `error`: Error handling and HTTP response mapping
//! - `routes`: Route handlers

pub mod app;
pub mod bot;
pub mod config;
pub mod error;
pub mod routes;
