/// API route handlers
///
/// This module contains all route handlers organized by surface:
///
/// - `health`: Health check endpoint
/// - `callback`: Provider completion notifications
/// - `telegram`: Chat updates
/// - `admin`: Operator endpoints (credentials, users, packages, tasks)

pub mod admin;
pub mod callback;
pub mod health;
pub mod telegram;
