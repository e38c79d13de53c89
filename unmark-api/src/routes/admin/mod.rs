/// Operator endpoints
///
/// Every route here sits behind the admin bearer token (see
/// `app::admin_auth_layer`).

pub mod credentials;
pub mod packages;
pub mod tasks;
pub mod users;

use serde::Deserialize;
use validator::Validate;

/// Default page size
pub const DEFAULT_LIMIT: i64 = 50;

/// `?limit=&offset=` query
#[derive(Debug, Clone, Copy, Deserialize, Validate)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 500, message = "limit must be between 1 and 500"))]
    pub limit: i64,

    #[serde(default)]
    #[validate(range(min = 0, message = "offset must not be negative"))]
    pub offset: i64,
}

fn default_limit() -> i64 {
    DEFAULT_LIMIT
}
