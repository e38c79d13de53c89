//! Package model and database operations
//!
//! Packages are purchasable bundles of attempts. They are immutable once
//! created; invoices copy the attempt count and price at purchase time.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE packages (
//!     id BIGSERIAL PRIMARY KEY,
//!     name TEXT NOT NULL,
//!     attempts INTEGER NOT NULL CHECK (attempts > 0),
//!     price_usd DOUBLE PRECISION NOT NULL CHECK (price_usd > 0),
//!     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgExecutor;

/// Purchasable bundle of attempts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Package {
    pub id: i64,
    pub name: String,
    pub attempts: i32,
    pub price_usd: f64,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPackage {
    pub name: String,
    pub attempts: i32,
    pub price_usd: f64,
}

impl Package {
    /// Inserts a package
    pub async fn create<'e, E: PgExecutor<'e>>(
        executor: E,
        data: NewPackage,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Package>(
            r#"
            INSERT INTO packages (name, attempts, price_usd)
            VALUES ($1, $2, $3)
            RETURNING id, name, attempts, price_usd, created_at
            "#,
        )
        .bind(data.name)
        .bind(data.attempts)
        .bind(data.price_usd)
        .fetch_one(executor)
        .await
    }

    /// Lists packages, cheapest first
    pub async fn list<'e, E: PgExecutor<'e>>(executor: E) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Package>(
            r#"
            SELECT id, name, attempts, price_usd, created_at
            FROM packages
            ORDER BY price_usd ASC, id ASC
            "#,
        )
        .fetch_all(executor)
        .await
    }

    /// Finds a package by id
    pub async fn find_by_id<'e, E: PgExecutor<'e>>(
        executor: E,
        id: i64,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Package>(
            r#"
            SELECT id, name, attempts, price_usd, created_at
            FROM packages
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(executor)
        .await
    }
}
