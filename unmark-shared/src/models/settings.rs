//! Store-wide settings
//!
//! A single-row table holding the auto-switch toggle that decides whether a
//! failed submission rotates the active credential, and the number of
//! submissions that failed in a row since the last accepted one.

use sqlx::PgExecutor;

/// Reads the store-wide auto-switch flag
///
/// A missing row reads as enabled, which is also the migration default.
pub async fn auto_switch_enabled<'e, E: PgExecutor<'e>>(executor: E) -> Result<bool, sqlx::Error> {
    let flag: Option<bool> = sqlx::query_scalar("SELECT auto_switch FROM settings WHERE id")
        .fetch_optional(executor)
        .await?;

    Ok(flag.unwrap_or(true))
}

/// Writes the store-wide auto-switch flag and returns the stored value
pub async fn set_auto_switch<'e, E: PgExecutor<'e>>(
    executor: E,
    enabled: bool,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar(
        "INSERT INTO settings (id, auto_switch) VALUES (TRUE, $1)
         ON CONFLICT (id) DO UPDATE SET auto_switch = EXCLUDED.auto_switch
         RETURNING auto_switch",
    )
    .bind(enabled)
    .fetch_one(executor)
    .await
}

/// Adds one to the consecutive submission failure count and returns the new value
pub async fn record_submission_failure<'e, E: PgExecutor<'e>>(
    executor: E,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        "INSERT INTO settings (id, consecutive_failures) VALUES (TRUE, 1)
         ON CONFLICT (id) DO UPDATE SET consecutive_failures = settings.consecutive_failures + 1
         RETURNING consecutive_failures",
    )
    .fetch_one(executor)
    .await
}

/// Clears the consecutive submission failure count
pub async fn reset_submission_failures<'e, E: PgExecutor<'e>>(
    executor: E,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE settings SET consecutive_failures = 0 WHERE id AND consecutive_failures <> 0")
        .execute(executor)
        .await?;

    Ok(())
}
