//! Retry wrapper for store operations that hit transient SQLite conditions
//! (a busy database file, a lock held by another connection, short I/O faults).

use std::future::Future;
use std::time::Duration;

/// Maximum number of retry attempts for database operations
pub const MAX_RETRIES: u32 = 5;

/// Check if a SQLite error is transient and should be retried
///
/// This includes:
/// - SQLITE_BUSY (5): Database locked by another connection
/// - SQLITE_LOCKED (6): Database table is locked
/// - SQLITE_IOERR (10): Base I/O error
/// - SQLITE_IOERR_READ (266), SQLITE_IOERR_SHORT_READ (522)
/// - SQLITE_BUSY_SNAPSHOT (1032)
/// - SQLITE_IOERR_WRITE (2314), SQLITE_IOERR_FSYNC (3338)
pub fn is_transient_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            let code = db_err.code().map(|c| c.to_string());
            matches!(
                code.as_deref(),
                Some("5")
                    | Some("6")
                    | Some("10")
                    | Some("266")
                    | Some("522")
                    | Some("1032")
                    | Some("2314")
                    | Some("3338")
            )
        }
        sqlx::Error::PoolTimedOut => true,
        _ => false,
    }
}

/// Unique-constraint violations signal a duplicate `external_id`
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}

/// Calculate exponential backoff delay for retry attempt
///
/// Base delay: 200ms, doubling each attempt
fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis(200 * 2u64.pow(attempt.saturating_sub(1)))
}

/// Run a store operation, retrying transient errors with exponential backoff
pub async fn with_retry<F, Fut, T>(operation: F) -> std::result::Result<T, sqlx::Error>
where
    F: Fn() -> Fut,
    Fut: Future<Output = std::result::Result<T, sqlx::Error>>,
{
    let mut attempts = 0;
    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if is_transient_error(&e) && attempts < MAX_RETRIES => {
                attempts += 1;
                let delay = backoff_delay(attempts);
                tracing::debug!(
                    error = %e,
                    attempt = attempts,
                    max_retries = MAX_RETRIES,
                    delay_ms = delay.as_millis(),
                    "Database transient error, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
