//! # Credential Database Operations
//!
//! Enrolled passkeys, keyed by credential id.
//!
//! ## Security Note
//! Only public keys are stored - private keys never leave the user's device.

use crate::db::models::{NewCredential, StoredCredential};
use crate::error::{AppError, AppResult};
use chrono::Utc;
use sqlx::SqliteExecutor;

/// Save a newly registered credential
///
/// The primary key makes a second registration of the same credential id
/// fail; that failure is reported as [`AppError::DuplicateCredential`]
/// rather than a database error.
pub async fn save_credential(
    executor: impl SqliteExecutor<'_>,
    credential: &NewCredential,
) -> AppResult<()> {
    let row = credential.to_row()?;

    sqlx::query(
        "INSERT INTO credentials
         (credential_id, user_id, user_handle, public_key, algorithm, sign_count, transports, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&row.credential_id)
    .bind(&row.user_id)
    .bind(&row.user_handle)
    .bind(&row.public_key)
    .bind(row.algorithm)
    .bind(row.sign_count)
    .bind(&row.transports)
    .bind(&row.created_at)
    .execute(executor)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(db) if db.is_unique_violation() => AppError::DuplicateCredential,
        e => AppError::Database(e),
    })?;

    Ok(())
}

/// Find a specific credential by its ID
///
/// `None` if no credential with this id was ever registered.
pub async fn find_by_credential_id(
    executor: impl SqliteExecutor<'_>,
    credential_id: &str,
) -> AppResult<Option<StoredCredential>> {
    let credential = sqlx::query_as::<_, StoredCredential>(
        "SELECT * FROM credentials WHERE credential_id = ?",
    )
    .bind(credential_id)
    .fetch_optional(executor)
    .await?;

    Ok(credential)
}

/// Record the counter from a successful authentication
///
/// The update only applies if the counter moves forward (or both the stored
/// and the new value are zero, meaning the authenticator has no counter).
/// Returns `false` when another request already advanced it as far, which the
/// caller must treat as a replay.
pub async fn advance_counter(
    executor: impl SqliteExecutor<'_>,
    credential_id: &str,
    new_counter: u32,
) -> AppResult<bool> {
    let now = Utc::now().to_rfc3339();
    let new_counter = i64::from(new_counter);

    let result = sqlx::query(
        "UPDATE credentials
         SET sign_count = ?, last_used_at = ?
         WHERE credential_id = ?
           AND (sign_count < ? OR (sign_count = 0 AND ? = 0))",
    )
    .bind(new_counter)
    .bind(now)
    .bind(credential_id)
    .bind(new_counter)
    .bind(new_counter)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() == 1)
}
