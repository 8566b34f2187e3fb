use crate::db::models::{PendingCeremony, PendingCeremonyRow};
use crate::error::AppResult;
use crate::webauthn::challenge::Challenge;
use sqlx::{SqliteExecutor, SqlitePool};

pub async fn save_ceremony(
    executor: impl SqliteExecutor<'_>,
    ceremony: &PendingCeremony,
) -> AppResult<()> {
    let row = ceremony.to_row()?;

    sqlx::query(
        "INSERT INTO pending_ceremonies
         (challenge, kind, user_id, allowed_credential_ids, created_at, expires_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind(&row.challenge)
    .bind(&row.kind)
    .bind(&row.user_id)
    .bind(&row.allowed_credential_ids)
    .bind(row.created_at)
    .bind(row.expires_at)
    .execute(executor)
    .await?;

    Ok(())
}

/// Remove and return the live ceremony for `challenge`.
///
/// Lookup and deletion are one statement, so two verifiers racing on the same
/// challenge cannot both get it. Expired rows are not returned (the sweeper
/// deletes them).
pub async fn take_ceremony(
    executor: impl SqliteExecutor<'_>,
    challenge: &Challenge,
    now: i64,
) -> AppResult<Option<PendingCeremony>> {
    let row = sqlx::query_as::<_, PendingCeremonyRow>(
        "DELETE FROM pending_ceremonies
         WHERE challenge = ? AND expires_at > ?
         RETURNING challenge, kind, user_id, allowed_credential_ids, created_at, expires_at",
    )
    .bind(challenge.as_bytes())
    .bind(now)
    .fetch_optional(executor)
    .await?;

    row.map(PendingCeremony::try_from).transpose()
}

// Cleanup expired ceremonies (run periodically from main)
pub async fn cleanup_expired_ceremonies(pool: &SqlitePool, now: i64) -> AppResult<u64> {
    let result = sqlx::query("DELETE FROM pending_ceremonies WHERE expires_at <= ?")
        .bind(now)
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}
