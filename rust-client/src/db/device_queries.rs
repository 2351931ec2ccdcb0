use anyhow::Result;
use sqlx::PgPool;

/// Identifiers of every registered device, as stored (no case folding).
pub async fn list_device_uids(pool: &PgPool) -> Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as("SELECT uid FROM devices ORDER BY uid")
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(|(uid,)| uid).collect())
}
