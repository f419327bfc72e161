//! Entry rows.
//!
//! Inserts lock the campaign row `FOR SHARE` and require it to be Scheduled,
//! so a concurrent claim either waits for the insert to commit or makes it a
//! no-op. Once a campaign is Drawing its entry set can no longer grow.

use sqlx::PgPool;

use crate::models::EntryRow;

/// Returns true when a new row was written; false for a duplicate or a
/// campaign that is not Scheduled.
pub async fn insert_if_open(
    pool: &PgPool,
    campaign_id: i64,
    user_id: i64,
    username: Option<&str>,
    first_name: Option<&str>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO entries (campaign_id, user_id, username, first_name)
        SELECT c.id, $2, $3, $4
        FROM campaigns c
        WHERE c.id = $1 AND c.status = 'scheduled'
        FOR SHARE
        ON CONFLICT (campaign_id, user_id) DO NOTHING
        "#,
    )
    .bind(campaign_id)
    .bind(user_id)
    .bind(username)
    .bind(first_name)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn exists(pool: &PgPool, campaign_id: i64, user_id: i64) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM entries WHERE campaign_id = $1 AND user_id = $2
        )
        "#,
    )
    .bind(campaign_id)
    .bind(user_id)
    .fetch_one(pool)
    .await
}

pub async fn count(pool: &PgPool, campaign_id: i64) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM entries WHERE campaign_id = $1")
        .bind(campaign_id)
        .fetch_one(pool)
        .await
}

pub async fn list(pool: &PgPool, campaign_id: i64) -> Result<Vec<EntryRow>, sqlx::Error> {
    sqlx::query_as::<_, EntryRow>(
        r#"
        SELECT campaign_id, user_id, username, first_name, joined_at
        FROM entries
        WHERE campaign_id = $1
        ORDER BY joined_at ASC, user_id ASC
        "#,
    )
    .bind(campaign_id)
    .fetch_all(pool)
    .await
}
