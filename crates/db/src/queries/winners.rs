//! Winner rows.

use sqlx::PgPool;

use crate::models::WinnerRow;

/// Writes the ranked list and stamps `drawn_at` in one transaction. Nothing
/// is written unless the campaign is Drawing and has not been drawn yet.
pub async fn persist_once(
    pool: &PgPool,
    campaign_id: i64,
    winners: &[i64],
) -> Result<bool, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let stamped = sqlx::query(
        r#"
        UPDATE campaigns
        SET drawn_at = now()
        WHERE id = $1 AND status = 'drawing' AND drawn_at IS NULL
        "#,
    )
    .bind(campaign_id)
    .execute(&mut *tx)
    .await?;

    if stamped.rows_affected() != 1 {
        tx.rollback().await?;
        return Ok(false);
    }

    sqlx::query("DELETE FROM winners WHERE campaign_id = $1")
        .bind(campaign_id)
        .execute(&mut *tx)
        .await?;

    let places: Vec<i32> = (1..=winners.len() as i32).collect();
    sqlx::query(
        r#"
        INSERT INTO winners (campaign_id, user_id, place)
        SELECT $1, w.user_id, w.place
        FROM UNNEST($2::bigint[], $3::int[]) AS w(user_id, place)
        "#,
    )
    .bind(campaign_id)
    .bind(winners)
    .bind(&places)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(true)
}

pub async fn list(pool: &PgPool, campaign_id: i64) -> Result<Vec<WinnerRow>, sqlx::Error> {
    sqlx::query_as::<_, WinnerRow>(
        r#"
        SELECT user_id, place
        FROM winners
        WHERE campaign_id = $1
        ORDER BY place ASC
        "#,
    )
    .bind(campaign_id)
    .fetch_all(pool)
    .await
}
