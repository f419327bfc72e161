//! Referral rows. Same Scheduled guard as entries.

use sqlx::PgPool;

use crate::models::ReferralCountRow;

/// Returns true when the referral was recorded.
pub async fn insert_if_open(
    pool: &PgPool,
    campaign_id: i64,
    referrer_id: i64,
    referred_id: i64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO referrals (campaign_id, referrer_id, referred_id)
        SELECT c.id, $2, $3
        FROM campaigns c
        WHERE c.id = $1 AND c.status = 'scheduled'
        FOR SHARE
        ON CONFLICT (campaign_id, referred_id) DO NOTHING
        "#,
    )
    .bind(campaign_id)
    .bind(referrer_id)
    .bind(referred_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn is_referred(
    pool: &PgPool,
    campaign_id: i64,
    referred_id: i64,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM referrals WHERE campaign_id = $1 AND referred_id = $2
        )
        "#,
    )
    .bind(campaign_id)
    .bind(referred_id)
    .fetch_one(pool)
    .await
}

pub async fn count_for_referrer(
    pool: &PgPool,
    campaign_id: i64,
    referrer_id: i64,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM referrals WHERE campaign_id = $1 AND referrer_id = $2",
    )
    .bind(campaign_id)
    .bind(referrer_id)
    .fetch_one(pool)
    .await
}

/// Referred count per referrer, highest first.
pub async fn counts(pool: &PgPool, campaign_id: i64) -> Result<Vec<ReferralCountRow>, sqlx::Error> {
    sqlx::query_as::<_, ReferralCountRow>(
        r#"
        SELECT referrer_id, COUNT(*) AS referred
        FROM referrals
        WHERE campaign_id = $1
        GROUP BY referrer_id
        ORDER BY referred DESC, referrer_id ASC
        "#,
    )
    .bind(campaign_id)
    .fetch_all(pool)
    .await
}
