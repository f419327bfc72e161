//! Campaign rows and their conditional status updates.
//!
//! Every status change is a single `UPDATE ... WHERE status = <from>`;
//! `rows_affected() == 1` tells the caller it performed the move.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::models::{CampaignRow, KindColumn, StatusColumn};
use giveaway_core::types::NewCampaign;

pub async fn create(pool: &PgPool, campaign: &NewCampaign) -> Result<CampaignRow, sqlx::Error> {
    sqlx::query_as::<_, CampaignRow>(
        r#"
        INSERT INTO campaigns (title, description, kind, start_at, end_at, required_channels,
                               winners_count, target_chat, created_by, image_ref)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING id, title, description, kind, start_at, end_at, required_channels,
                  winners_count, target_chat, post_chat_id, post_message_id,
                  discussion_chat_id, thread_message_id, status, created_by, created_at,
                  image_ref, lock_owner, claimed_at, drawn_at, announced
        "#,
    )
    .bind(&campaign.title)
    .bind(&campaign.description)
    .bind(KindColumn::from(campaign.kind))
    .bind(campaign.start_at)
    .bind(campaign.end_at)
    .bind(&campaign.required_channels)
    .bind(campaign.winners_count)
    .bind(&campaign.target_chat)
    .bind(campaign.created_by)
    .bind(&campaign.image_ref)
    .fetch_one(pool)
    .await
}

pub async fn get_by_id(pool: &PgPool, id: i64) -> Result<Option<CampaignRow>, sqlx::Error> {
    sqlx::query_as::<_, CampaignRow>(
        r#"
        SELECT id, title, description, kind, start_at, end_at, required_channels,
               winners_count, target_chat, post_chat_id, post_message_id,
               discussion_chat_id, thread_message_id, status, created_by, created_at,
               image_ref, lock_owner, claimed_at, drawn_at, announced
        FROM campaigns
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Scheduled and Drawing campaigns, earliest deadline first.
pub async fn list_open(pool: &PgPool) -> Result<Vec<CampaignRow>, sqlx::Error> {
    sqlx::query_as::<_, CampaignRow>(
        r#"
        SELECT id, title, description, kind, start_at, end_at, required_channels,
               winners_count, target_chat, post_chat_id, post_message_id,
               discussion_chat_id, thread_message_id, status, created_by, created_at,
               image_ref, lock_owner, claimed_at, drawn_at, announced
        FROM campaigns
        WHERE status IN ('scheduled', 'drawing')
        ORDER BY end_at ASC, id ASC
        "#,
    )
    .fetch_all(pool)
    .await
}

pub async fn find_by_thread(
    pool: &PgPool,
    chat_id: i64,
    thread_message_id: i64,
) -> Result<Option<CampaignRow>, sqlx::Error> {
    sqlx::query_as::<_, CampaignRow>(
        r#"
        SELECT id, title, description, kind, start_at, end_at, required_channels,
               winners_count, target_chat, post_chat_id, post_message_id,
               discussion_chat_id, thread_message_id, status, created_by, created_at,
               image_ref, lock_owner, claimed_at, drawn_at, announced
        FROM campaigns
        WHERE kind = 'single_comment'
          AND status = 'scheduled'
          AND discussion_chat_id = $1
          AND thread_message_id = $2
        ORDER BY id DESC
        LIMIT 1
        "#,
    )
    .bind(chat_id)
    .bind(thread_message_id)
    .fetch_optional(pool)
    .await
}

pub async fn set_post_ref(
    pool: &PgPool,
    id: i64,
    post_chat_id: i64,
    post_message_id: i64,
    discussion_chat_id: Option<i64>,
    thread_message_id: Option<i64>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE campaigns
        SET post_chat_id = $2,
            post_message_id = $3,
            discussion_chat_id = $4,
            thread_message_id = $5
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(post_chat_id)
    .bind(post_message_id)
    .bind(discussion_chat_id)
    .bind(thread_message_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Moves `from -> to` atomically. `owner` is recorded with a fresh
/// `claimed_at` when given; `require_announced` adds `announced = true` to
/// the guard.
pub async fn transition(
    pool: &PgPool,
    id: i64,
    from: StatusColumn,
    to: StatusColumn,
    owner: Option<&str>,
    require_announced: bool,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE campaigns
        SET status = $3,
            lock_owner = COALESCE($4, lock_owner),
            claimed_at = CASE WHEN $4::text IS NULL THEN claimed_at ELSE now() END
        WHERE id = $1
          AND status = $2
          AND (NOT $5 OR announced)
        "#,
    )
    .bind(id)
    .bind(from)
    .bind(to)
    .bind(owner)
    .bind(require_announced)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn take_over_claim(
    pool: &PgPool,
    id: i64,
    stale_before: DateTime<Utc>,
    owner: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE campaigns
        SET lock_owner = $3, claimed_at = now()
        WHERE id = $1
          AND status = 'drawing'
          AND (lock_owner = $3 OR claimed_at IS NULL OR claimed_at < $2)
        "#,
    )
    .bind(id)
    .bind(stale_before)
    .bind(owner)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn mark_announced(pool: &PgPool, id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE campaigns
        SET announced = true
        WHERE id = $1 AND announced = false
        "#,
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn exists(pool: &PgPool, id: i64) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM campaigns WHERE id = $1)")
        .bind(id)
        .fetch_one(pool)
        .await
}
