use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use db::PgStore;
use giveaway_core::config::Settings;
use giveaway_core::draw::DrawEngine;
use giveaway_core::store::CampaignStore;
use giveaway_core::telegram::TelegramClient;

mod scheduler;

use crate::scheduler::Scheduler;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let settings = Settings::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&settings.database_url)
        .await?;
    db::migrate(&pool).await?;

    let telegram = Arc::new(TelegramClient::new(
        &settings.platform_api_url,
        &settings.bot_token,
        Duration::from_secs(settings.platform_timeout_secs),
        settings.platform_max_retries,
    )?);
    let store: Arc<dyn CampaignStore> = Arc::new(PgStore::new(pool));
    let engine = DrawEngine::new(
        store,
        telegram.clone(),
        telegram,
        settings.instance_id.clone(),
        settings.stale_claim(),
    );
    let scheduler = Scheduler::new(engine);

    let report = scheduler.rescan().await?;
    info!(
        instance = %settings.instance_id,
        drawn = report.drawn,
        armed = report.armed,
        held_elsewhere = report.held_elsewhere,
        failed = report.failed,
        timers = scheduler.armed().await.len(),
        "startup recovery complete"
    );

    let interval = Duration::from_secs(settings.rescan_interval_secs.max(1));
    tokio::select! {
        _ = scheduler.run(interval) => {}
        _ = tokio::signal::ctrl_c() => info!("shutdown requested"),
    }
    scheduler.shutdown().await;

    Ok(())
}
