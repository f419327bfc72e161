use axum::{middleware::from_fn, Router};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;

mod error;
mod middleware;
mod routes;
mod state;
mod updates;

use crate::middleware::request_id::request_id;
use crate::state::AppState;
use db::PgStore;
use giveaway_core::config::Settings;
use giveaway_core::draw::DrawEngine;
use giveaway_core::participation::Participation;
use giveaway_core::store::CampaignStore;
use giveaway_core::telegram::TelegramClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let settings = Settings::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&settings.database_url)
        .await?;
    db::migrate(&pool).await?;

    let telegram = Arc::new(TelegramClient::new(
        &settings.platform_api_url,
        &settings.bot_token,
        Duration::from_secs(settings.platform_timeout_secs),
        settings.platform_max_retries,
    )?);
    let bot = telegram.get_me().await?;
    info!(bot_id = bot.id, bot_username = %bot.username, "bot identity loaded");

    let store: Arc<dyn CampaignStore> = Arc::new(PgStore::new(pool));
    let engine = DrawEngine::new(
        store.clone(),
        telegram.clone(),
        telegram.clone(),
        settings.instance_id.clone(),
        settings.stale_claim(),
    );
    let participation = Participation::new(store.clone(), telegram.clone());

    let addr: SocketAddr = settings.api_bind.parse()?;
    let state = AppState {
        store,
        engine,
        participation,
        messenger: telegram,
        bot: Arc::new(bot),
        settings: Arc::new(settings),
    };

    let app = Router::new()
        .merge(routes::health_router(state.clone()))
        .merge(routes::public_router(state.clone()))
        .merge(routes::operator_router(state))
        .layer(from_fn(request_id));

    info!(%addr, "starting api");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
