use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WhoAmIResponse {
    bot_id: i64,
    bot_username: String,
    instance_id: String,
    env: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/whoami", get(whoami))
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn whoami(State(state): State<AppState>) -> Json<WhoAmIResponse> {
    Json(WhoAmIResponse {
        bot_id: state.bot.id,
        bot_username: state.bot.username.clone(),
        instance_id: state.settings.instance_id.clone(),
        env: state.settings.giveaway_env.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::fixture;

    #[tokio::test]
    async fn test_whoami_reports_startup_identity() {
        let fx = fixture();
        let Json(resp) = whoami(State(fx.state)).await;

        assert_eq!(resp.bot_username, "prize_bot");
        assert_eq!(resp.bot_id, 42);
        assert_eq!(resp.instance_id, "api-test");
    }
}
