pub mod campaigns;
pub mod health;
pub mod join;
pub mod webhook;

use axum::{middleware::from_fn_with_state, Router};

use crate::middleware::{cors::cors, operator::operator_auth};
use crate::state::AppState;

/// Mini-app and platform-facing routes.
pub fn public_router(state: AppState) -> Router {
    Router::new()
        .merge(join::router(state.clone()).layer(from_fn_with_state(state.clone(), cors)))
        .merge(webhook::router(state))
}

pub fn operator_router(state: AppState) -> Router {
    campaigns::router(state.clone()).layer(from_fn_with_state(state, operator_auth))
}

pub fn health_router(state: AppState) -> Router {
    health::router(state)
}
