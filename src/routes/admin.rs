use crate::{
    handlers::admin::{reingest_race, schedule},
    utils::state::AppState,
};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

pub fn admin_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/races/{season}/{round}/reingest", post(reingest_race))
        .route("/schedule", get(schedule))
        .with_state(state)
}
