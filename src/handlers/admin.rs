use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use http::StatusCode;
use serde_json::json;

use crate::models::error::Error;
use crate::models::race::RaceKey;
use crate::services::ingestion::IngestOutcome;
use crate::utils::state::AppState;

/// Force re-ingest of one race. Always answers with a plain status line.
pub async fn reingest_race(
    State(state): State<Arc<AppState>>,
    Path((season, round)): Path<(i32, u32)>,
) -> impl IntoResponse {
    let key = RaceKey::new(season, round);
    let response = match state.ingestion.force_reingest(key).await {
        Ok(outcome @ IngestOutcome::NoData(_)) => (StatusCode::ACCEPTED, outcome.to_string()),
        Ok(outcome) => (StatusCode::OK, outcome.to_string()),
        Err(err) => (err.status_code(), format!("Race {key} not ingested: {err}")),
    };
    state.scheduler.request_replan();
    response
}

pub async fn schedule(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, Error> {
    let plan = state
        .scheduler
        .current_plan()
        .ok_or((StatusCode::NOT_FOUND, "No wake planned yet"))?;
    Ok((
        StatusCode::OK,
        Json(json!({
            "at": plan.at.to_rfc3339(),
            "reason": format!("{:?}", plan.reason),
            "target": plan.target.map(|k| json!({"season": k.season, "round": k.round})),
        })),
    ))
}
