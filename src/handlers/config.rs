use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::AppState;
use crate::handlers::auth::require_session;
use crate::models::scoring::{Bonuses, Penalties, Thresholds, Weights};

fn db_error(e: anyhow::Error) -> (StatusCode, String) {
    tracing::error!("db error: {e}");
    (StatusCode::INTERNAL_SERVER_ERROR, format!("db error: {e}"))
}

/// Combined view of everything the scorer is configured with.
pub async fn get_config(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    require_session(&state, &headers)?;
    let config = state.db.scoring_config().map_err(db_error)?;
    let top_results = state.db.top_results().map_err(db_error)?;
    Ok(Json(serde_json::json!({
        "weights": config.weights,
        "penalties": config.penalties,
        "bonuses": config.bonuses,
        "thresholds": config.thresholds,
        "synonyms": config.service_synonyms,
        "groups": config.related_groups,
        "top_results": top_results,
    })))
}

pub async fn get_weights(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    require_session(&state, &headers)?;
    let weights = state.db.weights().map_err(db_error)?;
    Ok(Json(serde_json::json!({ "weights": weights })))
}

pub async fn put_weights(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(weights): Json<Weights>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    require_session(&state, &headers)?;
    weights
        .validate()
        .map_err(|e| (StatusCode::BAD_REQUEST, e))?;
    state.db.set_weights(&weights).map_err(db_error)?;
    Ok(Json(serde_json::json!({ "weights": weights })))
}

pub async fn get_penalties(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    require_session(&state, &headers)?;
    let penalties = state.db.penalties().map_err(db_error)?;
    Ok(Json(serde_json::json!({ "penalties": penalties })))
}

pub async fn put_penalties(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(penalties): Json<Penalties>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    require_session(&state, &headers)?;
    penalties
        .validate()
        .map_err(|e| (StatusCode::BAD_REQUEST, e))?;
    state.db.set_penalties(&penalties).map_err(db_error)?;
    Ok(Json(serde_json::json!({ "penalties": penalties })))
}

pub async fn get_bonuses(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    require_session(&state, &headers)?;
    let bonuses = state.db.bonuses().map_err(db_error)?;
    Ok(Json(serde_json::json!({ "bonuses": bonuses })))
}

pub async fn put_bonuses(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(bonuses): Json<Bonuses>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    require_session(&state, &headers)?;
    bonuses
        .validate()
        .map_err(|e| (StatusCode::BAD_REQUEST, e))?;
    state.db.set_bonuses(&bonuses).map_err(db_error)?;
    Ok(Json(serde_json::json!({ "bonuses": bonuses })))
}

pub async fn get_thresholds(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    require_session(&state, &headers)?;
    let thresholds = state.db.thresholds().map_err(db_error)?;
    Ok(Json(serde_json::json!({ "thresholds": thresholds })))
}

pub async fn put_thresholds(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(thresholds): Json<Thresholds>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    require_session(&state, &headers)?;
    thresholds
        .validate()
        .map_err(|e| (StatusCode::BAD_REQUEST, e))?;
    state.db.set_thresholds(&thresholds).map_err(db_error)?;
    Ok(Json(serde_json::json!({ "thresholds": thresholds })))
}

#[derive(Debug, Deserialize)]
pub struct TopResultsRequest {
    pub top_results: i64,
}

pub async fn get_top_results(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    require_session(&state, &headers)?;
    let top = state.db.top_results().map_err(db_error)?;
    Ok(Json(serde_json::json!({ "top_results": top })))
}

pub async fn put_top_results(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<TopResultsRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    require_session(&state, &headers)?;
    if !(5..=200).contains(&req.top_results) {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("top_results must be in [5, 200], got {}", req.top_results),
        ));
    }
    state.db.set_top_results(req.top_results).map_err(db_error)?;
    Ok(Json(serde_json::json!({ "top_results": req.top_results })))
}

#[derive(Debug, Deserialize)]
pub struct SynonymsRequest {
    pub synonyms: BTreeMap<String, Vec<String>>,
}

pub async fn get_synonyms(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    require_session(&state, &headers)?;
    let synonyms = state.db.service_synonyms().map_err(db_error)?;
    Ok(Json(serde_json::json!({ "synonyms": synonyms })))
}

/// Replace the synonym table. Jobs snapshot the table when they start, so
/// an update never changes a run already in flight.
pub async fn put_synonyms(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SynonymsRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    require_session(&state, &headers)?;
    let synonyms: BTreeMap<String, Vec<String>> = req
        .synonyms
        .into_iter()
        .map(|(canonical, aliases)| {
            (
                canonical.trim().to_lowercase(),
                aliases
                    .into_iter()
                    .map(|a| a.trim().to_lowercase())
                    .filter(|a| !a.is_empty())
                    .collect(),
            )
        })
        .filter(|(canonical, _): &(String, Vec<String>)| !canonical.is_empty())
        .collect();
    state.db.set_service_synonyms(&synonyms).map_err(db_error)?;
    Ok(Json(serde_json::json!({ "synonyms": synonyms })))
}

#[derive(Debug, Deserialize)]
pub struct GroupsRequest {
    pub groups: BTreeMap<String, BTreeSet<String>>,
}

pub async fn get_groups(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    require_session(&state, &headers)?;
    let groups = state.db.related_groups().map_err(db_error)?;
    Ok(Json(serde_json::json!({ "groups": groups })))
}

pub async fn put_groups(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<GroupsRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    require_session(&state, &headers)?;
    let groups: BTreeMap<String, BTreeSet<String>> = req
        .groups
        .into_iter()
        .map(|(group, services)| {
            (
                group.trim().to_lowercase(),
                services
                    .into_iter()
                    .map(|s| s.trim().to_lowercase())
                    .filter(|s| !s.is_empty())
                    .collect(),
            )
        })
        .filter(|(group, _): &(String, BTreeSet<String>)| !group.is_empty())
        .collect();
    state.db.set_related_groups(&groups).map_err(db_error)?;
    Ok(Json(serde_json::json!({ "groups": groups })))
}
