use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::Deserialize;

use crate::AppState;
use crate::extract::rules::technology_vocabulary;
use crate::handlers::auth::require_session;
use crate::jobs::{self, ExtractionDocument, JobEnv};
use crate::models::job::{JobKind, JobStatus};
use crate::models::scoring::Weights;
use crate::models::search::{IncidentSeed, SearchOptions, VirtualIncident, parse_impact_time};
use crate::scorer;

fn job_env(state: &AppState) -> JobEnv {
    JobEnv {
        settings: state.settings.clone(),
        db: state.db.clone(),
        registry: state.registry.clone(),
    }
}

fn db_error(e: anyhow::Error) -> (StatusCode, String) {
    tracing::error!("db error: {e}");
    (StatusCode::INTERNAL_SERVER_ERROR, format!("db error: {e}"))
}

#[derive(Debug, Deserialize)]
pub struct ExtractionRequest {
    pub inc: String,
    #[serde(default)]
    pub search_options: Option<SearchOptions>,
}

/// Start an extraction + scoring job for a real incident. Returns
/// immediately with a job id for polling.
pub async fn start_extraction(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ExtractionRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let session = require_session(&state, &headers)?;

    let inc = req.inc.trim().to_uppercase();
    if !jobs::is_valid_incident_key(&inc) {
        return Err((
            StatusCode::BAD_REQUEST,
            "invalid incident key, expected INC-<number>".to_string(),
        ));
    }

    let kind = if req.search_options.is_some() {
        JobKind::Custom
    } else {
        JobKind::Standard
    };
    let options = req.search_options.unwrap_or_default();
    options
        .windows()
        .map_err(|e| (StatusCode::BAD_REQUEST, e))?;

    let job_id = uuid::Uuid::new_v4().to_string();
    state
        .db
        .create_job(
            &job_id,
            &inc,
            &options.window_before,
            kind,
            Some(&session.username),
            options.summary().as_deref(),
        )
        .map_err(db_error)?;
    tracing::info!(
        "created job {job_id} for {inc} (window {}, user {})",
        options.window_before,
        session.username
    );

    jobs::spawn_correlation_job(
        job_env(&state),
        job_id.clone(),
        IncidentSeed::Real(inc.clone()),
        options,
        session.username,
        session.password,
    );

    Ok(Json(serde_json::json!({
        "job_id": job_id,
        "message": format!("extraction started for {inc}"),
    })))
}

#[derive(Debug, Deserialize)]
pub struct ManualAnalysisRequest {
    #[serde(default)]
    pub name: Option<String>,
    pub impact_time: String,
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default)]
    pub technologies: Vec<String>,
    #[serde(default)]
    pub team: Option<String>,
    #[serde(default)]
    pub search_options: Option<SearchOptions>,
}

/// Start a job for a virtual incident described by hand instead of a
/// tracker ticket.
pub async fn start_manual_analysis(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ManualAnalysisRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let session = require_session(&state, &headers)?;

    let impact_time =
        parse_impact_time(&req.impact_time).map_err(|e| (StatusCode::BAD_REQUEST, e))?;
    let options = req.search_options.unwrap_or_default();
    options
        .windows()
        .map_err(|e| (StatusCode::BAD_REQUEST, e))?;

    let label = req
        .name
        .clone()
        .unwrap_or_else(|| "Manual analysis".to_string());
    let job_id = uuid::Uuid::new_v4().to_string();
    state
        .db
        .create_job(
            &job_id,
            &label,
            &options.window_before,
            JobKind::Manual,
            Some(&session.username),
            options.summary().as_deref(),
        )
        .map_err(db_error)?;
    tracing::info!("created manual job {job_id} ({label}) for {}", session.username);

    let seed = IncidentSeed::Virtual(VirtualIncident {
        name: req.name,
        impact_time,
        services: req.services,
        hosts: req.hosts,
        technologies: req.technologies,
        team: req.team,
    });
    jobs::spawn_correlation_job(
        job_env(&state),
        job_id.clone(),
        seed,
        options,
        session.username,
        session.password,
    );

    Ok(Json(serde_json::json!({
        "job_id": job_id,
        "message": format!("manual analysis started ({label})"),
    })))
}

pub async fn list_jobs(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    require_session(&state, &headers)?;
    let jobs = state.db.list_jobs(50).map_err(db_error)?;
    Ok(Json(serde_json::json!({ "jobs": jobs })))
}

pub async fn get_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    require_session(&state, &headers)?;
    let job = state
        .db
        .get_job(&job_id)
        .map_err(db_error)?
        .ok_or_else(|| (StatusCode::NOT_FOUND, "job not found".to_string()))?;

    let mut body = serde_json::to_value(&job).unwrap_or_default();
    if let Some(snapshot) = state.registry.snapshot(&job_id)
        && let Some(map) = body.as_object_mut()
    {
        map.insert(
            "live_progress".to_string(),
            serde_json::to_value(snapshot).unwrap_or_default(),
        );
    }
    Ok(Json(body))
}

pub async fn delete_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    require_session(&state, &headers)?;

    // Stop it first if it is still running
    if state.registry.cancel(&job_id) {
        tracing::info!("job {job_id}: cancellation requested before delete");
    }
    let deleted = state.db.delete_job(&job_id).map_err(db_error)?;
    if !deleted {
        return Err((StatusCode::NOT_FOUND, "job not found".to_string()));
    }
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ScoreRequest {
    pub job_id: String,
    #[serde(default)]
    pub weights: Option<Weights>,
}

/// Recompute the ranking of a finished job from its stored tickets, with
/// optional weight overrides. No tracker I/O.
pub async fn recalculate_score(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ScoreRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    require_session(&state, &headers)?;

    let document = load_extraction(&state, &req.job_id)?;

    let mut config = state.db.scoring_config().map_err(db_error)?;
    if let Some(weights) = req.weights {
        weights
            .validate()
            .map_err(|e| (StatusCode::BAD_REQUEST, e))?;
        config.weights = weights;
    }

    let ranking = jobs::rescore_document(&document, &config)
        .map_err(|e| (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))?;

    let ranking_json = serde_json::to_string(&ranking)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    state
        .db
        .save_ranking(&req.job_id, &config.weights.hash(), &ranking_json)
        .map_err(db_error)?;

    Ok(Json(truncate_ranking(
        serde_json::to_value(&ranking).unwrap_or_default(),
        top_results(&state),
    )))
}

/// Latest stored ranking for a job, truncated to the configured top-N.
pub async fn get_ranking(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    require_session(&state, &headers)?;

    let stored = state
        .db
        .get_latest_ranking(&job_id)
        .map_err(db_error)?
        .ok_or_else(|| (StatusCode::NOT_FOUND, "no ranking for this job".to_string()))?;
    let ranking: serde_json::Value = serde_json::from_str(&stored)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("corrupt ranking: {e}")))?;

    Ok(Json(truncate_ranking(ranking, top_results(&state))))
}

/// Full score decomposition of one candidate, recomputed on demand from
/// the stored extraction with the current config.
pub async fn get_candidate_detail(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((job_id, key)): Path<(String, String)>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    require_session(&state, &headers)?;

    let document = load_extraction(&state, &job_id)?;
    let incident = document
        .incident()
        .ok_or_else(|| (StatusCode::UNPROCESSABLE_ENTITY, "extraction has no incident".to_string()))?;
    let candidate = document
        .find(&key)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("{key} not part of this job")))?;

    let config = state.db.scoring_config().map_err(db_error)?;
    let scored = scorer::score_candidate(incident, candidate, &config);

    let mut body = serde_json::to_value(&scored).unwrap_or_default();
    if let Some(map) = body.as_object_mut() {
        map.insert(
            "tracker_url".to_string(),
            serde_json::json!(format!(
                "{}/browse/{}",
                state.settings.tracker.url.trim_end_matches('/'),
                scored.key
            )),
        );
    }
    Ok(Json(body))
}

/// Technology vocabulary, for the manual-analysis form.
pub async fn get_technologies(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    require_session(&state, &headers)?;
    Ok(Json(serde_json::json!({ "technologies": technology_vocabulary() })))
}

/// Canonical service names from the live synonym table.
pub async fn get_services(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    require_session(&state, &headers)?;
    let synonyms = state.db.service_synonyms().map_err(db_error)?;
    let services: Vec<&String> = synonyms.keys().collect();
    Ok(Json(serde_json::json!({ "services": services })))
}

fn load_extraction(
    state: &AppState,
    job_id: &str,
) -> Result<ExtractionDocument, (StatusCode, String)> {
    let stored = state
        .db
        .get_extraction(job_id)
        .map_err(db_error)?
        .ok_or_else(|| (StatusCode::NOT_FOUND, "no extraction for this job".to_string()))?;
    serde_json::from_str(&stored).map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("corrupt extraction: {e}"),
        )
    })
}

fn top_results(state: &AppState) -> usize {
    state.db.top_results().unwrap_or(20).max(1) as usize
}

fn truncate_ranking(mut ranking: serde_json::Value, top: usize) -> serde_json::Value {
    if let Some(list) = ranking.get_mut("ranking").and_then(|r| r.as_array_mut())
        && list.len() > top
    {
        list.truncate(top);
    }
    ranking
}

/// Expose cancel for running jobs without deleting them.
pub async fn cancel_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    require_session(&state, &headers)?;

    if !state.registry.cancel(&job_id) {
        return Err((StatusCode::NOT_FOUND, "job not running".to_string()));
    }
    state
        .db
        .update_job_status(&job_id, JobStatus::Cancelled, None, None, None)
        .map_err(db_error)?;
    Ok(Json(serde_json::json!({ "cancelled": true })))
}
