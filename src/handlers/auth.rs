use axum::{Json, extract::State, http::HeaderMap, http::StatusCode, response::IntoResponse};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::sessions::{Session, bearer_token};
use crate::tracker::{JiraTracker, Tracker, TrackerError};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Validate credentials against the tracker and mint a session token.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let tracker = JiraTracker::new(
        &state.settings.tracker.url,
        &req.username,
        &req.password,
        state.settings.tracker.timeout_secs,
    );

    match tracker.myself().await {
        Ok(display_name) => {
            let token = state
                .sessions
                .create(&req.username, &req.password, &display_name);
            tracing::info!("login: {} connected as {display_name}", req.username);
            Ok(Json(LoginResponse {
                success: true,
                message: format!("connected as {display_name}"),
                token: Some(token),
            }))
        }
        Err(TrackerError::Auth(_)) => Ok(Json(LoginResponse {
            success: false,
            message: "invalid credentials".to_string(),
            token: None,
        })),
        Err(e) => {
            tracing::error!("login failed for {}: {e}", req.username);
            Err((StatusCode::BAD_GATEWAY, format!("tracker unreachable: {e}")))
        }
    }
}

pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if let Some(token) = bearer_token(&headers) {
        state.sessions.remove(&token);
    }
    Ok(Json(serde_json::json!({ "success": true })))
}

pub async fn session_info(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let session = bearer_token(&headers).and_then(|token| state.sessions.get(&token));
    Ok(Json(match session {
        Some(session) => serde_json::json!({
            "authenticated": true,
            "username": session.username,
            "tracker_url": state.settings.tracker.url,
        }),
        None => serde_json::json!({
            "authenticated": false,
            "tracker_url": state.settings.tracker.url,
        }),
    }))
}

/// Resolve the caller's session or reject with 401. Used by every
/// analysis/config handler.
pub fn require_session(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Session, (StatusCode, String)> {
    bearer_token(headers)
        .and_then(|token| state.sessions.get(&token))
        .ok_or_else(|| (StatusCode::UNAUTHORIZED, "not authenticated".to_string()))
}
