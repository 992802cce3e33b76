//! Build HTTP surface: session snapshot, the SSE stream, and the rendered
//! preview endpoint, served with a locked-down content-security-policy
//! header and looked up by its `build:preview:{id}` key.

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use callforge_core::domain::{BuildStatus, Session};
use callforge_core::{AppContext, CoreError};
use serde::Serialize;

use crate::error::ApiError;

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    session_id: String,
    status: BuildStatus,
    preview_id: Option<String>,
    summary: Option<String>,
    features: Vec<String>,
    error: Option<String>,
}

async fn load(ctx: &AppContext, session_id: &str) -> Result<callforge_core::domain::BuildSession, ApiError> {
    match ctx.sessions.load::<Session>("build", session_id).await? {
        Some(Session::Build(session)) => Ok(session),
        _ => Err(ApiError(CoreError::SessionNotFound(session_id.to_string()))),
    }
}

pub async fn get_session(State(ctx): State<AppContext>, Path(session_id): Path<String>) -> Result<Json<SessionResponse>, ApiError> {
    let session = load(&ctx, &session_id).await?;
    Ok(Json(SessionResponse {
        session_id: session.id,
        status: session.status,
        preview_id: session.preview_id,
        summary: session.summary,
        features: session.features,
        error: session.error,
    }))
}

/// `GET /api/build/preview/{preview_id}` — the stored HTML, served with a
/// CSP tight enough to neutralize anything an LLM-generated page might try
/// to sneak past the "no JavaScript" instruction in its own system prompt.
pub async fn preview(State(ctx): State<AppContext>, Path(preview_id): Path<String>) -> Result<Response, ApiError> {
    let key = format!("build:preview:{preview_id}");
    let html = ctx
        .kv
        .get(&key)
        .await?
        .ok_or_else(|| ApiError(CoreError::SessionNotFound(preview_id.clone())))?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/html; charset=utf-8"),
            (header::CONTENT_SECURITY_POLICY, "script-src 'none'; object-src 'none'"),
        ],
        html,
    )
        .into_response())
}

pub async fn stream(State(ctx): State<AppContext>, Path(session_id): Path<String>) -> impl IntoResponse {
    crate::sse::stream(ctx, session_id, super::BUILD_TERMINAL_EVENTS)
}
