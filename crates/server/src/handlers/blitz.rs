//! Blitz HTTP surface: session snapshot, the TwiML call-control callback,
//! and the carrier's status/AMD/recording webhooks. Branches between
//! conversation-mode and playback-mode call scripts depending on whether a
//! conversational voice agent is configured.

use axum::extract::{Form, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use callforge_core::domain::{CallStatus, Session};
use callforge_core::reconciler::{apply_status_callback, extract_quote, is_answering_machine};
use callforge_core::telephony::{generate_call_script_text, render_conversation, render_playback, render_say_and_record};
use callforge_core::{AppContext, CoreError};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::ApiError;

#[derive(Debug, Serialize)]
struct CallSummary {
    business: String,
    status: CallStatus,
    result: Option<String>,
}

#[derive(Debug, Serialize)]
struct SessionResponse {
    session_id: String,
    status: String,
    businesses: Vec<callforge_core::domain::Business>,
    calls: Vec<CallSummary>,
    summary: Option<String>,
}

async fn load_blitz(ctx: &AppContext, session_id: &str) -> Result<callforge_core::domain::BlitzSession, ApiError> {
    match ctx.sessions.load::<Session>("blitz", session_id).await? {
        Some(Session::Blitz(session)) => Ok(session),
        _ => Err(ApiError(CoreError::SessionNotFound(session_id.to_string()))),
    }
}

pub async fn get_session(State(ctx): State<AppContext>, Path(session_id): Path<String>) -> Result<Json<SessionResponse>, ApiError> {
    let session = load_blitz(&ctx, &session_id).await?;
    Ok(Json(SessionResponse {
        session_id: session.id,
        status: format!("{:?}", session.status).to_lowercase(),
        businesses: session.businesses,
        calls: session.calls.into_iter().map(|c| CallSummary { business: c.business.name, status: c.status, result: c.result }).collect(),
        summary: session.summary,
    }))
}

pub async fn twiml(State(ctx): State<AppContext>, Path((session_id, call_id)): Path<(String, String)>) -> Result<Response, ApiError> {
    let session = load_blitz(&ctx, &session_id).await?;
    if !session.calls.iter().any(|c| c.id == call_id) {
        return Err(ApiError(CoreError::CallRecordNotFound(call_id)));
    }

    let service_type = session.parsed_params.service.as_deref().unwrap_or("service");
    let timeframe = session.parsed_params.timeframe.as_deref();
    let script_text = generate_call_script_text(service_type, timeframe, "availability and call-out fee");

    let backend = &ctx.settings.backend_url;
    let record_action_url = format!("{backend}/api/blitz/recording-complete/{session_id}/{call_id}");

    let markup = if ctx.settings.voice.elevenlabs_agent_id.is_some() {
        let stream_ws_url = format!("{}/api/blitz/media-stream/{session_id}/{call_id}", websocket_base(backend));
        render_conversation(&stream_ws_url, 180)
    } else if ctx.tts.get_or_synthesize(&script_text).await?.is_some() {
        let audio_url = format!("{backend}/api/blitz/tts-audio/{session_id}/{call_id}");
        render_playback(&audio_url, &record_action_url)
    } else {
        render_say_and_record(&script_text, &record_action_url)
    };

    Ok(([(header::CONTENT_TYPE, "application/xml")], markup).into_response())
}

fn websocket_base(backend_url: &str) -> String {
    if let Some(rest) = backend_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = backend_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        backend_url.to_string()
    }
}

pub async fn tts_audio(State(ctx): State<AppContext>, Path((session_id, call_id)): Path<(String, String)>) -> Result<Response, ApiError> {
    let session = load_blitz(&ctx, &session_id).await?;
    let _ = call_id;

    let service_type = session.parsed_params.service.as_deref().unwrap_or("service");
    let timeframe = session.parsed_params.timeframe.as_deref();
    let script_text = generate_call_script_text(service_type, timeframe, "availability and call-out fee");

    let audio = ctx.tts.get_or_synthesize(&script_text).await?.ok_or_else(|| ApiError(CoreError::Config("tts generation failed".to_string())))?;

    Ok((
        [(header::CONTENT_TYPE, "audio/mpeg"), (header::CONTENT_DISPOSITION, "inline"), (header::CACHE_CONTROL, "public, max-age=3600")],
        audio,
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
pub struct StatusCallbackForm {
    #[serde(rename = "CallStatus")]
    pub call_status: String,
}

pub async fn webhook(
    State(ctx): State<AppContext>,
    Path((session_id, call_id)): Path<(String, String)>,
    Form(form): Form<StatusCallbackForm>,
) -> Result<StatusCode, ApiError> {
    let mut session = load_blitz(&ctx, &session_id).await?;
    let Some(call) = session.calls.iter_mut().find(|c| c.id == call_id) else {
        return Err(ApiError(CoreError::CallRecordNotFound(call_id)));
    };
    apply_status_callback(call, &form.call_status);
    ctx.sessions.save("blitz", &session_id, &Session::Blitz(session)).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct AmdForm {
    #[serde(rename = "AnsweredBy")]
    pub answered_by: String,
}

pub async fn amd(
    State(ctx): State<AppContext>,
    Path((session_id, call_id)): Path<(String, String)>,
    Form(form): Form<AmdForm>,
) -> Result<StatusCode, ApiError> {
    if !is_answering_machine(&form.answered_by) {
        return Ok(StatusCode::NO_CONTENT);
    }

    let mut session = load_blitz(&ctx, &session_id).await?;
    let Some(call) = session.calls.iter_mut().find(|c| c.id == call_id) else {
        return Err(ApiError(CoreError::CallRecordNotFound(call_id)));
    };
    call.status = CallStatus::Failed;
    call.error = Some(format!("answered by {}", form.answered_by));
    ctx.events
        .push(&session_id, &callforge_core::domain::Event::new("call_failed", json!({"call_id": call_id, "error": call.error})))
        .await?;
    ctx.sessions.save("blitz", &session_id, &Session::Blitz(session)).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct RecordingCompleteForm {
    #[serde(rename = "RecordingUrl")]
    pub recording_url: Option<String>,
    #[serde(rename = "TranscriptionText")]
    pub transcription_text: Option<String>,
}

pub async fn recording_complete(
    State(ctx): State<AppContext>,
    Path((session_id, call_id)): Path<(String, String)>,
    Form(form): Form<RecordingCompleteForm>,
) -> Result<StatusCode, ApiError> {
    let mut session = load_blitz(&ctx, &session_id).await?;
    let Some(call) = session.calls.iter_mut().find(|c| c.id == call_id) else {
        return Err(ApiError(CoreError::CallRecordNotFound(call_id)));
    };

    call.recording_url = form.recording_url.clone();
    let transcript = form.transcription_text.clone().unwrap_or_default();
    if !transcript.trim().is_empty() {
        call.result = Some(transcript.clone());
    }
    if call.status != CallStatus::Failed {
        call.status = CallStatus::Complete;
    }

    let event_payload = json!({
        "call_id": call_id,
        "business": call.business.name,
        "result": call.result,
        "quote": extract_quote(&transcript),
    });
    ctx.events.push(&session_id, &callforge_core::domain::Event::new("call_completed", event_payload)).await?;
    ctx.sessions.save("blitz", &session_id, &Session::Blitz(session)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn stream(State(ctx): State<AppContext>, Path(session_id): Path<String>) -> impl IntoResponse {
    crate::sse::stream(ctx, session_id, super::BLITZ_TERMINAL_EVENTS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn websocket_base_rewrites_https_scheme() {
        assert_eq!(websocket_base("https://api.callforge.example"), "wss://api.callforge.example");
        assert_eq!(websocket_base("http://127.0.0.1:8080"), "ws://127.0.0.1:8080");
    }
}
