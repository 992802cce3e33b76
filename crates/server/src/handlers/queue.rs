//! Queue HTTP surface: the initial TwiML, the IVR/hold-loop/human-check
//! turns, the carrier's status callback, and the cancel/session endpoints.

use axum::extract::{Form, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use callforge_core::agents::queue;
use callforge_core::domain::{QueuePhase, Session};
use callforge_core::domain::CallStatus;
use callforge_core::reconciler::map_carrier_status;
use callforge_core::{AppContext, CoreError};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    session_id: String,
    phase: QueuePhase,
    business: String,
    phone: String,
    hold_elapsed: i64,
    human_detected: bool,
    error: Option<String>,
}

async fn load(ctx: &AppContext, session_id: &str) -> Result<callforge_core::domain::QueueSession, ApiError> {
    match ctx.sessions.load::<Session>("queue", session_id).await? {
        Some(Session::Queue(session)) => Ok(session),
        _ => Err(ApiError(CoreError::SessionNotFound(session_id.to_string()))),
    }
}

pub async fn get_session(State(ctx): State<AppContext>, Path(session_id): Path<String>) -> Result<Json<SessionResponse>, ApiError> {
    let session = load(&ctx, &session_id).await?;
    Ok(Json(SessionResponse {
        session_id: session.id,
        phase: session.phase,
        business: session.business_name,
        phone: session.phone,
        hold_elapsed: session.hold_elapsed_s,
        human_detected: session.human_detected,
        error: session.error,
    }))
}

fn xml(markup: String) -> Response {
    ([(header::CONTENT_TYPE, "application/xml")], markup).into_response()
}

pub async fn twiml(State(ctx): State<AppContext>, Path(session_id): Path<String>) -> Response {
    let base = &ctx.settings.backend_url;
    let ivr_url = format!("{base}/api/queue/ivr-handler/{session_id}");
    let hold_url = format!("{base}/api/queue/hold-loop/{session_id}");
    xml(queue::render_initial_twiml(&ivr_url, &hold_url))
}

#[derive(Debug, Deserialize)]
pub struct IvrHandlerForm {
    #[serde(rename = "SpeechResult", default)]
    pub speech_result: Option<String>,
    #[serde(rename = "Digits", default)]
    pub digits: Option<String>,
}

pub async fn ivr_handler(State(ctx): State<AppContext>, Path(session_id): Path<String>, Form(form): Form<IvrHandlerForm>) -> Result<Response, ApiError> {
    let heard = form.speech_result.or(form.digits).unwrap_or_default();
    let markup = queue::handle_ivr_turn(&ctx, &session_id, &heard).await?;
    Ok(xml(markup))
}

pub async fn hold_loop(State(ctx): State<AppContext>, Path(session_id): Path<String>) -> Response {
    let base = &ctx.settings.backend_url;
    let hold_url = format!("{base}/api/queue/hold-loop/{session_id}");
    let human_check_url = format!("{base}/api/queue/human-check/{session_id}");
    xml(queue::render_hold_loop(&human_check_url, &hold_url))
}

#[derive(Debug, Deserialize)]
pub struct HumanCheckForm {
    #[serde(rename = "SpeechResult", default)]
    pub speech_result: Option<String>,
}

pub async fn human_check(State(ctx): State<AppContext>, Path(session_id): Path<String>, Form(form): Form<HumanCheckForm>) -> Result<Response, ApiError> {
    let transcript = form.speech_result.unwrap_or_default();
    let markup = queue::handle_human_check(&ctx, &session_id, &transcript).await?;
    Ok(xml(markup))
}

#[derive(Debug, Deserialize)]
pub struct StatusCallbackForm {
    #[serde(rename = "CallStatus")]
    pub call_status: String,
}

pub async fn webhook(State(ctx): State<AppContext>, Path(session_id): Path<String>, Form(form): Form<StatusCallbackForm>) -> Result<StatusCode, ApiError> {
    let Some(Session::Queue(mut session)) = ctx.sessions.load::<Session>("queue", &session_id).await? else {
        return Ok(StatusCode::NO_CONTENT);
    };

    let carrier_status = map_carrier_status(&form.call_status);
    if carrier_status.is_terminal() && !session.phase.is_terminal() {
        let next = if carrier_status == CallStatus::Complete { QueuePhase::Completed } else { QueuePhase::Failed };
        if session.try_advance(next) {
            session.completed_at = Some(chrono::Utc::now());
            if next == QueuePhase::Failed {
                session.error = Some(format!("call ended: {}", form.call_status));
            }
        }
    }

    ctx.sessions.save("queue", &session_id, &Session::Queue(session)).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    status: String,
    message: String,
}

pub async fn cancel(State(ctx): State<AppContext>, Path(session_id): Path<String>) -> Json<CancelResponse> {
    match queue::cancel(&ctx, &session_id).await {
        Ok(()) => Json(CancelResponse { status: "cancelled".to_string(), message: "Queue cancelled. Call has been hung up.".to_string() }),
        Err(CoreError::SessionNotFound(_)) => {
            Json(CancelResponse { status: "not_found".to_string(), message: "Queue session not found.".to_string() })
        }
        Err(err) => Json(CancelResponse { status: "error".to_string(), message: err.to_string() }),
    }
}

pub async fn stream(State(ctx): State<AppContext>, Path(session_id): Path<String>) -> impl IntoResponse {
    crate::sse::stream(ctx, session_id, super::QUEUE_TERMINAL_EVENTS)
}
