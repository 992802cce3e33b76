//! CallFriend HTTP surface: the TwiML that opens the media stream, the
//! carrier's status callback, and its AMD callback. There's no original
//! route file to ground against (`api/call_friend.py` is a stub in the
//! source this was distilled from) — these routes are built purely from
//! the URLs `callforge_core::agents::call_friend::run` already constructs,
//! mirroring the shape of the Blitz/Queue routes above.

use axum::extract::{Form, Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use callforge_core::domain::{CallFriendPhase, Session};
use callforge_core::reconciler::{is_answering_machine, map_carrier_status};
use callforge_core::telephony::render_conversation;
use callforge_core::AppContext;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct TwimlQuery {
    pub stream_url: String,
}

pub async fn twiml(Query(query): Query<TwimlQuery>) -> Response {
    let markup = render_conversation(&query.stream_url, 180);
    ([(header::CONTENT_TYPE, "application/xml")], markup).into_response()
}

#[derive(Debug, Deserialize)]
pub struct StatusCallbackForm {
    #[serde(rename = "CallStatus")]
    pub call_status: String,
}

pub async fn webhook(State(ctx): State<AppContext>, Path(session_id): Path<String>, Form(form): Form<StatusCallbackForm>) -> axum::http::StatusCode {
    let Ok(Some(Session::CallFriend(mut session))) = ctx.sessions.load::<Session>("call_friend", &session_id).await else {
        return axum::http::StatusCode::NO_CONTENT;
    };

    let carrier_status = map_carrier_status(&form.call_status);
    if carrier_status.is_terminal() && !session.phase.is_terminal() {
        session.phase = match form.call_status.to_lowercase().as_str() {
            "no-answer" | "busy" => CallFriendPhase::NoAnswer,
            "completed" => session.phase,
            _ => CallFriendPhase::Failed,
        };
        if session.phase.is_terminal() {
            session.completed_at = Some(chrono::Utc::now());
        }
    }

    let _ = ctx.sessions.save("call_friend", &session_id, &Session::CallFriend(session)).await;
    axum::http::StatusCode::NO_CONTENT
}

#[derive(Debug, Deserialize)]
pub struct AmdForm {
    #[serde(rename = "AnsweredBy")]
    pub answered_by: String,
}

pub async fn amd(State(ctx): State<AppContext>, Path(session_id): Path<String>, Form(form): Form<AmdForm>) -> axum::http::StatusCode {
    if !is_answering_machine(&form.answered_by) {
        return axum::http::StatusCode::NO_CONTENT;
    }

    let Ok(Some(Session::CallFriend(mut session))) = ctx.sessions.load::<Session>("call_friend", &session_id).await else {
        return axum::http::StatusCode::NO_CONTENT;
    };
    if !session.phase.is_terminal() {
        session.phase = CallFriendPhase::NoAnswer;
        session.error = Some(format!("answered by {}", form.answered_by));
        session.completed_at = Some(chrono::Utc::now());
        let carrier_sid = session.carrier_sid.clone();
        let _ = ctx.sessions.save("call_friend", &session_id, &Session::CallFriend(session)).await;
        if let Some(sid) = carrier_sid {
            let _ = ctx.telephony.hangup(&sid).await;
        }
    }
    axum::http::StatusCode::NO_CONTENT
}

pub async fn stream(State(ctx): State<AppContext>, Path(session_id): Path<String>) -> impl IntoResponse {
    crate::sse::stream(ctx, session_id, super::CALL_FRIEND_TERMINAL_EVENTS)
}
