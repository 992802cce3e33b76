//! SSE Gateway: one manual stream implementation shared by every
//! `/api/{agent}/stream/{id}` route — blocking pop with a keepalive on
//! timeout, closing the stream once a popped event matches the caller's
//! terminal-event set.

use std::convert::Infallible;

use axum::response::sse::{Event as SseEvent, Sse};
use axum::response::{IntoResponse, Response};
use callforge_core::AppContext;
use futures::stream;

const POP_TIMEOUT_SECONDS: u64 = 30;

enum State {
    Running { ctx: AppContext, session_id: String, terminal: &'static [&'static str] },
    Done,
}

/// Poll the session's event queue until a terminal event is popped, the
/// queue errors out, or the client goes away (axum stops polling the stream
/// and drops it — that's the "close silently on disconnect" behavior, no
/// extra bookkeeping needed here).
pub fn stream(ctx: AppContext, session_id: String, terminal: &'static [&'static str]) -> Response {
    let initial = State::Running { ctx, session_id, terminal };

    let events = stream::unfold(initial, |state| async move {
        let State::Running { ctx, session_id, terminal } = state else { return None };

        match ctx.events.pop(&session_id, POP_TIMEOUT_SECONDS).await {
            Ok(Some(event)) => {
                let is_terminal = terminal.contains(&event.event_type.as_str());
                let data = serde_json::to_string(&event.payload).unwrap_or_else(|_| "{}".to_string());
                let sse_event = SseEvent::default().event(event.event_type.clone()).data(data);
                let next = if is_terminal { State::Done } else { State::Running { ctx, session_id, terminal } };
                Some((Ok(sse_event), next))
            }
            Ok(None) => {
                let sse_event = SseEvent::default().comment("keepalive");
                Some((Ok(sse_event), State::Running { ctx, session_id, terminal }))
            }
            Err(err) => {
                tracing::error!(error = %err, session_id, "event bus pop failed, closing stream");
                let data = serde_json::json!({ "message": err.to_string() }).to_string();
                Some((Ok(SseEvent::default().event("error").data(data)), State::Done))
            }
        }
    });

    // Reverse-proxy-friendly headers: keep intermediaries from buffering or
    // caching a stream that's meant to trickle events out one at a time.
    let mut response = Sse::new(events).into_response();
    let headers = response.headers_mut();
    headers.insert(axum::http::header::CACHE_CONTROL, axum::http::HeaderValue::from_static("no-cache"));
    headers.insert("x-accel-buffering", axum::http::HeaderValue::from_static("no"));
    response
}
