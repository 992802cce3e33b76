//! Inbox HTTP surface: just the SSE stream. There's no dedicated session
//! snapshot route for Inbox, and with the mailbox connector out of scope
//! the stream always resolves along one of the auth-required/error
//! terminal events.

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use callforge_core::AppContext;

pub async fn stream(State(ctx): State<AppContext>, Path(session_id): Path<String>) -> impl IntoResponse {
    crate::sse::stream(ctx, session_id, super::INBOX_TERMINAL_EVENTS)
}
