//! Assembles the full HTTP surface: the chat intake, one SSE stream per
//! agent, the session-snapshot and cancel endpoints, and the carrier-facing
//! webhook/TwiML/media-stream routes — one flat `Router` built from merged
//! per-area sub-routers, with CORS and tracing layered on last.

use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use callforge_core::AppContext;
use serde_json::{json, Value};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers::{blitz, build, call_friend, chat, inbox, queue};
use crate::media_stream;

pub fn build_router(ctx: AppContext) -> Router {
    let api = Router::new()
        .route("/chat", post(chat::chat))
        // Blitz
        .route("/blitz/stream/:id", get(blitz::stream))
        .route("/blitz/session/:id", get(blitz::get_session))
        .route("/blitz/twiml/:session/:call", post(blitz::twiml))
        .route("/blitz/tts-audio/:session/:call", get(blitz::tts_audio))
        .route("/blitz/webhook/:session/:call", post(blitz::webhook))
        .route("/blitz/amd/:session/:call", post(blitz::amd))
        .route("/blitz/recording-complete/:session/:call", post(blitz::recording_complete))
        .route("/blitz/media-stream/:session/:call", get(media_stream::blitz_media_stream))
        // Queue
        .route("/queue/stream/:id", get(queue::stream))
        .route("/queue/session/:id", get(queue::get_session))
        .route("/queue/twiml/:id", post(queue::twiml))
        .route("/queue/ivr-handler/:id", post(queue::ivr_handler))
        .route("/queue/hold-loop/:id", post(queue::hold_loop))
        .route("/queue/human-check/:id", post(queue::human_check))
        .route("/queue/webhook/:id", post(queue::webhook))
        .route("/queue/cancel/:id", post(queue::cancel))
        // CallFriend
        .route("/call_friend/stream/:id", get(call_friend::stream))
        .route("/call_friend/twiml/:id", get(call_friend::twiml))
        .route("/call_friend/webhook/:id", post(call_friend::webhook))
        .route("/call_friend/amd/:id", post(call_friend::amd))
        .route("/call_friend/media-stream/:id", get(media_stream::call_friend_media_stream))
        // Build
        .route("/build/stream/:id", get(build::stream))
        .route("/build/session/:id", get(build::get_session))
        .route("/build/preview/:preview_id", get(build::preview))
        // Inbox
        .route("/inbox/stream/:id", get(inbox::stream))
        .with_state(ctx.clone());

    Router::new()
        .nest("/api", api)
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&ctx))
}

async fn healthz() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

fn cors_layer(ctx: &AppContext) -> CorsLayer {
    let origins = ctx.settings.cors_origins.clone();
    let allow_origin = if origins.is_empty() {
        AllowOrigin::any()
    } else {
        let parsed: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any)
}
