//! `WS /api/{blitz|call_friend}/media-stream/{session}[/{call}]` — the
//! carrier-facing half of the Media Bridge. Upgrades the inbound socket,
//! short-circuits to a demo tone loop when no conversational voice agent is
//! configured, and otherwise reads the carrier's `start`/`media`/`stop`
//! frame vocabulary, relaying audio in both directions with the
//! agent-to-carrier leg split onto its own forwarding task so a blocked
//! `send` never stalls the read loop.

use std::sync::Arc;

use axum::extract::ws::{Message as AxumMessage, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use callforge_core::domain::Session;
use callforge_core::media_bridge::{
    BridgeOwner, CarrierMediaFrame, ConversationContext, ConversationSession,
};
use callforge_core::AppContext;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex};

pub async fn blitz_media_stream(
    ws: WebSocketUpgrade,
    State(ctx): State<AppContext>,
    Path((session_id, call_id)): Path<(String, String)>,
) -> Response {
    ws.on_upgrade(move |socket| run_bridge(socket, ctx, session_id, call_id, BridgeOwner::Blitz))
}

#[derive(Debug, serde::Deserialize)]
pub struct CallFriendStreamQuery {
    #[serde(default)]
    pub call_id: Option<String>,
}

pub async fn call_friend_media_stream(
    ws: WebSocketUpgrade,
    State(ctx): State<AppContext>,
    Path(session_id): Path<String>,
    Query(query): Query<CallFriendStreamQuery>,
) -> Response {
    let call_id = query.call_id.unwrap_or_else(|| session_id.clone());
    ws.on_upgrade(move |socket| run_bridge(socket, ctx, session_id, call_id, BridgeOwner::CallFriend))
}

async fn conversation_context(ctx: &AppContext, session_id: &str, owner: BridgeOwner) -> ConversationContext {
    match owner {
        BridgeOwner::Blitz => {
            let loaded = ctx.sessions.load::<Session>("blitz", session_id).await.ok().flatten();
            match loaded {
                Some(Session::Blitz(s)) => ConversationContext {
                    service_type: s.parsed_params.service,
                    timeframe: s.parsed_params.timeframe,
                    friend_name: None,
                    question: None,
                },
                _ => ConversationContext::default(),
            }
        }
        BridgeOwner::CallFriend => {
            let loaded = ctx.sessions.load::<Session>("call_friend", session_id).await.ok().flatten();
            match loaded {
                Some(Session::CallFriend(s)) => ConversationContext {
                    service_type: None,
                    timeframe: None,
                    friend_name: Some(s.friend_name),
                    question: Some(s.question),
                },
                _ => ConversationContext::default(),
            }
        }
    }
}

/// Drive one carrier WebSocket connection end to end: connect the AI
/// session, pump carrier frames into it, relay AI audio back, and finalize
/// the owning session once either side hangs up.
async fn run_bridge(socket: WebSocket, ctx: AppContext, session_id: String, call_id: String, owner: BridgeOwner) {
    let conv_ctx = conversation_context(&ctx, &session_id, owner).await;

    if ctx.settings.voice.elevenlabs_agent_id.is_none() {
        tracing::warn!(session_id, "ELEVENLABS_AGENT_ID not configured, closing media stream in demo mode");
        let _ = ctx
            .events
            .push(
                &session_id,
                &callforge_core::domain::Event::new(
                    "transcript",
                    json!({"call_id": call_id, "speaker": "system", "text": "Live conversation mode not configured. Please set ELEVENLABS_AGENT_ID."}),
                ),
            )
            .await;
        drop(socket);
        return;
    }

    let (conversation, read) = match ConversationSession::connect(&ctx.settings.voice, &conv_ctx).await {
        Ok(pair) => pair,
        Err(err) => {
            tracing::error!(error = %err, session_id, "failed to open elevenlabs conversation session");
            drop(socket);
            return;
        }
    };
    let conversation = Arc::new(conversation);

    let (mut ws_sink, mut ws_source) = socket.split();
    let (to_carrier_tx, mut to_carrier_rx) = mpsc::channel::<CarrierMediaFrame>(32);

    let forward_task = tokio::spawn(async move {
        while let Some(frame) = to_carrier_rx.recv().await {
            let message = json!({
                "event": "media",
                "streamSid": frame.stream_sid,
                "media": { "payload": frame.payload_b64 },
            });
            if ws_sink.send(AxumMessage::Text(message.to_string())).await.is_err() {
                break;
            }
        }
    });

    let stream_sid = Arc::new(Mutex::new(None));
    let listener = callforge_core::media_bridge::spawn_listener(
        read,
        session_id.clone(),
        call_id.clone(),
        owner,
        ctx.events.clone(),
        ctx.sessions.clone(),
        to_carrier_tx,
        stream_sid.clone(),
    );

    while let Some(Ok(message)) = ws_source.next().await {
        let text = match message {
            AxumMessage::Text(t) => t,
            AxumMessage::Close(_) => break,
            _ => continue,
        };
        let Ok(parsed) = serde_json::from_str::<Value>(&text) else { continue };
        match parsed.get("event").and_then(Value::as_str) {
            Some("start") => {
                let sid = parsed.get("start").and_then(|s| s.get("streamSid")).and_then(Value::as_str).map(str::to_string);
                *stream_sid.lock().await = sid;
                let _ = ctx
                    .events
                    .push(
                        &session_id,
                        &callforge_core::domain::Event::new(
                            "transcript",
                            json!({"call_id": call_id, "speaker": "system", "text": "Call connected. AI is now speaking..."}),
                        ),
                    )
                    .await;
            }
            Some("media") => {
                if let Some(payload) = parsed.get("media").and_then(|m| m.get("payload")).and_then(Value::as_str) {
                    let _ = conversation.send_carrier_audio(payload).await;
                }
            }
            Some("stop") => break,
            _ => {}
        }
    }

    listener.abort();
    forward_task.abort();
    conversation.close().await;
    callforge_core::media_bridge::finalize(&ctx.events, &ctx.sessions, &session_id, &call_id, owner).await;
}
