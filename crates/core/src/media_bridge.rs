//! Media Bridge: bidirectional audio relay between the carrier's media
//! stream and the conversational voice agent (ElevenLabs Conversational AI).
//! Speaks the agent's message vocabulary (`user_audio_chunk` out,
//! `audio`/`user_transcript`/`agent_response`/`conversation_end`/`error`
//! in) over a split `tokio-tungstenite` socket, with one background task
//! listening to the AI session while the foreground pumps carrier frames —
//! the carrier side is abstracted behind a channel so this crate never
//! touches an axum `WebSocket` directly.
//!
//! Every transcript line is persisted onto the owning session before it's
//! emitted as an event, so a poll-based wait like `agents::call_friend`'s
//! actually observes it rather than relying on an in-process list that
//! outlives nothing.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::config::VoiceConfig;
use crate::domain::{CallFriendPhase, CallStatus, Session, TranscriptEntry, TranscriptRole};
use crate::error::{CoreError, Result};
use crate::event_bus::EventBus;
use crate::session_store::SessionStore;

const ELEVENLABS_CONV_WS_URL: &str = "wss://api.elevenlabs.io/v1/convai/conversation";
const ELEVENLABS_VOICE_ID: &str = "21m00Tcm4TlvDq8ikWAM";

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Context used to template the conversational agent's opening turn. Mirrors
/// `generate_conversation_prompt`/`generate_call_friend_prompt` in the
/// original, unified into one function since both Blitz's live-bridge leg
/// and CallFriend build the same shape of prompt from different fields.
#[derive(Debug, Clone, Default)]
pub struct ConversationContext {
    pub service_type: Option<String>,
    pub timeframe: Option<String>,
    pub friend_name: Option<String>,
    pub question: Option<String>,
}

/// Build the `(system_prompt, first_message)` pair for the AI agent's
/// conversation_initiation payload.
pub fn generate_conversation_prompt(ctx: &ConversationContext) -> (String, String) {
    if let (Some(friend_name), Some(question)) = (&ctx.friend_name, &ctx.question) {
        let system_prompt = format!(
            "You are a friendly AI assistant making a phone call on behalf of someone.\n\
             You are calling {friend_name}. Your goal is to deliver a message and get a response.\n\n\
             The person who asked you to call wants to know: {question}\n\n\
             Guidelines:\n\
             - Introduce yourself naturally: \"Hi! I'm calling on behalf of your friend\"\n\
             - Explain you're an AI assistant making this call for them\n\
             - Ask the question clearly and conversationally\n\
             - Listen to their response and acknowledge it\n\
             - Thank them for their time\n\
             - Keep the call brief and friendly (under 2 minutes)\n\
             - If it's a voicemail, leave a brief message asking them to call their friend back"
        );
        let first_message =
            format!("Hi there! Is this {friend_name}? I'm calling on behalf of your friend. They asked me to reach out to you with a quick question - {question}");
        return (system_prompt, first_message);
    }

    let service = ctx.service_type.as_deref().unwrap_or("service provider");
    let timeframe = ctx.timeframe.as_deref().unwrap_or("soon");
    let system_prompt = format!(
        "You are calling on behalf of a customer to check availability and pricing for {service}, needed {timeframe}.\n\
         Be polite, concise, and get a clear answer on availability and cost before ending the call."
    );
    let first_message = format!("Hi, I'm calling to check on {service} availability for {timeframe}.");
    (system_prompt, first_message)
}

/// Which session variant owns this bridge's transcript, so persisted lines
/// land in the right shape (`CallRecord.transcript: Vec<String>` vs
/// `CallFriendSession.transcript: Vec<TranscriptEntry>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeOwner {
    Blitz,
    CallFriend,
}

/// Outbound half: owns the write side of the ElevenLabs WebSocket so the
/// foreground carrier-frame loop can forward audio without fighting the
/// background listener task over the same socket.
pub struct ConversationSession {
    write: Mutex<SplitSink<WsStream, Message>>,
}

impl ConversationSession {
    /// Connect to ElevenLabs Conversational AI and send the
    /// `conversation_initiation_client_data` handshake. Returns the session
    /// handle plus the read half, which the caller spawns a listener over.
    pub async fn connect(
        voice: &VoiceConfig,
        ctx: &ConversationContext,
    ) -> Result<(Self, SplitStream<WsStream>)> {
        let agent_id = voice
            .elevenlabs_agent_id
            .as_deref()
            .ok_or_else(|| CoreError::Config("ELEVENLABS_AGENT_ID not configured".to_string()))?;
        let api_key = voice
            .elevenlabs_api_key
            .as_deref()
            .ok_or_else(|| CoreError::Config("ELEVENLABS_API_KEY not configured".to_string()))?;

        let url = format!("{ELEVENLABS_CONV_WS_URL}?agent_id={agent_id}");
        let mut request = url
            .into_client_request()
            .map_err(|e| CoreError::Internal(anyhow::anyhow!("invalid elevenlabs url: {e}")))?;
        request.headers_mut().insert(
            "xi-api-key",
            api_key
                .parse()
                .map_err(|e| CoreError::Internal(anyhow::anyhow!("invalid api key header: {e}")))?,
        );

        let (ws, _response) = connect_async(request)
            .await
            .map_err(|e| CoreError::Internal(anyhow::anyhow!("elevenlabs connect failed: {e}")))?;
        let (mut write, read) = ws.split();

        let (system_prompt, first_message) = generate_conversation_prompt(ctx);
        let init = serde_json::json!({
            "type": "conversation_initiation_client_data",
            "conversation_config_override": {
                "agent": {
                    "prompt": { "prompt": system_prompt },
                    "first_message": first_message,
                },
                "tts": { "voice_id": ELEVENLABS_VOICE_ID },
            },
        });
        write
            .send(Message::Text(init.to_string()))
            .await
            .map_err(|e| CoreError::Internal(anyhow::anyhow!("elevenlabs init send failed: {e}")))?;

        Ok((ConversationSession { write: Mutex::new(write) }, read))
    }

    /// Forward a carrier `media` frame's base64 audio payload as a
    /// `user_audio_chunk` to the AI session.
    pub async fn send_carrier_audio(&self, payload_b64: &str) -> Result<()> {
        let audio = BASE64
            .decode(payload_b64)
            .map_err(|e| CoreError::Internal(anyhow::anyhow!("invalid base64 media payload: {e}")))?;
        let msg = serde_json::json!({
            "type": "user_audio_chunk",
            "audio_chunk": BASE64.encode(&audio),
        });
        self.write
            .lock()
            .await
            .send(Message::Text(msg.to_string()))
            .await
            .map_err(|e| CoreError::Internal(anyhow::anyhow!("elevenlabs send failed: {e}")))
    }

    pub async fn close(&self) {
        let _ = self.write.lock().await.close().await;
    }
}

/// One audio frame to relay to the carrier, stamped with its stream id
/// (Twilio `streamSid`) as the carrier's `media` message requires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarrierMediaFrame {
    pub stream_sid: String,
    pub payload_b64: String,
}

impl CarrierMediaFrame {
    pub fn new(stream_sid: impl Into<String>, audio: &[u8]) -> Self {
        CarrierMediaFrame { stream_sid: stream_sid.into(), payload_b64: BASE64.encode(audio) }
    }
}

/// Spawn the background task that listens to AI session messages, forwards
/// agent audio to the carrier over `to_carrier`, persists transcript lines
/// onto the owning session, and emits `transcript` events. Returns a handle
/// the caller cancels on carrier `stop`/disconnect.
pub fn spawn_listener(
    mut read: SplitStream<WsStream>,
    session_id: String,
    call_id: String,
    owner: BridgeOwner,
    events: EventBus,
    sessions: SessionStore,
    to_carrier: mpsc::Sender<CarrierMediaFrame>,
    stream_sid: Arc<Mutex<Option<String>>>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(frame) = read.next().await {
            let text = match frame {
                Ok(Message::Text(t)) => t,
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(err) => {
                    tracing::warn!(error = %err, session_id, "elevenlabs socket error");
                    break;
                }
            };

            let Ok(message) = serde_json::from_str::<Value>(&text) else {
                tracing::debug!(session_id, "non-json elevenlabs message, skipping");
                continue;
            };

            match message.get("type").and_then(Value::as_str) {
                Some("audio") => {
                    let Some(b64) = message.get("audio").and_then(Value::as_str) else { continue };
                    let Ok(audio) = BASE64.decode(b64) else { continue };
                    let sid = stream_sid.lock().await.clone();
                    if let Some(sid) = sid {
                        let _ = to_carrier.send(CarrierMediaFrame::new(sid, &audio)).await;
                    }
                }
                Some("user_transcript") => {
                    let is_final = message.get("is_final").and_then(Value::as_bool).unwrap_or(false);
                    let transcript = message.get("transcript").and_then(Value::as_str).unwrap_or("");
                    if is_final && !transcript.trim().is_empty() {
                        emit_transcript(&events, &sessions, &session_id, &call_id, owner, "human", transcript).await;
                    }
                }
                Some("agent_response") => {
                    let response = message.get("response").and_then(Value::as_str).unwrap_or("");
                    if !response.trim().is_empty() {
                        emit_transcript(&events, &sessions, &session_id, &call_id, owner, "ai", response).await;
                    }
                }
                Some("conversation_end") => {
                    emit_transcript(&events, &sessions, &session_id, &call_id, owner, "system", "Conversation ended").await;
                }
                Some("error") => {
                    let msg = message.get("message").and_then(Value::as_str).unwrap_or("Unknown error");
                    emit_transcript(&events, &sessions, &session_id, &call_id, owner, "error", msg).await;
                }
                _ => {}
            }
        }
    })
}

/// System transcript lines that close out the owning session: either side
/// can end the conversation first (the AI session reports
/// `conversation_end`, or the carrier sends a `stop` frame / disconnects),
/// so both spellings drive the same completion.
fn is_terminal_system_line(text: &str) -> bool {
    matches!(text, "Conversation ended" | "Call ended")
}

/// Called by the WebSocket handler once the carrier frame loop ends (`stop`
/// frame or disconnect): push the closing transcript line and drive the
/// owning session's phase to complete, symmetric with what
/// [`spawn_listener`] does when the AI side hangs up first.
pub async fn finalize(events: &EventBus, sessions: &SessionStore, session_id: &str, call_id: &str, owner: BridgeOwner) {
    emit_transcript(events, sessions, session_id, call_id, owner, "system", "Call ended").await;
}

async fn emit_transcript(
    events: &EventBus,
    sessions: &SessionStore,
    session_id: &str,
    call_id: &str,
    owner: BridgeOwner,
    speaker: &str,
    text: &str,
) {
    persist_transcript_line(sessions, session_id, call_id, owner, speaker, text).await;

    let payload = serde_json::json!({ "call_id": call_id, "speaker": speaker, "text": text });
    let _ = events.push(session_id, &crate::domain::Event::new("transcript", payload)).await;
}

async fn persist_transcript_line(
    sessions: &SessionStore,
    session_id: &str,
    call_id: &str,
    owner: BridgeOwner,
    speaker: &str,
    text: &str,
) {
    let prefix = match owner {
        BridgeOwner::Blitz => "blitz",
        BridgeOwner::CallFriend => "call_friend",
    };

    let Ok(Some(mut session)) = sessions.load::<Session>(prefix, session_id).await else { return };

    match (&mut session, owner) {
        (Session::Blitz(s), BridgeOwner::Blitz) => {
            if let Some(call) = s.calls.iter_mut().find(|c| c.matches(None, Some(call_id))) {
                call.transcript.push(format!("{speaker}: {text}"));
                if speaker == "system" && is_terminal_system_line(text) && !call.status.is_terminal() {
                    call.status = CallStatus::Complete;
                    call.ended_at = Some(chrono::Utc::now());
                    if let Some(started) = call.started_at {
                        call.duration_s = Some((chrono::Utc::now() - started).num_seconds());
                    }
                }
            }
        }
        (Session::CallFriend(s), BridgeOwner::CallFriend) => {
            let role = match speaker {
                "human" => TranscriptRole::Human,
                "ai" => TranscriptRole::Ai,
                _ => TranscriptRole::System,
            };
            s.transcript.push(TranscriptEntry { role, text: text.to_string(), timestamp: chrono::Utc::now() });
            if role == TranscriptRole::System && is_terminal_system_line(text) && !s.phase.is_terminal() {
                s.phase = CallFriendPhase::Complete;
                s.completed_at = Some(chrono::Utc::now());
            }
        }
        _ => {}
    }

    let _ = sessions.save(prefix, session_id, &session).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_for_call_friend_mentions_friend_and_question() {
        let ctx = ConversationContext {
            friend_name: Some("Alex".to_string()),
            question: Some("what time is dinner".to_string()),
            ..Default::default()
        };
        let (system, first) = generate_conversation_prompt(&ctx);
        assert!(system.contains("Alex"));
        assert!(system.contains("what time is dinner"));
        assert!(first.contains("Alex"));
    }

    #[test]
    fn prompt_for_service_call_mentions_service_and_timeframe() {
        let ctx = ConversationContext {
            service_type: Some("plumber".to_string()),
            timeframe: Some("tomorrow".to_string()),
            ..Default::default()
        };
        let (system, first) = generate_conversation_prompt(&ctx);
        assert!(system.contains("plumber"));
        assert!(first.contains("tomorrow"));
    }

    #[test]
    fn carrier_media_frame_encodes_audio_as_base64() {
        let frame = CarrierMediaFrame::new("sid123", &[1, 2, 3]);
        assert_eq!(frame.stream_sid, "sid123");
        assert_eq!(BASE64.decode(&frame.payload_b64).unwrap(), vec![1, 2, 3]);
    }
}
