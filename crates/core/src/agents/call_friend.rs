//! CallFriend Agent: place a call to a named contact, hold a live
//! conversation over the Media Bridge, then summarize what they said into
//! one sentence. Places the call, polls the session for a terminal phase,
//! and hands the captured transcript to the shared [`crate::llm::LlmClient`]
//! for the final summary.

use std::time::{Duration, Instant};

use serde_json::json;

use crate::app::AppContext;
use crate::domain::{CallFriendPhase, CallFriendSession, Event, Session, TranscriptEntry, TranscriptRole};
use crate::error::Result;
use crate::llm::{ChatMessage, LlmClient};
use crate::telephony::CallOptions;

const WAIT_TIMEOUT: Duration = Duration::from_secs(180);
const POLL_INTERVAL: Duration = Duration::from_secs(2);

async fn load(ctx: &AppContext, session_id: &str) -> Result<Option<CallFriendSession>> {
    match ctx.sessions.load::<Session>("call_friend", session_id).await? {
        Some(Session::CallFriend(s)) => Ok(Some(s)),
        _ => Ok(None),
    }
}

async fn save(ctx: &AppContext, session_id: &str, session: &CallFriendSession) -> Result<()> {
    ctx.sessions.save("call_friend", session_id, &Session::CallFriend(session.clone())).await
}

fn websocket_base(http_base: &str) -> String {
    http_base.replacen("https://", "wss://", 1).replacen("http://", "ws://", 1)
}

/// Run the full workflow: place the call, wait for the Media Bridge to
/// drive it to a terminal phase, then summarize the transcript.
pub async fn run(ctx: AppContext, session_id: String, friend_name: String, phone: String, question: String) -> Result<()> {
    let mut session = CallFriendSession::new(session_id.clone(), friend_name.clone(), phone.clone(), question.clone());
    save(&ctx, &session_id, &session).await?;
    ctx.events.push(&session_id, &Event::new("status", json!({"phase": "initiating", "friend": friend_name}))).await?;

    let base = &ctx.settings.backend_url;
    let stream_url = format!("{}/api/call_friend/media-stream/{session_id}", websocket_base(base));
    let call_control_url = format!("{base}/api/call_friend/twiml/{session_id}?stream_url={}", urlencoding_escape(&stream_url));
    let status_callback_url = format!("{base}/api/call_friend/webhook/{session_id}");
    let amd_url = format!("{base}/api/call_friend/amd/{session_id}");

    session.phase = CallFriendPhase::Ringing;
    let opts = CallOptions {
        timeout_s: 45,
        record: false,
        machine_detection: true,
        amd_status_callback_url: Some(amd_url),
        recording_status_callback_url: None,
    };

    match ctx.telephony.place(&phone, &call_control_url, &status_callback_url, opts).await {
        Ok(sid) => session.carrier_sid = Some(sid),
        Err(err) => {
            session.phase = CallFriendPhase::Failed;
            session.error = Some(err.to_string());
            save(&ctx, &session_id, &session).await?;
            ctx.events.push(&session_id, &Event::new("error", json!({"message": err.to_string()}))).await?;
            return Err(err);
        }
    }
    save(&ctx, &session_id, &session).await?;

    wait_for_completion(&ctx, &session_id).await;

    let Some(mut session) = load(&ctx, &session_id).await? else { return Ok(()) };

    if matches!(session.phase, CallFriendPhase::Failed | CallFriendPhase::NoAnswer) {
        let summary = session.summary.clone().unwrap_or_else(|| "The call could not be completed.".to_string());
        ctx.events
            .push(
                &session_id,
                &Event::new("session_complete", json!({"summary": summary, "response": session.response, "transcript": []})),
            )
            .await?;
        return Ok(());
    }

    let summary = summarize_transcript(ctx.llm.as_ref(), &friend_name, &question, &session.transcript).await;
    session.response = last_human_line(&session.transcript);
    session.summary = Some(summary.clone());
    session.phase = CallFriendPhase::Complete;
    session.completed_at = Some(chrono::Utc::now());
    save(&ctx, &session_id, &session).await?;

    ctx.events
        .push(
            &session_id,
            &Event::new(
                "session_complete",
                json!({"summary": summary, "response": session.response, "transcript": session.transcript}),
            ),
        )
        .await?;
    Ok(())
}

/// Poll the session every 2s until the Media Bridge (or a webhook) has
/// driven it terminal, or force-fail it at the 180s wait cap.
async fn wait_for_completion(ctx: &AppContext, session_id: &str) {
    let deadline = Instant::now() + WAIT_TIMEOUT;
    loop {
        match load(ctx, session_id).await {
            Ok(Some(session)) if session.phase.is_terminal() => return,
            Ok(None) => return,
            _ => {}
        }
        if Instant::now() >= deadline {
            if let Ok(Some(mut session)) = load(ctx, session_id).await {
                if !session.phase.is_terminal() {
                    session.phase = CallFriendPhase::Failed;
                    session.error = Some("Timeout".to_string());
                    let _ = save(ctx, session_id, &session).await;
                }
            }
            return;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

async fn summarize_transcript(llm: &dyn LlmClient, friend_name: &str, question: &str, transcript: &[TranscriptEntry]) -> String {
    let transcript_text: String = transcript
        .iter()
        .filter(|e| e.role != TranscriptRole::System)
        .map(|e| format!("{}: {}", speaker_label(e.role), e.text))
        .collect::<Vec<_>>()
        .join("\n");

    if transcript_text.trim().is_empty() {
        return format!("I wasn't able to have a conversation with {friend_name}.");
    }

    let prompt = format!(
        "A phone call was made to {friend_name} to ask: \"{question}\"\n\n\
         Here is the transcript:\n{transcript_text}\n\n\
         Write one brief, natural sentence summarizing {friend_name}'s response."
    );
    let messages = vec![
        ChatMessage::system("You summarize phone call transcripts into one brief, natural sentence."),
        ChatMessage::user(prompt),
    ];

    match llm.complete(&messages, 0.5, 150).await {
        Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
        _ => match last_human_line(transcript) {
            Some(response) => format!("I spoke with {friend_name}. They said: {response}"),
            None => format!("I called {friend_name} but didn't get a clear response."),
        },
    }
}

fn speaker_label(role: TranscriptRole) -> &'static str {
    match role {
        TranscriptRole::Human => "Them",
        TranscriptRole::Ai => "Assistant",
        TranscriptRole::System => "System",
    }
}

fn last_human_line(transcript: &[TranscriptEntry]) -> Option<String> {
    transcript.iter().rev().find(|e| e.role == TranscriptRole::Human).map(|e| e.text.clone())
}

fn urlencoding_escape(s: &str) -> String {
    s.replace(':', "%3A").replace('/', "%2F")
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubLlm(&'static str);

    #[async_trait::async_trait]
    impl LlmClient for StubLlm {
        async fn complete(&self, _messages: &[ChatMessage], _t: f32, _m: u32) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    fn entry(role: TranscriptRole, text: &str) -> TranscriptEntry {
        TranscriptEntry { role, text: text.to_string(), timestamp: chrono::Utc::now() }
    }

    #[tokio::test]
    async fn summarizes_using_llm_response() {
        let llm = StubLlm("Alex said they're free Friday evening.");
        let transcript = vec![entry(TranscriptRole::Ai, "Are you free Friday?"), entry(TranscriptRole::Human, "Yes, Friday works.")];
        let summary = summarize_transcript(&llm, "Alex", "Are you free Friday?", &transcript).await;
        assert_eq!(summary, "Alex said they're free Friday evening.");
    }

    #[tokio::test]
    async fn empty_transcript_yields_apology() {
        let llm = StubLlm("unused");
        let summary = summarize_transcript(&llm, "Alex", "Are you free Friday?", &[]).await;
        assert!(summary.contains("wasn't able to have a conversation"));
    }

    #[test]
    fn last_human_line_finds_most_recent_reply() {
        let transcript = vec![entry(TranscriptRole::Human, "first"), entry(TranscriptRole::Ai, "question"), entry(TranscriptRole::Human, "second")];
        assert_eq!(last_human_line(&transcript), Some("second".to_string()));
    }
}
