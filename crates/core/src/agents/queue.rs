//! Queue Agent: dial into an IVR tree, navigate it (or just sit on hold),
//! and hand the call back to the user the moment a human answers.
//!
//! Unlike Blitz and CallFriend this isn't one long-running task — the
//! carrier drives it one HTTP round-trip at a time (initial TwiML, then an
//! IVR turn per `<Gather>`, then a hold-loop turn every 20s). The only
//! background task is the 30-second hold ticker. Every handler here
//! re-reads the session fresh and writes back through
//! [`QueueSession::try_advance`] (the phase guard): a handler never trusts
//! in-memory state carried across a request boundary, since another
//! request (or the ticker, or a cancellation) may have moved the phase on
//! in the meantime.

use std::sync::OnceLock;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::json;

use crate::app::AppContext;
use crate::domain::{Event, QueuePhase, QueueSession, Session};
use crate::error::{CoreError, Result};
use crate::llm::ChatMessage;
use crate::telephony::{escape_xml, CallOptions};

const HOLD_TICK: Duration = Duration::from_secs(30);

const HOLD_PHRASES: &[&str] = &[
    "your call is important",
    "please hold",
    "position in the queue",
    "calls may be recorded",
    "all of our agents are busy",
    "thank you for your patience",
];
const GREETING_ONLY: &[&str] = &["hello", "hi", "welcome", "good morning", "good afternoon"];

async fn load(ctx: &AppContext, session_id: &str) -> Result<Option<QueueSession>> {
    match ctx.sessions.load::<Session>("queue", session_id).await? {
        Some(Session::Queue(s)) => Ok(Some(s)),
        _ => Ok(None),
    }
}

async fn save(ctx: &AppContext, session_id: &str, session: &QueueSession) -> Result<()> {
    ctx.sessions.save("queue", session_id, &Session::Queue(session.clone())).await
}

/// Re-reads the session and applies `next`/`mutate` only if doing so
/// wouldn't move the stored phase backwards. Always returns the session
/// as it stands after the attempt — callers compare `.phase` against
/// `next` to tell whether the guard tripped.
async fn apply_guarded(
    ctx: &AppContext,
    session_id: &str,
    next: QueuePhase,
    mutate: impl FnOnce(&mut QueueSession),
) -> Result<Option<QueueSession>> {
    let Some(mut current) = load(ctx, session_id).await? else { return Ok(None) };
    if !current.try_advance(next) {
        return Ok(Some(current));
    }
    mutate(&mut current);
    save(ctx, session_id, &current).await?;
    Ok(Some(current))
}

fn tickers() -> &'static DashMap<String, tokio::task::AbortHandle> {
    static TICKERS: OnceLock<DashMap<String, tokio::task::AbortHandle>> = OnceLock::new();
    TICKERS.get_or_init(DashMap::new)
}

/// Place the call and start the hold ticker. Returns once the call has
/// been placed (or failed to place) — the rest of the workflow runs off
/// carrier webhooks.
pub async fn start(
    ctx: AppContext,
    session_id: String,
    phone: String,
    business_name: String,
    reason: Option<String>,
) -> Result<()> {
    let mut session = QueueSession::new(session_id.clone(), phone.clone(), business_name.clone(), reason);
    save(&ctx, &session_id, &session).await?;
    ctx.events
        .push(&session_id, &Event::new("status", json!({"phase": "initiating", "business": business_name})))
        .await?;

    let base = &ctx.settings.backend_url;
    let call_control_url = format!("{base}/api/queue/twiml/{session_id}");
    let status_callback_url = format!("{base}/api/queue/webhook/{session_id}");
    let opts = CallOptions { timeout_s: 45, record: false, machine_detection: false, ..Default::default() };

    match ctx.telephony.place(&phone, &call_control_url, &status_callback_url, opts).await {
        Ok(sid) => {
            session.carrier_sid = Some(sid);
            session.try_advance(QueuePhase::Ringing);
            save(&ctx, &session_id, &session).await?;
        }
        Err(err) => {
            session.phase = QueuePhase::Failed;
            session.error = Some(err.to_string());
            save(&ctx, &session_id, &session).await?;
            ctx.events.push(&session_id, &Event::new("queue_failed", json!({"error": err.to_string()}))).await?;
            return Err(err);
        }
    }

    spawn_ticker(ctx, session_id);
    Ok(())
}

fn spawn_ticker(ctx: AppContext, session_id: String) {
    let task_session_id = session_id.clone();
    let handle = tokio::spawn(async move {
        loop {
            tokio::time::sleep(HOLD_TICK).await;
            match tick(&ctx, &task_session_id).await {
                Ok(true) => break,
                Ok(false) => {}
                Err(err) => {
                    tracing::warn!(error = %err, session_id = %task_session_id, "queue ticker failed");
                    break;
                }
            }
        }
        tickers().remove(&task_session_id);
    });
    tickers().insert(session_id, handle.abort_handle());
}

/// One 30-second tick: advance `hold_elapsed_s` while the call is still
/// ringing, in the IVR, or on hold; fail the session out once
/// `max_hold_minutes` is exceeded. Returns `true` once the ticker should
/// stop (terminal phase reached).
async fn tick(ctx: &AppContext, session_id: &str) -> Result<bool> {
    let Some(current) = load(ctx, session_id).await? else { return Ok(true) };
    if current.phase.is_terminal() {
        return Ok(true);
    }
    if !matches!(current.phase, QueuePhase::Ringing | QueuePhase::Ivr | QueuePhase::Hold) {
        return Ok(false);
    }

    let Some(updated) = apply_guarded(ctx, session_id, current.phase, |s| {
        s.hold_elapsed_s += HOLD_TICK.as_secs() as i64;
    })
    .await?
    else {
        return Ok(true);
    };
    if updated.phase != current.phase {
        return Ok(false);
    }

    if updated.hold_elapsed_s > updated.max_hold_minutes * 60 {
        let failed = apply_guarded(ctx, session_id, QueuePhase::Failed, |s| {
            s.error = Some("Max hold time exceeded".to_string());
            s.completed_at = Some(chrono::Utc::now());
        })
        .await?;
        if matches!(failed, Some(ref s) if s.phase == QueuePhase::Failed) {
            ctx.events.push(session_id, &Event::new("queue_failed", json!({"reason": "hold_timeout"}))).await?;
        }
        return Ok(true);
    }

    ctx.events
        .push(session_id, &Event::new("queue_hold_update", json!({"hold_elapsed_s": updated.hold_elapsed_s})))
        .await?;
    Ok(false)
}

/// Markup rendered the moment the call connects: listen for the IVR's
/// first prompt, falling through to the hold loop if nothing is heard.
pub fn render_initial_twiml(ivr_handler_url: &str, hold_loop_url: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
  <Gather input="speech" timeout="15" speechTimeout="auto" action="{ivr}" method="POST"/>
  <Redirect method="POST">{hold}</Redirect>
</Response>"#,
        ivr = escape_xml(ivr_handler_url),
        hold = escape_xml(hold_loop_url),
    )
}

/// 20-second speech-gather that redirects to itself on timeout — the loop
/// that keeps the line open while waiting for a human to pick up.
pub fn render_hold_loop(human_check_url: &str, hold_loop_url: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
  <Gather input="speech" timeout="20" speechTimeout="auto" action="{human_check}" method="POST"/>
  <Redirect method="POST">{hold}</Redirect>
</Response>"#,
        human_check = escape_xml(human_check_url),
        hold = escape_xml(hold_loop_url),
    )
}

fn render_dtmf_and_listen(digits: &str, ivr_handler_url: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
  <Play digits="{digits}"/>
  <Pause length="2"/>
  <Gather input="speech" timeout="15" speechTimeout="auto" action="{ivr}" method="POST"/>
</Response>"#,
        digits = escape_xml(digits),
        ivr = escape_xml(ivr_handler_url),
    )
}

fn render_human_detected_markup() -> String {
    r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
  <Say voice="Polly.Amy">Please hold, we're connecting you now.</Say>
  <Hangup/>
</Response>"#
        .to_string()
}

fn render_hangup() -> String {
    r#"<?xml version="1.0" encoding="UTF-8"?><Response><Hangup/></Response>"#.to_string()
}

fn render_for_phase(session: &QueueSession, hold_loop_url: &str, human_check_url: &str) -> String {
    match session.phase {
        QueuePhase::HumanDetected => render_human_detected_markup(),
        QueuePhase::Completed | QueuePhase::Failed | QueuePhase::Cancelled => render_hangup(),
        _ => render_hold_loop(human_check_url, hold_loop_url),
    }
}

enum IvrDecision {
    Digits(String),
    Hold,
    Human,
}

impl IvrDecision {
    fn pressed_digits(&self) -> Option<String> {
        match self {
            IvrDecision::Digits(d) => Some(d.clone()),
            _ => None,
        }
    }
}

async fn decide_ivr_action(ctx: &AppContext, heard: &str, reason: &str) -> IvrDecision {
    let prompt = format!(
        "You are navigating an automated telephone menu (IVR) on behalf of a caller.\n\n\
         The caller's reason for waiting: {reason}\n\n\
         The IVR just said: \"{heard}\"\n\n\
         Respond with ONLY one of: a digit string such as \"2\", the word HOLD, or the word HUMAN. No explanation."
    );
    let messages = vec![
        ChatMessage::system("You navigate phone menus. Respond with only a digit string, HOLD, or HUMAN."),
        ChatMessage::user(prompt),
    ];
    match ctx.llm.complete(&messages, 0.1, 10).await {
        Ok(raw) => parse_ivr_decision(&raw),
        Err(err) => {
            tracing::warn!(error = %err, "ivr decision call failed, defaulting to hold");
            IvrDecision::Hold
        }
    }
}

fn parse_ivr_decision(raw: &str) -> IvrDecision {
    let cleaned = raw.trim().trim_matches(|c: char| c == '"' || c == '.');
    if cleaned.eq_ignore_ascii_case("human") {
        return IvrDecision::Human;
    }
    if cleaned.eq_ignore_ascii_case("hold") {
        return IvrDecision::Hold;
    }
    if !cleaned.is_empty() && cleaned.chars().all(|c| c.is_ascii_digit()) {
        return IvrDecision::Digits(cleaned.to_string());
    }
    IvrDecision::Hold
}

/// Handle one IVR `<Gather>` result: ask the LLM what to do with what the
/// menu just said, then press digits, drop into the hold loop, or (if the
/// menu itself announces a transfer to a person) finalize straight away.
pub async fn handle_ivr_turn(ctx: &AppContext, session_id: &str, heard: &str) -> Result<String> {
    let base = &ctx.settings.backend_url;
    let ivr_url = format!("{base}/api/queue/ivr-handler/{session_id}");
    let hold_url = format!("{base}/api/queue/hold-loop/{session_id}");
    let human_check_url = format!("{base}/api/queue/human-check/{session_id}");

    let Some(mut session) = apply_guarded(ctx, session_id, QueuePhase::Ivr, |_| {}).await? else {
        return Ok(render_hold_loop(&human_check_url, &hold_url));
    };
    if session.phase != QueuePhase::Ivr {
        return Ok(render_for_phase(&session, &hold_url, &human_check_url));
    }

    let reason = session.reason.clone().unwrap_or_else(|| "general enquiry".to_string());
    let decision = decide_ivr_action(ctx, heard, &reason).await;

    session.ivr_steps.push(crate::domain::IvrStep {
        heard: heard.to_string(),
        pressed: decision.pressed_digits(),
        at: chrono::Utc::now(),
    });

    let markup = match &decision {
        IvrDecision::Digits(digits) => {
            save(ctx, session_id, &session).await?;
            render_dtmf_and_listen(digits, &ivr_url)
        }
        IvrDecision::Hold => {
            session.phase = QueuePhase::Hold;
            session.hold_started_at = Some(chrono::Utc::now());
            save(ctx, session_id, &session).await?;
            ctx.events.push(session_id, &Event::new("queue_hold", json!({}))).await?;
            render_hold_loop(&human_check_url, &hold_url)
        }
        IvrDecision::Human => {
            save(ctx, session_id, &session).await?;
            return finalize_human_detected(ctx, session_id, session).await;
        }
    };

    ctx.events
        .push(session_id, &Event::new("queue_ivr", json!({"heard": heard, "pressed": decision.pressed_digits()})))
        .await?;
    Ok(markup)
}

/// True if `text` reads like a live human speaking, not an IVR recording
/// or a bare greeting. Every rejection rule here is a fixed contract, not
/// a starting point to extend.
pub fn is_likely_human_speech(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.chars().filter(|c| !c.is_whitespace()).count() < 5 {
        return false;
    }
    let lower = trimmed.to_lowercase();
    if HOLD_PHRASES.iter().any(|phrase| lower.contains(phrase)) {
        return false;
    }
    let stripped: String = lower.chars().filter(|c| c.is_alphanumeric() || c.is_whitespace()).collect();
    let normalized = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    !GREETING_ONLY.contains(&normalized.as_str())
}

/// Handle one hold-loop `<Gather>` result: apply the human-speech
/// heuristic, and finalize the session the moment it passes.
pub async fn handle_human_check(ctx: &AppContext, session_id: &str, transcript: &str) -> Result<String> {
    let base = &ctx.settings.backend_url;
    let hold_url = format!("{base}/api/queue/hold-loop/{session_id}");
    let human_check_url = format!("{base}/api/queue/human-check/{session_id}");

    if !is_likely_human_speech(transcript) {
        return Ok(render_hold_loop(&human_check_url, &hold_url));
    }

    let Some(session) = load(ctx, session_id).await? else {
        return Ok(render_hold_loop(&human_check_url, &hold_url));
    };
    if session.phase.is_terminal() {
        return Ok(render_for_phase(&session, &hold_url, &human_check_url));
    }

    finalize_human_detected(ctx, session_id, session).await
}

async fn finalize_human_detected(ctx: &AppContext, session_id: &str, mut session: QueueSession) -> Result<String> {
    let hold_time = session
        .hold_started_at
        .map(|started| (chrono::Utc::now() - started).num_seconds())
        .unwrap_or(session.hold_elapsed_s);

    if !session.try_advance(QueuePhase::HumanDetected) {
        return Ok(render_for_phase(&session, "", ""));
    }
    session.human_detected = true;
    session.callback_number = Some(session.phone.clone());
    session.hold_elapsed_s = session.hold_elapsed_s.max(hold_time);
    session.completed_at = Some(chrono::Utc::now());
    save(ctx, session_id, &session).await?;

    if let Some(handle) = tickers().get(session_id) {
        handle.abort();
    }
    tickers().remove(session_id);

    ctx.events
        .push(
            session_id,
            &Event::new(
                "queue_human_detected",
                json!({"phone": session.phone, "business": session.business_name, "hold_time": session.hold_elapsed_s}),
            ),
        )
        .await?;
    Ok(render_human_detected_markup())
}

/// Cancel a queue session that's still in progress: mark it `Cancelled`,
/// hang up the call, and stop the ticker.
pub async fn cancel(ctx: &AppContext, session_id: &str) -> Result<()> {
    let Some(mut session) = load(ctx, session_id).await? else {
        return Err(CoreError::SessionNotFound(session_id.to_string()));
    };
    if !session.try_advance(QueuePhase::Cancelled) {
        return Ok(());
    }
    session.completed_at = Some(chrono::Utc::now());
    save(ctx, session_id, &session).await?;

    if let Some(sid) = &session.carrier_sid {
        let _ = ctx.telephony.hangup(sid).await;
    }
    if let Some(handle) = tickers().get(session_id) {
        handle.abort();
    }
    tickers().remove(session_id);

    ctx.events.push(session_id, &Event::new("queue_failed", json!({"cancelled": true}))).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_utterances() {
        assert!(!is_likely_human_speech("hi"));
        assert!(!is_likely_human_speech("   "));
    }

    #[test]
    fn rejects_known_hold_phrases() {
        assert!(!is_likely_human_speech("Your call is important to us, please continue to hold."));
        assert!(!is_likely_human_speech("calls may be recorded for training purposes"));
        assert!(!is_likely_human_speech("all of our agents are busy assisting other customers"));
        assert!(!is_likely_human_speech("thank you for your patience, someone will be with you shortly"));
    }

    #[test]
    fn rejects_bare_greetings() {
        assert!(!is_likely_human_speech("Hello"));
        assert!(!is_likely_human_speech("Good afternoon."));
    }

    #[test]
    fn accepts_real_speech() {
        assert!(is_likely_human_speech("How can I help you today?"));
        assert!(is_likely_human_speech("Thanks for holding, this is Sam speaking."));
    }

    #[test]
    fn ivr_decision_parses_digit_hold_and_human() {
        assert!(matches!(parse_ivr_decision("2"), IvrDecision::Digits(d) if d == "2"));
        assert!(matches!(parse_ivr_decision("HOLD"), IvrDecision::Hold));
        assert!(matches!(parse_ivr_decision("human"), IvrDecision::Human));
    }

    #[test]
    fn ivr_decision_defaults_to_hold_on_ambiguity() {
        assert!(matches!(parse_ivr_decision("I'm not sure"), IvrDecision::Hold));
    }

    #[test]
    fn queue_phase_guard_blocks_regression() {
        let mut session = QueueSession::new("s1".into(), "+440".into(), "HMRC".into(), None);
        session.try_advance(QueuePhase::Hold);
        assert!(!session.try_advance(QueuePhase::Ringing));
        assert_eq!(session.phase, QueuePhase::Hold);
    }
}
