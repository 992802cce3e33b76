//! Blitz Agent: fan out to up to three businesses concurrently, get a
//! quote or availability answer from whichever picks up, and summarize.
//! Each fan-out leg collects into its own owned `CallRecord` rather than
//! mutating one through a shared lock, so "persist once after all legs
//! settle" falls out of the code structure instead of being an extra rule
//! to remember.

use std::time::{Duration, Instant};

use serde_json::json;

use crate::app::AppContext;
use crate::domain::{BlitzSession, BlitzStatus, CallRecord, CallStatus, Event, Session};
use crate::error::Result;
use crate::places::default_max_results;
use crate::router::RouterParams;
use crate::telephony::CallOptions;

const FAN_OUT_TIMEOUT: Duration = Duration::from_secs(120);
const POLL_INTERVAL: Duration = Duration::from_secs(1);

async fn load(ctx: &AppContext, session_id: &str) -> Result<Option<BlitzSession>> {
    match ctx.sessions.load::<Session>("blitz", session_id).await? {
        Some(Session::Blitz(s)) => Ok(Some(s)),
        _ => Ok(None),
    }
}

async fn save(ctx: &AppContext, session_id: &str, session: &BlitzSession) -> Result<()> {
    ctx.sessions.save("blitz", session_id, &Session::Blitz(session.clone())).await
}

/// Run the full workflow to completion. Spawned as a detached task by the
/// `/api/chat` handler right after it hands the caller back a stream URL.
pub async fn run(ctx: AppContext, session_id: String, user_message: String, params: RouterParams) -> Result<()> {
    let mut session = BlitzSession::new(session_id.clone(), user_message, params.clone());
    save(&ctx, &session_id, &session).await?;
    ctx.events.push(&session_id, &Event::new("status", json!({"phase": "searching"}))).await?;

    let query = params.service.clone().unwrap_or_else(|| "local business".to_string());
    let location = params.location.as_deref();
    let businesses = ctx.places.search_businesses(&query, location, None, default_max_results()).await;

    if businesses.is_empty() {
        session.status = BlitzStatus::Complete;
        session.summary = Some(format!("Sorry, I couldn't find any {query} businesses to call."));
        session.completed_at = Some(chrono::Utc::now());
        save(&ctx, &session_id, &session).await?;
        ctx.events
            .push(&session_id, &Event::new("session_complete", json!({"summary": session.summary, "results": []})))
            .await?;
        return Ok(());
    }

    session.businesses = businesses.clone();
    session.calls = businesses.into_iter().map(CallRecord::pending).collect();
    session.status = BlitzStatus::Calling;
    save(&ctx, &session_id, &session).await?;
    ctx.events
        .push(
            &session_id,
            &Event::new("status", json!({"phase": "calling", "businesses": session.businesses})),
        )
        .await?;

    let settled = futures::future::join_all(
        session
            .calls
            .iter()
            .cloned()
            .map(|call| place_single_call(&ctx, &session_id, call)),
    )
    .await;
    session.calls = settled;
    save(&ctx, &session_id, &session).await?;

    wait_for_calls_to_settle(&ctx, &session_id).await;

    let mut session = load(&ctx, &session_id).await?.unwrap_or(session);
    let summary = compose_summary(&session.calls, &query);
    session.summary = Some(summary.clone());
    session.status = BlitzStatus::Complete;
    session.completed_at = Some(chrono::Utc::now());
    save(&ctx, &session_id, &session).await?;

    let results: Vec<_> = session
        .calls
        .iter()
        .map(|c| json!({"business": c.business.name, "status": c.status, "result": c.result}))
        .collect();
    ctx.events
        .push(&session_id, &Event::new("session_complete", json!({"summary": summary, "results": results})))
        .await?;
    Ok(())
}

/// One fan-out leg: mark ringing, emit `call_started`, invoke the
/// Telephony Driver. Takes and returns an owned `CallRecord` so concurrent
/// legs never touch the same memory — the session is only reassembled
/// from the returned records after every leg has settled.
async fn place_single_call(ctx: &AppContext, session_id: &str, mut call: CallRecord) -> CallRecord {
    call.status = CallStatus::Ringing;
    call.started_at = Some(chrono::Utc::now());
    let _ = ctx
        .events
        .push(
            session_id,
            &Event::new("call_started", json!({"call_id": call.id, "business": call.business.name})),
        )
        .await;

    let base = &ctx.settings.backend_url;
    let call_control_url = format!("{base}/api/blitz/twiml/{session_id}/{}", call.id);
    let status_callback_url = format!("{base}/api/blitz/webhook/{session_id}/{}", call.id);
    let amd_url = format!("{base}/api/blitz/amd/{session_id}/{}", call.id);
    let recording_url = format!("{base}/api/blitz/recording-complete/{session_id}/{}", call.id);

    let opts = CallOptions {
        timeout_s: 45,
        record: true,
        machine_detection: true,
        amd_status_callback_url: Some(amd_url),
        recording_status_callback_url: Some(recording_url),
    };

    match ctx.telephony.place(&call.business.phone, &call_control_url, &status_callback_url, opts).await {
        Ok(sid) => call.set_carrier_sid(sid),
        Err(err) => {
            call.status = CallStatus::Failed;
            call.error = Some(err.to_string());
            let _ = ctx
                .events
                .push(session_id, &Event::new("call_failed", json!({"call_id": call.id, "error": call.error})))
                .await;
        }
    }
    call
}

/// Poll the session from the store every second until every call is
/// terminal or the fan-out timeout expires, at which point any remaining
/// call is forced to `Failed`.
async fn wait_for_calls_to_settle(ctx: &AppContext, session_id: &str) {
    let deadline = Instant::now() + FAN_OUT_TIMEOUT;
    loop {
        let Ok(Some(session)) = load(ctx, session_id).await else { return };
        if session.calls.iter().all(|c| c.status.is_terminal()) {
            return;
        }
        if Instant::now() >= deadline {
            if let Ok(Some(mut session)) = load(ctx, session_id).await {
                for call in session.calls.iter_mut().filter(|c| !c.status.is_terminal()) {
                    call.status = CallStatus::Failed;
                    call.error = Some("Timeout".to_string());
                }
                let _ = save(ctx, session_id, &session).await;
            }
            return;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

fn compose_summary(calls: &[CallRecord], query: &str) -> String {
    let successes: Vec<&CallRecord> = calls
        .iter()
        .filter(|c| c.status == CallStatus::Complete && c.result.is_some())
        .collect();

    if successes.is_empty() {
        return format!("Sorry, I wasn't able to get through to any {query} - please try again later.");
    }

    let plural = if successes.len() == 1 { "" } else { "s" };
    let mut summary = format!("Found {} option{plural} for you:\n\n", successes.len());
    for call in &successes {
        summary.push_str(&format!("- {}: {}\n", call.business.name, call.result.as_deref().unwrap_or("")));
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Business;

    fn business(name: &str) -> Business {
        Business {
            id: name.to_string(),
            name: name.to_string(),
            phone: "+447000000000".to_string(),
            address: None,
            rating: None,
            lat: None,
            lng: None,
        }
    }

    #[test]
    fn summary_apologizes_when_no_call_succeeded() {
        let mut call = CallRecord::pending(business("Acme Plumbing"));
        call.status = CallStatus::NoAnswer;
        let summary = compose_summary(&[call], "plumber");
        assert!(summary.contains("Sorry"));
    }

    #[test]
    fn summary_lists_successful_quotes() {
        let mut call = CallRecord::pending(business("Acme Plumbing"));
        call.status = CallStatus::Complete;
        call.result = Some("£95 call-out fee, available tomorrow".to_string());
        let summary = compose_summary(&[call], "plumber");
        assert!(summary.contains("Found 1 option"));
        assert!(summary.contains("Acme Plumbing: £95 call-out fee"));
    }

    #[test]
    fn summary_pluralizes_for_multiple_results() {
        let mut a = CallRecord::pending(business("Acme Plumbing"));
        a.status = CallStatus::Complete;
        a.result = Some("£95".to_string());
        let mut b = CallRecord::pending(business("Bolt Plumbers"));
        b.status = CallStatus::Complete;
        b.result = Some("£80".to_string());
        let summary = compose_summary(&[a, b], "plumber");
        assert!(summary.contains("Found 2 options"));
    }
}
