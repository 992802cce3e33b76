//! Inbox Agent: the minimal session shape for mailbox-check requests. The
//! mailbox connector itself (Gmail/Composio OAuth, message fetch and
//! summarization) is an external collaborator this crate doesn't own, so
//! this workflow only ever reaches a terminal phase along the
//! configuration-missing fallback path — but the Session Store, Event Bus,
//! and SSE Gateway still get a real variant and a real terminal-event
//! sequence to dispatch on.

use serde_json::json;

use crate::app::AppContext;
use crate::domain::{Event, InboxPhase, InboxSession, Session};
use crate::error::Result;

async fn save(ctx: &AppContext, session_id: &str, session: &InboxSession) -> Result<()> {
    ctx.sessions.save("inbox", session_id, &Session::Inbox(session.clone())).await
}

/// Run the (minimal) workflow: announce that we're checking, then resolve
/// immediately along whichever fallback the configuration dictates. With no
/// connector wired up, a configured `COMPOSIO_API_KEY` still can't complete
/// a real check, so both branches end in a terminal, user-facing state
/// rather than pretending to fetch mail.
pub async fn run(ctx: AppContext, session_id: String, entity_id: String) -> Result<()> {
    let mut session = InboxSession::new(session_id.clone(), entity_id);
    save(&ctx, &session_id, &session).await?;
    ctx.events.push(&session_id, &Event::new("status", json!({"phase": "checking"}))).await?;

    if ctx.settings.inbox.composio_api_key.is_none() {
        session.phase = InboxPhase::AuthRequired;
        session.error = Some("Inbox is not connected yet".to_string());
        session.completed_at = Some(chrono::Utc::now());
        save(&ctx, &session_id, &session).await?;
        ctx.events
            .push(
                &session_id,
                &Event::new("inbox_auth_required", json!({"message": "Connect your email account to use Inbox."})),
            )
            .await?;
        return Ok(());
    }

    session.phase = InboxPhase::Failed;
    session.error = Some("Inbox connector not configured in this deployment".to_string());
    session.completed_at = Some(chrono::Utc::now());
    save(&ctx, &session_id, &session).await?;
    ctx.events
        .push(&session_id, &Event::new("inbox_error", json!({"message": session.error})))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::kv::mock::MockStore;
    use std::sync::Arc;

    fn test_ctx() -> AppContext {
        let mut settings = Settings::from_env().expect("default settings parse");
        settings.inbox.composio_api_key = None;
        AppContext::with_kv(settings, Arc::new(MockStore::new())).expect("context builds")
    }

    #[tokio::test]
    async fn missing_credentials_requires_auth() {
        let ctx = test_ctx();
        run(ctx.clone(), "s1".to_string(), "default".to_string()).await.unwrap();

        let event = ctx.events.pop("s1", 1).await.unwrap().unwrap();
        assert_eq!(event.event_type, "status");
        let event = ctx.events.pop("s1", 1).await.unwrap().unwrap();
        assert_eq!(event.event_type, "inbox_auth_required");
    }
}
