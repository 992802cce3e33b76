use serde::{Deserialize, Serialize};

/// Minimal session shape for the Inbox agent's wire contract. The mailbox
/// connector itself is an external collaborator and is not implemented
/// here — this type exists only so the Session Store, Event Bus, and SSE
/// Gateway have a real variant to dispatch on for `inbox_*` events and
/// `/api/inbox/...` routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InboxPhase {
    Checking,
    Complete,
    Failed,
    AuthRequired,
}

impl InboxPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, InboxPhase::Complete | InboxPhase::Failed | InboxPhase::AuthRequired)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboxSession {
    pub id: String,
    pub entity_id: String,
    pub phase: InboxPhase,
    pub summary: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub error: Option<String>,
}

impl InboxSession {
    pub fn new(id: String, entity_id: String) -> Self {
        InboxSession {
            id,
            entity_id,
            phase: InboxPhase::Checking,
            summary: None,
            created_at: chrono::Utc::now(),
            completed_at: None,
            error: None,
        }
    }
}
