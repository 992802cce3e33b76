use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallFriendPhase {
    Initiating,
    Ringing,
    Connected,
    Complete,
    Failed,
    NoAnswer,
}

impl CallFriendPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CallFriendPhase::Complete | CallFriendPhase::Failed | CallFriendPhase::NoAnswer
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptRole {
    Human,
    Ai,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub role: TranscriptRole,
    pub text: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallFriendSession {
    pub id: String,
    pub friend_name: String,
    pub phone: String,
    pub question: String,
    pub phase: CallFriendPhase,
    pub carrier_sid: Option<String>,
    #[serde(default)]
    pub transcript: Vec<TranscriptEntry>,
    pub response: Option<String>,
    pub summary: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub error: Option<String>,
}

impl CallFriendSession {
    pub fn new(id: String, friend_name: String, phone: String, question: String) -> Self {
        CallFriendSession {
            id,
            friend_name,
            phone,
            question,
            phase: CallFriendPhase::Initiating,
            carrier_sid: None,
            transcript: Vec::new(),
            response: None,
            summary: None,
            created_at: chrono::Utc::now(),
            completed_at: None,
            error: None,
        }
    }
}
