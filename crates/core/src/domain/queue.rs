use serde::{Deserialize, Serialize};

/// Total order for the Queue agent's phase guard (§4.6). Higher index = more
/// advanced; a writer must never move the stored phase backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueuePhase {
    Initiating,
    Ringing,
    Ivr,
    Hold,
    HumanDetected,
    Completed,
    Failed,
    Cancelled,
}

impl QueuePhase {
    /// Ordinal used by the phase guard. `Completed`/`Failed`/`Cancelled` all
    /// share order 5 — they're mutually exclusive terminal outcomes, not a
    /// further progression past `HumanDetected`.
    pub fn order(self) -> u8 {
        match self {
            QueuePhase::Initiating => 0,
            QueuePhase::Ringing => 1,
            QueuePhase::Ivr => 2,
            QueuePhase::Hold => 3,
            QueuePhase::HumanDetected => 4,
            QueuePhase::Completed | QueuePhase::Failed | QueuePhase::Cancelled => 5,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.order() == 5
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IvrStep {
    pub heard: String,
    pub pressed: Option<String>,
    pub at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSession {
    pub id: String,
    pub phone: String,
    pub business_name: String,
    pub reason: Option<String>,
    pub phase: QueuePhase,
    pub carrier_sid: Option<String>,
    #[serde(default)]
    pub ivr_steps: Vec<IvrStep>,
    pub hold_started_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub hold_elapsed_s: i64,
    #[serde(default)]
    pub human_detected: bool,
    pub callback_number: Option<String>,
    #[serde(default = "default_max_hold_minutes")]
    pub max_hold_minutes: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub error: Option<String>,
}

fn default_max_hold_minutes() -> i64 {
    30
}

impl QueueSession {
    pub fn new(id: String, phone: String, business_name: String, reason: Option<String>) -> Self {
        QueueSession {
            id,
            phone,
            business_name,
            reason,
            phase: QueuePhase::Initiating,
            carrier_sid: None,
            ivr_steps: Vec::new(),
            hold_started_at: None,
            hold_elapsed_s: 0,
            human_detected: false,
            callback_number: None,
            max_hold_minutes: default_max_hold_minutes(),
            created_at: chrono::Utc::now(),
            completed_at: None,
            error: None,
        }
    }

    /// Apply a phase transition under the phase-guard rule: refuse any write
    /// that would move `self.phase` backwards relative to its current order.
    /// Returns `true` if the transition was applied.
    pub fn try_advance(&mut self, next: QueuePhase) -> bool {
        if next.order() < self.phase.order() {
            return false;
        }
        self.phase = next;
        true
    }
}
