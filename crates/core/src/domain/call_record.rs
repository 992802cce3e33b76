use serde::{Deserialize, Serialize};

use super::Business;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Pending,
    Ringing,
    Connected,
    Speaking,
    Recording,
    Complete,
    NoAnswer,
    Busy,
    Failed,
}

impl CallStatus {
    /// Terminal statuses per the data model invariant: once reached, never
    /// overwritten by any writer (Telephony Driver or Reconciler).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CallStatus::Complete | CallStatus::NoAnswer | CallStatus::Busy | CallStatus::Failed
        )
    }
}

/// One outbound call leg, owned by its parent Blitz session.
///
/// `carrier_sid`, once set, is immutable — the Telephony Driver sets it at
/// placement time and the Reconciler only ever matches against it, never
/// replaces it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRecord {
    pub id: String,
    pub carrier_sid: Option<String>,
    pub business: Business,
    pub status: CallStatus,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub ended_at: Option<chrono::DateTime<chrono::Utc>>,
    pub duration_s: Option<i64>,
    #[serde(default)]
    pub transcript: Vec<String>,
    pub result: Option<String>,
    pub error: Option<String>,
    pub recording_url: Option<String>,
}

impl CallRecord {
    pub fn pending(business: Business) -> Self {
        CallRecord {
            id: uuid::Uuid::new_v4().to_string(),
            carrier_sid: None,
            business,
            status: CallStatus::Pending,
            started_at: None,
            ended_at: None,
            duration_s: None,
            transcript: Vec::new(),
            result: None,
            error: None,
            recording_url: None,
        }
    }

    /// Set `carrier_sid` only if it hasn't been set yet — enforces the
    /// "immutable once set" invariant at the type level rather than trusting
    /// every call site to check first.
    pub fn set_carrier_sid(&mut self, sid: String) {
        if self.carrier_sid.is_none() {
            self.carrier_sid = Some(sid);
        }
    }

    /// Apply a new status, refusing to overwrite a terminal one. Returns
    /// `true` if the write took effect.
    pub fn apply_status(&mut self, status: CallStatus) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = status;
        true
    }

    pub fn matches(&self, carrier_sid: Option<&str>, call_id: Option<&str>) -> bool {
        if let Some(sid) = carrier_sid {
            if self.carrier_sid.as_deref() == Some(sid) {
                return true;
            }
        }
        if let Some(id) = call_id {
            if self.id == id {
                return true;
            }
        }
        false
    }
}
