use serde::{Deserialize, Serialize};

use super::{Business, CallRecord};
use crate::router::RouterParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlitzStatus {
    Searching,
    Calling,
    Complete,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlitzSession {
    pub id: String,
    pub user_message: String,
    pub parsed_params: RouterParams,
    pub status: BlitzStatus,
    #[serde(default)]
    pub businesses: Vec<Business>,
    #[serde(default)]
    pub calls: Vec<CallRecord>,
    pub summary: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub error: Option<String>,
}

impl BlitzSession {
    pub fn new(id: String, user_message: String, parsed_params: RouterParams) -> Self {
        BlitzSession {
            id,
            user_message,
            parsed_params,
            status: BlitzStatus::Searching,
            businesses: Vec::new(),
            calls: Vec::new(),
            summary: None,
            created_at: chrono::Utc::now(),
            completed_at: None,
            error: None,
        }
    }
}
