use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    Planning,
    Generating,
    ClarificationNeeded,
    Complete,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildSession {
    pub id: String,
    pub description: String,
    /// filename -> content. `BTreeMap` keeps iteration order deterministic,
    /// which matters for the `build_progress(file=...)` event sequence.
    #[serde(default)]
    pub files: BTreeMap<String, String>,
    pub status: BuildStatus,
    pub preview_id: Option<String>,
    pub summary: Option<String>,
    #[serde(default)]
    pub features: Vec<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub error: Option<String>,
}

impl BuildSession {
    pub fn new(id: String, description: String) -> Self {
        BuildSession {
            id,
            description,
            files: BTreeMap::new(),
            status: BuildStatus::Planning,
            preview_id: None,
            summary: None,
            features: Vec::new(),
            created_at: chrono::Utc::now(),
            completed_at: None,
            error: None,
        }
    }
}
