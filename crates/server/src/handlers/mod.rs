pub mod blitz;
pub mod build;
pub mod call_friend;
pub mod chat;
pub mod inbox;
pub mod queue;

pub const BLITZ_TERMINAL_EVENTS: &[&str] = &["session_complete", "error"];
pub const QUEUE_TERMINAL_EVENTS: &[&str] = &["queue_human_detected", "queue_failed"];
pub const CALL_FRIEND_TERMINAL_EVENTS: &[&str] = &["session_complete", "error"];
pub const BUILD_TERMINAL_EVENTS: &[&str] = &["build_complete", "build_error", "build_clarification"];
pub const INBOX_TERMINAL_EVENTS: &[&str] = &["inbox_complete", "inbox_error", "inbox_auth_required"];
