//! Domain types shared across the orchestration engine.
//!
//! `Session` is the tagged variant (sum type) the design notes call for in
//! place of the original's tagged dicts: each agent's workflow is a pure
//! function over its own variant, and the SSE Gateway's terminal-set table is
//! a `match` over the same tag.

mod blitz;
mod build;
mod business;
mod call_friend;
mod call_record;
mod event;
mod inbox;
mod queue;

pub use blitz::{BlitzSession, BlitzStatus};
pub use build::{BuildSession, BuildStatus};
pub use business::Business;
pub use call_friend::{CallFriendPhase, CallFriendSession, TranscriptEntry, TranscriptRole};
pub use call_record::{CallRecord, CallStatus};
pub use event::Event;
pub use inbox::{InboxPhase, InboxSession};
pub use queue::{IvrStep, QueuePhase, QueueSession};

use serde::{Deserialize, Serialize};

/// The agent a user message is routed to, and the kind tag for a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    Blitz,
    Build,
    Bounce,
    Queue,
    Bid,
    Inbox,
    CallFriend,
    Chat,
}

impl AgentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Blitz => "blitz",
            AgentKind::Build => "build",
            AgentKind::Bounce => "bounce",
            AgentKind::Queue => "queue",
            AgentKind::Bid => "bid",
            AgentKind::Inbox => "inbox",
            AgentKind::CallFriend => "call_friend",
            AgentKind::Chat => "chat",
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "blitz" => Some(AgentKind::Blitz),
            "build" => Some(AgentKind::Build),
            "bounce" => Some(AgentKind::Bounce),
            "queue" => Some(AgentKind::Queue),
            "bid" => Some(AgentKind::Bid),
            "inbox" => Some(AgentKind::Inbox),
            "call_friend" | "callfriend" => Some(AgentKind::CallFriend),
            "chat" => Some(AgentKind::Chat),
            _ => None,
        }
    }
}

/// Sum type over every session kind the orchestration engine owns state for.
///
/// Only the four core agents (Blitz, Queue, CallFriend, Build) plus the
/// minimal Inbox placeholder are represented — Bounce/Bid/Chat never create
/// a session, they're handled entirely by the Intent Router's response to
/// `/api/chat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Session {
    Blitz(BlitzSession),
    Queue(QueueSession),
    CallFriend(CallFriendSession),
    Build(BuildSession),
    Inbox(InboxSession),
}

impl Session {
    pub fn id(&self) -> &str {
        match self {
            Session::Blitz(s) => &s.id,
            Session::Queue(s) => &s.id,
            Session::CallFriend(s) => &s.id,
            Session::Build(s) => &s.id,
            Session::Inbox(s) => &s.id,
        }
    }

    pub fn agent_kind(&self) -> AgentKind {
        match self {
            Session::Blitz(_) => AgentKind::Blitz,
            Session::Queue(_) => AgentKind::Queue,
            Session::CallFriend(_) => AgentKind::CallFriend,
            Session::Build(_) => AgentKind::Build,
            Session::Inbox(_) => AgentKind::Inbox,
        }
    }
}
