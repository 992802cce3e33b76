//! `POST /api/chat` — routes a user message to the right agent and returns
//! immediately with a stream URL, leaving the actual workflow running as a
//! detached task. Also handles the phone-number-follow-up turn: if the
//! previous assistant reply asked for a number and this message supplies
//! one, resume the CallFriend request instead of re-classifying it.

use std::sync::OnceLock;

use axum::extract::State;
use axum::Json;
use callforge_core::domain::AgentKind;
use callforge_core::router::{classify_intent, RouterResult};
use callforge_core::AppContext;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct ChatLocation {
    #[allow(dead_code)]
    pub lat: f64,
    #[allow(dead_code)]
    pub lng: f64,
}

#[derive(Debug, Deserialize)]
pub struct ConversationMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub location: Option<ChatLocation>,
    #[serde(default)]
    pub conversation_history: Option<Vec<ConversationMessage>>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub entity_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub session_id: String,
    pub agent: AgentKind,
    pub status: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_url: Option<String>,
}

fn phone_number_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[+]?[\d\s\-()]{10,}").expect("static regex is valid"))
}

fn non_digit_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\d+]").expect("static regex is valid"))
}

fn clean_phone(raw: &str) -> String {
    non_digit_regex().replace_all(raw, "").to_string()
}

const CALL_FRIEND_INDICATORS: &[&str] = &[
    "phone number",
    "their number",
    "what's their",
    "provide me with",
    "call your friend",
    "call them",
    "connect with your friend",
];

/// True if the most recent assistant turn reads like it asked for a phone
/// number to continue a CallFriend request, or the most recent user turn
/// reads like it asked to call a named contact.
fn resuming_call_friend(history: &[ConversationMessage]) -> bool {
    let Some(last) = history.last() else { return false };
    match last.role.as_str() {
        "assistant" => {
            let lower = last.content.to_lowercase();
            CALL_FRIEND_INDICATORS.iter().any(|indicator| lower.contains(indicator))
        }
        "user" => {
            let lower = last.content.to_lowercase();
            lower.contains("call") || lower.contains("ring")
        }
        _ => false,
    }
}

fn extract_friend_name(message: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(?i)\b(?:call|ring)\s+(?:my\s+)?(?:friend\s+|mate\s+|pal\s+)?(\w+)").expect("static regex is valid"));
    re.captures(message).and_then(|caps| caps.get(1)).map(|m| m.as_str().to_string())
}

pub async fn chat(State(ctx): State<AppContext>, Json(request): Json<ChatRequest>) -> Result<Json<ChatResponse>, ApiError> {
    let message = request.message.trim();
    tracing::info!(message = %truncate(message, 50), "chat request");

    let result = classify_intent(ctx.llm.as_ref(), message).await;

    if let Some(history) = &request.conversation_history {
        if let Some(phone_match) = phone_number_regex().find(message) {
            if resuming_call_friend(history) {
                return Ok(Json(continue_call_friend(&ctx, history, phone_match.as_str()).await?));
            }
        }
    }

    let response = match result.agent {
        AgentKind::Blitz => handle_blitz(&ctx, message, &result).await?,
        AgentKind::Build => handle_build(&ctx, message, &result).await?,
        AgentKind::Bounce => not_implemented(AgentKind::Bounce),
        AgentKind::Queue => handle_queue(&ctx, &result).await?,
        AgentKind::Inbox => handle_inbox(&ctx, &request, &result).await?,
        AgentKind::CallFriend => handle_call_friend(&ctx, message, &result).await?,
        AgentKind::Bid => not_implemented(AgentKind::Bid),
        AgentKind::Chat => handle_chat(&ctx, message, &request).await?,
    };

    Ok(Json(response))
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

async fn handle_blitz(ctx: &AppContext, message: &str, result: &RouterResult) -> Result<ChatResponse, ApiError> {
    let session_id = uuid::Uuid::new_v4().to_string();
    let service = result.params.service.clone().unwrap_or_else(|| "services".to_string());

    tokio::spawn(callforge_core::agents::blitz::run(ctx.clone(), session_id.clone(), message.to_string(), result.params.clone()));

    Ok(ChatResponse {
        session_id: session_id.clone(),
        agent: AgentKind::Blitz,
        status: "searching".to_string(),
        message: format!("On it! Let me find some {service} for you..."),
        stream_url: Some(format!("/api/blitz/stream/{session_id}")),
    })
}

async fn handle_build(ctx: &AppContext, message: &str, result: &RouterResult) -> Result<ChatResponse, ApiError> {
    let session_id = uuid::Uuid::new_v4().to_string();
    let site_type = result.params.service.clone().unwrap_or_else(|| "website".to_string());

    tokio::spawn(callforge_core::agents::build::run(ctx.clone(), session_id.clone(), message.to_string()));

    Ok(ChatResponse {
        session_id: session_id.clone(),
        agent: AgentKind::Build,
        status: "building".to_string(),
        message: format!("On it! Let me build a {site_type} for you..."),
        stream_url: Some(format!("/api/build/stream/{session_id}")),
    })
}

async fn handle_queue(ctx: &AppContext, result: &RouterResult) -> Result<ChatResponse, ApiError> {
    let session_id = uuid::Uuid::new_v4().to_string();
    let phone_number = result.params.notes.clone().unwrap_or_default();
    let business_name = result.params.service.clone().unwrap_or_else(|| "Unknown".to_string());
    let reason = result.params.action.clone();

    if phone_number.is_empty() || !phone_number.chars().any(|c| c.is_ascii_digit()) {
        return Ok(ChatResponse {
            session_id,
            agent: AgentKind::Queue,
            status: "pending".to_string(),
            message: format!("I can wait on hold at {business_name} for you! What's their phone number?"),
            stream_url: None,
        });
    }

    tokio::spawn(callforge_core::agents::queue::start(ctx.clone(), session_id.clone(), phone_number, business_name.clone(), reason));

    Ok(ChatResponse {
        session_id: session_id.clone(),
        agent: AgentKind::Queue,
        status: "calling".to_string(),
        message: format!("On it! I'm calling {business_name} and will wait on hold for you. I'll let you know when a human picks up."),
        stream_url: Some(format!("/api/queue/stream/{session_id}")),
    })
}

async fn handle_inbox(ctx: &AppContext, request: &ChatRequest, _result: &RouterResult) -> Result<ChatResponse, ApiError> {
    let session_id = uuid::Uuid::new_v4().to_string();
    let entity_id = request.entity_id.clone().unwrap_or_else(|| "default".to_string());

    tokio::spawn(callforge_core::agents::inbox::run(ctx.clone(), session_id.clone(), entity_id));

    Ok(ChatResponse {
        session_id: session_id.clone(),
        agent: AgentKind::Inbox,
        status: "checking".to_string(),
        message: "Let me check your inbox...".to_string(),
        stream_url: Some(format!("/api/inbox/stream/{session_id}")),
    })
}

async fn handle_call_friend(ctx: &AppContext, message: &str, result: &RouterResult) -> Result<ChatResponse, ApiError> {
    let session_id = uuid::Uuid::new_v4().to_string();
    let friend_name = result.params.service.clone().unwrap_or_else(|| "your friend".to_string());
    let question = result.params.action.clone().unwrap_or_else(|| message.to_string());

    let phone_number = result
        .params
        .notes
        .clone()
        .or_else(|| phone_number_regex().find(message).map(|m| clean_phone(m.as_str())));

    let Some(phone_number) = phone_number.filter(|p| !p.is_empty()) else {
        return Ok(ChatResponse {
            session_id,
            agent: AgentKind::CallFriend,
            status: "awaiting_phone".to_string(),
            message: format!("I'll call {friend_name} for you! What's their phone number?"),
            stream_url: None,
        });
    };

    tokio::spawn(callforge_core::agents::call_friend::run(
        ctx.clone(),
        session_id.clone(),
        friend_name.clone(),
        clean_phone(&phone_number),
        question.clone(),
    ));

    Ok(ChatResponse {
        session_id: session_id.clone(),
        agent: AgentKind::CallFriend,
        status: "calling".to_string(),
        message: format!("Calling {friend_name} now! I'll ask: \"{question}\""),
        stream_url: Some(format!("/api/call_friend/stream/{session_id}")),
    })
}

async fn continue_call_friend(ctx: &AppContext, history: &[ConversationMessage], phone_match: &str) -> Result<ChatResponse, ApiError> {
    let session_id = uuid::Uuid::new_v4().to_string();

    let mut friend_name = "your friend".to_string();
    let mut question = "checking in".to_string();
    for msg in history.iter().rev() {
        if msg.role == "user" && (msg.content.to_lowercase().contains("call") || msg.content.to_lowercase().contains("ring")) {
            question = msg.content.clone();
            if let Some(name) = extract_friend_name(&msg.content) {
                friend_name = name;
            }
            break;
        }
    }

    let phone_number = clean_phone(phone_match);
    tokio::spawn(callforge_core::agents::call_friend::run(
        ctx.clone(),
        session_id.clone(),
        friend_name.clone(),
        phone_number,
        question,
    ));

    Ok(ChatResponse {
        session_id: session_id.clone(),
        agent: AgentKind::CallFriend,
        status: "calling".to_string(),
        message: format!("Calling {friend_name} now!"),
        stream_url: Some(format!("/api/call_friend/stream/{session_id}")),
    })
}

async fn handle_chat(ctx: &AppContext, message: &str, request: &ChatRequest) -> Result<ChatResponse, ApiError> {
    let mut messages = vec![callforge_core::llm::ChatMessage::system(
        "You are Callforge's friendly assistant. Answer briefly and naturally.",
    )];
    if let Some(history) = &request.conversation_history {
        for msg in history {
            match msg.role.as_str() {
                "assistant" => messages.push(callforge_core::llm::ChatMessage::assistant(msg.content.clone())),
                _ => messages.push(callforge_core::llm::ChatMessage::user(msg.content.clone())),
            }
        }
    }
    messages.push(callforge_core::llm::ChatMessage::user(message.to_string()));

    let response = ctx
        .llm
        .complete(&messages, 0.7, 400)
        .await
        .unwrap_or_else(|_| "Sorry, I'm having trouble responding right now.".to_string());

    Ok(ChatResponse {
        session_id: uuid::Uuid::new_v4().to_string(),
        agent: AgentKind::Chat,
        status: "complete".to_string(),
        message: response,
        stream_url: None,
    })
}

fn not_implemented(agent: AgentKind) -> ChatResponse {
    ChatResponse {
        session_id: uuid::Uuid::new_v4().to_string(),
        agent,
        status: "pending".to_string(),
        message: format!("The {} agent is coming soon! For now, I can help you find services with Blitz.", agent.as_str()),
        stream_url: None,
    }
}
