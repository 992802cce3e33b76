//! Intent classification: routes a user's chat message to one of the
//! orchestration agents via a single-shot LLM call, falling back
//! deterministically to `chat` at confidence 0.5 on any parse or transport
//! failure so classification never blocks the conversation.

use serde::{Deserialize, Serialize};

use crate::domain::AgentKind;
use crate::llm::{ChatMessage, LlmClient};

pub const ROUTER_SYSTEM_PROMPT: &str = r#"You are a router for Callforge, an AI assistant that makes phone calls on behalf of users.

Classify the user's intent and output ONLY valid JSON:
{"agent": "blitz|build|bounce|queue|bid|inbox|call_friend|chat", "params": {...}, "confidence": 0.0-1.0}

PRIORITY ORDER (check in this order):
1. call_friend: HIGHEST PRIORITY. If user says "call my friend/mate/mom/dad/brother/sister [NAME]" or "ring [NAME]" or "call [NAME] and ask...", this is ALWAYS call_friend, even if the message mentions restaurants, activities, or places. The user wants YOU to call their FRIEND, not search for businesses.
2. blitz: Find services, get quotes, check availability from BUSINESSES (not personal contacts)
3. Other agents as described below

Agents:
- call_friend: Call a specific PERSON (friend, family member, contact by name) with a custom message or question. Keywords: "call my friend", "ring my mate", "call [person's name] and ask", "call my mom/dad/brother/sister". The rest of the message is what to ASK them.
- blitz: Find services, get quotes, check availability from BUSINESSES. Plumbers, electricians, restaurants, dentists, etc. NOT personal contacts.
- build: Build, create, or make websites, landing pages, portfolios, apps, web pages
- bounce: Cancel subscriptions (Netflix, gym, etc.)
- queue: Wait on hold for someone (HMRC, bank, etc.)
- bid: Negotiate bills lower (Sky, broadband, etc.)
- inbox: Check email, read inbox, email summaries, mail updates
- chat: Greetings, help questions, or general conversation

CRITICAL DISTINCTION:
- "call my friend Alex about sushi" -> call_friend (calling a PERSON named Alex)
- "find sushi restaurants" -> blitz (searching for BUSINESSES)
- "find Alex's Plumbing" -> blitz (Alex's Plumbing is a business name)

Params for call_friend:
- service: the friend/contact's NAME
- action: the question/message to ask them
- notes: phone number if provided
- location: where to meet (if mentioned)
- timeframe: when (if mentioned)

Params for blitz:
- service: the type of service/business needed
- timeframe: when they need it
- location: where they need it
- action: what they want (quote, book, find, availability)
- notes: any extra details mentioned

Params for build:
- service: type of site (landing page, portfolio, restaurant menu, coming soon, etc.)
- notes: description of what to build, business name, style preferences, content details

Output ONLY the JSON, no explanation or markdown."#;

/// Freeform slots extracted by the router. All optional since any given
/// message may only populate a handful of them, and meaning varies per
/// agent (`service` is a business type for blitz, a person's name for
/// call_friend).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouterParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeframe: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterResult {
    pub agent: AgentKind,
    pub params: RouterParams,
    pub confidence: f32,
}

impl RouterResult {
    fn fallback() -> Self {
        RouterResult {
            agent: AgentKind::Chat,
            params: RouterParams::default(),
            confidence: 0.5,
        }
    }
}

/// Classify a user's message against the agent catalog. Any failure —
/// missing API key, transport error, unparseable response — degrades to
/// the `chat` agent at confidence 0.5 rather than propagating an error,
/// matching the router's "never blocks the conversation" contract.
pub async fn classify_intent(llm: &dyn LlmClient, user_message: &str) -> RouterResult {
    let messages = vec![
        ChatMessage::system(ROUTER_SYSTEM_PROMPT),
        ChatMessage::user(user_message),
    ];

    match llm.complete(&messages, 0.1, 200).await {
        Ok(content) => parse_router_response(&content),
        Err(err) => {
            tracing::warn!(error = %err, "router classification call failed, falling back to chat");
            RouterResult::fallback()
        }
    }
}

/// Strip markdown code fences and parse the router's JSON payload,
/// clamping confidence into `[0, 1]` and defaulting to `chat` on any
/// unrecognized agent name or malformed JSON.
fn parse_router_response(content: &str) -> RouterResult {
    let stripped = strip_markdown_fences(content);

    #[derive(Deserialize)]
    struct RawResponse {
        #[serde(default)]
        agent: Option<String>,
        #[serde(default)]
        params: RouterParams,
        #[serde(default)]
        confidence: Option<f32>,
    }

    let parsed: RawResponse = match serde_json::from_str(&stripped) {
        Ok(p) => p,
        Err(err) => {
            tracing::warn!(error = %err, "failed to parse router response");
            return RouterResult::fallback();
        }
    };

    let Some(agent) = parsed.agent.as_deref().and_then(AgentKind::from_str_loose) else {
        return RouterResult::fallback();
    };

    let confidence = parsed.confidence.unwrap_or(1.0).clamp(0.0, 1.0);

    RouterResult {
        agent,
        params: parsed.params,
        confidence,
    }
}

fn strip_markdown_fences(content: &str) -> String {
    if !content.contains("```") {
        return content.to_string();
    }
    let parts: Vec<&str> = content.split("```").collect();
    if parts.len() < 2 {
        return content.trim().to_string();
    }
    let mut inner = parts[1];
    if let Some(rest) = inner.strip_prefix("json") {
        inner = rest;
    }
    inner.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_json_fence() {
        let raw = "```json\n{\"agent\": \"blitz\", \"params\": {}, \"confidence\": 0.9}\n```";
        let result = parse_router_response(raw);
        assert_eq!(result.agent, AgentKind::Blitz);
        assert_eq!(result.confidence, 0.9);
    }

    #[test]
    fn parses_bare_json() {
        let raw = r#"{"agent": "call_friend", "params": {"service": "Alex"}, "confidence": 0.98}"#;
        let result = parse_router_response(raw);
        assert_eq!(result.agent, AgentKind::CallFriend);
        assert_eq!(result.params.service.as_deref(), Some("Alex"));
    }

    #[test]
    fn unknown_agent_falls_back_to_chat() {
        let raw = r#"{"agent": "unknown_thing", "confidence": 0.8, "params": {"service": "x"}}"#;
        let result = parse_router_response(raw);
        assert_eq!(result.agent, AgentKind::Chat);
        assert_eq!(result.confidence, 0.5);
        assert_eq!(result.params, RouterParams::default());
    }

    #[test]
    fn malformed_json_falls_back() {
        let result = parse_router_response("not json at all");
        assert_eq!(result.agent, AgentKind::Chat);
        assert_eq!(result.confidence, 0.5);
    }

    #[test]
    fn confidence_is_clamped() {
        let raw = r#"{"agent": "blitz", "confidence": 4.2}"#;
        let result = parse_router_response(raw);
        assert_eq!(result.confidence, 1.0);
    }
}
