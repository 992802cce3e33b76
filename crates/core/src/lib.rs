//! Multi-agent call orchestration engine.
//!
//! This crate is the core described by the component design: session state
//! machines, the Redis-backed session store and event bus, the carrier
//! webhook reconciler, the media bridge, and the four agent workflows
//! (Blitz, Queue, CallFriend, Build) that drive them. Everything HTTP-shaped
//! — routing, CORS, the SSE and WebSocket upgrade — lives in the
//! `callforge-server` binary crate; this crate exposes plain async
//! functions and traits that binary wires up.

pub mod agents;
pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod event_bus;
pub mod kv;
pub mod llm;
pub mod logging;
pub mod media_bridge;
pub mod places;
pub mod reconciler;
pub mod router;
pub mod session_store;
pub mod telephony;
pub mod tracing_store;
pub mod tts;

pub use app::AppContext;
pub use error::{CoreError, Result};
