//! Typed settings surface, parsed once from the process environment at startup.
//!
//! A flat struct with nested groups, each defaulted and then overridden from
//! env vars, since every credential here (`TWILIO_*`, `NVIDIA_API_KEY`, ...)
//! is a secret that belongs in the environment, not a config file.

use std::env;
use std::time::Duration;

/// Carrier (Twilio-compatible) credentials. Missing credentials are not a
/// startup error — the Telephony Driver falls back to returning errors per call,
/// which agents already treat as an isolated per-call failure.
#[derive(Debug, Clone, Default)]
pub struct TelephonyConfig {
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    pub from_number: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct VoiceConfig {
    pub elevenlabs_api_key: Option<String>,
    pub elevenlabs_agent_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct LlmConfig {
    pub nvidia_api_key: Option<String>,
    pub mistral_api_key: Option<String>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PlacesConfig {
    pub google_places_api_key: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct InboxConfig {
    pub composio_api_key: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TracingIntegrationConfig {
    pub wandb_api_key: Option<String>,
    pub weave_project: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub telephony: TelephonyConfig,
    pub voice: VoiceConfig,
    pub llm: LlmConfig,
    pub places: PlacesConfig,
    pub inbox: InboxConfig,
    pub tracing_integration: TracingIntegrationConfig,

    pub redis_url: String,
    pub backend_url: String,
    pub cors_origins: Vec<String>,
    pub demo_mode: bool,
    pub rate_limit_per_minute: u32,

    pub log_filter: String,
    pub log_json: bool,
}

const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8080";
const DEFAULT_RATE_LIMIT_PER_MINUTE: u32 = 60;

impl Settings {
    /// Load settings from the process environment.
    ///
    /// Structurally required values (`REDIS_URL`) fail fast with a
    /// [`crate::error::CoreError::Config`] if they're present but unparseable;
    /// everything else defaults rather than aborting startup, matching the
    /// spec's "configuration missing → fallback path" error taxonomy.
    pub fn from_env() -> crate::error::Result<Self> {
        let redis_url = env::var("REDIS_URL").unwrap_or_else(|_| DEFAULT_REDIS_URL.to_string());
        // Fail fast: a malformed REDIS_URL is a deployment mistake, not a
        // missing-optional-credential case, so we validate eagerly here.
        redis::parse_redis_url(&redis_url)
            .ok_or_else(|| crate::error::CoreError::Config(format!("invalid REDIS_URL: {redis_url}")))?;

        let rate_limit_per_minute = env::var("RATE_LIMIT_PER_MINUTE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_RATE_LIMIT_PER_MINUTE);

        Ok(Settings {
            telephony: TelephonyConfig {
                account_sid: non_empty_env("TWILIO_ACCOUNT_SID"),
                auth_token: non_empty_env("TWILIO_AUTH_TOKEN"),
                from_number: non_empty_env("TWILIO_PHONE_NUMBER"),
            },
            voice: VoiceConfig {
                elevenlabs_api_key: non_empty_env("ELEVENLABS_API_KEY"),
                elevenlabs_agent_id: non_empty_env("ELEVENLABS_AGENT_ID"),
            },
            llm: LlmConfig {
                nvidia_api_key: non_empty_env("NVIDIA_API_KEY"),
                mistral_api_key: non_empty_env("MISTRAL_API_KEY"),
                model: non_empty_env("NVIDIA_MODEL"),
            },
            places: PlacesConfig {
                google_places_api_key: non_empty_env("GOOGLE_PLACES_API_KEY"),
            },
            inbox: InboxConfig {
                composio_api_key: non_empty_env("COMPOSIO_API_KEY"),
            },
            tracing_integration: TracingIntegrationConfig {
                wandb_api_key: non_empty_env("WANDB_API_KEY"),
                weave_project: non_empty_env("WEAVE_PROJECT"),
            },
            redis_url,
            backend_url: env::var("BACKEND_URL").unwrap_or_else(|_| DEFAULT_BACKEND_URL.to_string()),
            cors_origins: normalize_cors_origins(env::var("CORS_ORIGINS").unwrap_or_default()),
            demo_mode: env::var("DEMO_MODE")
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
            rate_limit_per_minute,
            log_filter: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            log_json: env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false),
        })
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(60)
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

/// Normalize a comma-separated `CORS_ORIGINS` value: trim whitespace, drop
/// empty entries, and prepend `https://` to any entry that has no scheme.
/// Idempotent — re-normalizing an already-normalized list is a no-op.
fn normalize_cors_origins(raw: String) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|origin| {
            if origin.contains("://") {
                origin.to_string()
            } else {
                format!("https://{origin}")
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_bare_hosts() {
        let origins = normalize_cors_origins("example.com, https://app.example.com ,,localhost:3000".into());
        assert_eq!(
            origins,
            vec![
                "https://example.com".to_string(),
                "https://app.example.com".to_string(),
                "https://localhost:3000".to_string(),
            ]
        );
    }

    #[test]
    fn normalization_is_idempotent() {
        let once = normalize_cors_origins("example.com".into());
        let twice = normalize_cors_origins(once.join(","));
        assert_eq!(once, twice);
    }

    #[test]
    fn empty_cors_origins_yields_empty_list() {
        assert!(normalize_cors_origins(String::new()).is_empty());
    }
}
