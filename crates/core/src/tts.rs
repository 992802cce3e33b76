//! Content-addressed cache for synthesized speech audio, plus the ElevenLabs
//! synthesis call that fills it. The cache key is `md5(text)`, audio is
//! stored base64-encoded with a 24h TTL, and a lookup is cache-first:
//! `POST .../text-to-speech/{voice_id}` with an `xi-api-key` header only
//! fires on a miss, after which the result is cached for next time.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use md5::{Digest, Md5};
use serde::Serialize;

use crate::config::VoiceConfig;
use crate::error::Result;
use crate::kv::KeyValueStore;

const CACHE_TTL_SECONDS: u64 = 86_400;
const ELEVENLABS_API_URL: &str = "https://api.elevenlabs.io/v1";
const DEFAULT_VOICE_ID: &str = "21m00Tcm4TlvDq8ikWAM";

#[derive(Clone)]
pub struct TtsCache {
    kv: Arc<dyn KeyValueStore>,
    http: reqwest::Client,
    api_key: Option<String>,
}

#[derive(Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
}

#[derive(Serialize)]
struct SynthesizeRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

impl TtsCache {
    pub fn new(kv: Arc<dyn KeyValueStore>, voice: &VoiceConfig) -> Self {
        TtsCache {
            kv,
            http: reqwest::Client::new(),
            api_key: voice.elevenlabs_api_key.clone(),
        }
    }

    pub async fn get(&self, text: &str) -> Result<Option<Vec<u8>>> {
        let key = cache_key(text);
        match self.kv.get(&key).await? {
            Some(encoded) => {
                let bytes = BASE64.decode(encoded.as_bytes()).unwrap_or_default();
                Ok(Some(bytes))
            }
            None => Ok(None),
        }
    }

    pub async fn put(&self, text: &str, audio: &[u8]) -> Result<()> {
        let key = cache_key(text);
        let encoded = BASE64.encode(audio);
        self.kv.set_ex(&key, encoded, CACHE_TTL_SECONDS).await
    }

    /// Return cached audio for `text` if present, else synthesize it via
    /// ElevenLabs and cache the result. Returns `Ok(None)` (never an error)
    /// whenever synthesis isn't possible — no API key configured, or the
    /// ElevenLabs call itself fails — so callers can fall back to
    /// carrier-side `<Say>` markup instead of failing the whole request.
    pub async fn get_or_synthesize(&self, text: &str) -> Result<Option<Vec<u8>>> {
        if let Some(cached) = self.get(text).await? {
            return Ok(Some(cached));
        }

        let Some(api_key) = &self.api_key else { return Ok(None) };

        let url = format!("{ELEVENLABS_API_URL}/text-to-speech/{DEFAULT_VOICE_ID}");
        let body = SynthesizeRequest {
            text,
            model_id: "eleven_multilingual_v2",
            voice_settings: VoiceSettings { stability: 0.5, similarity_boost: 0.75 },
        };

        let response = match self.http.post(&url).header("xi-api-key", api_key).json(&body).send().await {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(error = %err, "elevenlabs tts request failed");
                return Ok(None);
            }
        };

        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "elevenlabs tts returned an error status");
            return Ok(None);
        }

        let audio = match response.bytes().await {
            Ok(bytes) => bytes.to_vec(),
            Err(err) => {
                tracing::warn!(error = %err, "elevenlabs tts response body unreadable");
                return Ok(None);
            }
        };

        self.put(text, &audio).await?;
        Ok(Some(audio))
    }
}

fn cache_key(text: &str) -> String {
    let digest = Md5::digest(text.as_bytes());
    format!("tts:{:x}", digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::mock::MockStore;

    fn cache() -> TtsCache {
        TtsCache::new(Arc::new(MockStore::new()), &VoiceConfig::default())
    }

    #[tokio::test]
    async fn put_then_get_roundtrips_audio() {
        let cache = cache();
        let audio = vec![1u8, 2, 3, 4, 5];
        cache.put("hello there", &audio).await.unwrap();

        let loaded = cache.get("hello there").await.unwrap();
        assert_eq!(loaded, Some(audio));
    }

    #[tokio::test]
    async fn distinct_text_yields_distinct_entries() {
        let cache = cache();
        cache.put("first", &[1]).await.unwrap();
        cache.put("second", &[2]).await.unwrap();

        assert_eq!(cache.get("first").await.unwrap(), Some(vec![1]));
        assert_eq!(cache.get("second").await.unwrap(), Some(vec![2]));
    }

    #[tokio::test]
    async fn miss_returns_none() {
        let cache = cache();
        assert_eq!(cache.get("never cached").await.unwrap(), None);
    }

    #[tokio::test]
    async fn synthesize_without_api_key_yields_none() {
        let cache = cache();
        assert_eq!(cache.get_or_synthesize("no key configured").await.unwrap(), None);
    }

    #[tokio::test]
    async fn synthesize_prefers_cache_over_network() {
        let cache = cache();
        cache.put("cached text", &[9, 9, 9]).await.unwrap();
        let audio = cache.get_or_synthesize("cached text").await.unwrap();
        assert_eq!(audio, Some(vec![9, 9, 9]));
    }

    #[test]
    fn cache_key_is_stable() {
        assert_eq!(cache_key("same text"), cache_key("same text"));
        assert_ne!(cache_key("text a"), cache_key("text b"));
    }
}
