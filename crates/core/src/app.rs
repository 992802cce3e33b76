//! Wires every long-lived collaborator into one shared context.
//!
//! `AppContext` is what the HTTP binding layer hands to every handler and
//! what each agent workflow closes over when it's spawned. A single async
//! constructor assembles the collaborators once at startup, then cheap
//! `Arc` clones flow into each concurrent task.

use std::sync::Arc;

use crate::config::Settings;
use crate::event_bus::EventBus;
use crate::kv::{KeyValueStore, RedisStore};
use crate::llm::{LlmClient, NimClient};
use crate::places::PlacesResolver;
use crate::session_store::SessionStore;
use crate::telephony::{TelephonyDriver, TwilioDriver};
use crate::tracing_store::TracingStore;
use crate::tts::TtsCache;

#[derive(Clone)]
pub struct AppContext {
    pub settings: Arc<Settings>,
    pub kv: Arc<dyn KeyValueStore>,
    pub sessions: SessionStore,
    pub events: EventBus,
    pub tts: TtsCache,
    pub llm: Arc<dyn LlmClient>,
    pub places: Arc<PlacesResolver>,
    pub telephony: Arc<dyn TelephonyDriver>,
    pub tracing_store: Arc<TracingStore>,
}

impl AppContext {
    pub async fn connect(settings: Settings) -> crate::error::Result<Self> {
        let kv: Arc<dyn KeyValueStore> = Arc::new(RedisStore::connect(&settings.redis_url).await?);
        Self::with_kv(settings, kv)
    }

    /// Build the context from an already-connected store. Split out from
    /// [`Self::connect`] so tests can substitute `kv::mock::MockStore`
    /// without a live Redis.
    pub fn with_kv(settings: Settings, kv: Arc<dyn KeyValueStore>) -> crate::error::Result<Self> {
        let settings = Arc::new(settings);
        let llm: Arc<dyn LlmClient> = Arc::new(NimClient::new(&settings.llm));
        let places = Arc::new(PlacesResolver::new(&settings.places, settings.demo_mode));
        let telephony: Arc<dyn TelephonyDriver> =
            Arc::new(TwilioDriver::new(&settings.telephony, &settings.backend_url, settings.demo_mode));
        let tracing_store = Arc::new(TracingStore::new());

        Ok(AppContext {
            sessions: SessionStore::new(kv.clone()),
            events: EventBus::new(kv.clone()),
            tts: TtsCache::new(kv.clone(), &settings.voice),
            kv,
            settings,
            llm,
            places,
            telephony,
            tracing_store,
        })
    }
}
