use std::sync::Arc;

use giveaway_core::config::Settings;
use giveaway_core::draw::DrawEngine;
use giveaway_core::gateway::Messenger;
use giveaway_core::participation::Participation;
use giveaway_core::store::CampaignStore;
use giveaway_core::types::BotIdentity;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CampaignStore>,
    pub engine: DrawEngine,
    pub participation: Participation,
    pub messenger: Arc<dyn Messenger>,
    pub bot: Arc<BotIdentity>,
    pub settings: Arc<Settings>,
}

#[derive(Debug, Clone)]
pub struct RequestId(pub String);

#[cfg(test)]
pub mod test_support {
    use super::*;
    use giveaway_core::testing::{MemoryStore, RecordingMessenger, StaticGate};

    pub const BOT_TOKEN: &str = "123456:TEST-TOKEN";

    pub struct Fixture {
        pub state: AppState,
        pub store: Arc<MemoryStore>,
        pub gate: Arc<StaticGate>,
        pub messenger: Arc<RecordingMessenger>,
    }

    pub fn settings() -> Settings {
        Settings {
            database_url: "postgres://localhost/giveaway_test".to_string(),
            bot_token: BOT_TOKEN.to_string(),
            giveaway_env: "test".to_string(),
            api_bind: "127.0.0.1:0".to_string(),
            instance_id: "api-test".to_string(),
            auth_max_age_secs: 180,
            rescan_interval_secs: 30,
            stale_claim_secs: 300,
            platform_api_url: "http://127.0.0.1:9".to_string(),
            platform_timeout_secs: 1,
            platform_max_retries: 0,
            allowed_origin: "https://app.example.test".to_string(),
            operator_token: Some("op-secret".to_string()),
            webhook_secret: "hook-secret".to_string(),
            mini_app_short_name: "join".to_string(),
        }
    }

    pub fn fixture() -> Fixture {
        fixture_with_messenger(RecordingMessenger::new())
    }

    pub fn fixture_with_messenger(messenger: RecordingMessenger) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let gate = Arc::new(StaticGate::new());
        let messenger = Arc::new(messenger);
        let settings = settings();
        let engine = DrawEngine::new(
            store.clone(),
            gate.clone(),
            messenger.clone(),
            settings.instance_id.clone(),
            settings.stale_claim(),
        );
        let participation = Participation::new(store.clone(), gate.clone());
        let state = AppState {
            store: store.clone(),
            engine,
            participation,
            messenger: messenger.clone(),
            bot: Arc::new(BotIdentity {
                id: 42,
                username: "prize_bot".to_string(),
            }),
            settings: Arc::new(settings),
        };
        Fixture {
            state,
            store,
            gate,
            messenger,
        }
    }
}
