use serde::Deserialize;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database_url: String,
    pub bot_token: String,
    pub giveaway_env: String,
    pub api_bind: String,
    pub instance_id: String,
    pub auth_max_age_secs: i64,
    pub rescan_interval_secs: u64,
    pub stale_claim_secs: i64,
    pub platform_api_url: String,
    pub platform_timeout_secs: u64,
    pub platform_max_retries: u32,
    pub allowed_origin: String,
    pub operator_token: Option<String>,
    pub webhook_secret: String,
    pub mini_app_short_name: String,
}

impl Settings {
    pub fn from_env() -> Result<Self, std::env::VarError> {
        let database_url =
            std::env::var("DATABASE_URL").or_else(|_| std::env::var("GIVEAWAY_DATABASE_URL"))?;
        let bot_token =
            std::env::var("GIVEAWAY_BOT_TOKEN").or_else(|_| std::env::var("BOT_TOKEN"))?;
        let giveaway_env = std::env::var("GIVEAWAY_ENV").unwrap_or_else(|_| "dev".to_string());
        let api_bind = std::env::var("GIVEAWAY_API_BIND")
            .or_else(|_| std::env::var("PORT").map(|port| format!("0.0.0.0:{}", port)))
            .unwrap_or_else(|_| "0.0.0.0:10000".to_string());
        let instance_id = std::env::var("GIVEAWAY_INSTANCE_ID")
            .or_else(|_| std::env::var("HOSTNAME"))
            .unwrap_or_else(|_| format!("inst_{}", nanoid::nanoid!(10)));
        let auth_max_age_secs = parse_or("GIVEAWAY_AUTH_MAX_AGE_SECS", 180);
        let rescan_interval_secs = parse_or("GIVEAWAY_RESCAN_INTERVAL_SECS", 30);
        let stale_claim_secs = parse_or("GIVEAWAY_STALE_CLAIM_SECS", 300);
        let platform_api_url = std::env::var("GIVEAWAY_PLATFORM_API_URL")
            .unwrap_or_else(|_| "https://api.telegram.org".to_string());
        let platform_timeout_secs = parse_or("GIVEAWAY_PLATFORM_TIMEOUT_SECS", 10);
        let platform_max_retries = parse_or("GIVEAWAY_PLATFORM_MAX_RETRIES", 3);
        let allowed_origin =
            std::env::var("GIVEAWAY_ALLOWED_ORIGIN").unwrap_or_else(|_| "*".to_string());
        let operator_token = std::env::var("GIVEAWAY_OPERATOR_TOKEN")
            .ok()
            .filter(|v| !v.is_empty());
        let webhook_secret = std::env::var("GIVEAWAY_WEBHOOK_SECRET")
            .unwrap_or_else(|_| derive_webhook_secret(&bot_token));
        let mini_app_short_name =
            std::env::var("GIVEAWAY_MINI_APP_SHORT").unwrap_or_else(|_| "join".to_string());

        Ok(Self {
            database_url,
            bot_token,
            giveaway_env,
            api_bind,
            instance_id,
            auth_max_age_secs,
            rescan_interval_secs,
            stale_claim_secs,
            platform_api_url,
            platform_timeout_secs,
            platform_max_retries,
            allowed_origin,
            operator_token,
            webhook_secret,
            mini_app_short_name,
        })
    }

    pub fn auth_max_age(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.auth_max_age_secs)
    }

    pub fn stale_claim(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.stale_claim_secs)
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Path secret for the update receiver when none is configured. Keeps the
/// bot token itself out of URLs and access logs.
pub fn derive_webhook_secret(bot_token: &str) -> String {
    let digest = Sha256::digest(format!("webhook:{}", bot_token).as_bytes());
    hex::encode(&digest[..16])
}
