use std::{env, time::Duration};

use log::*;

const DEFAULT_MAX_CONNECTIONS: u32 = 25;
const DEFAULT_IDEMPOTENCY_TTL: Duration = Duration::from_secs(24 * 3600);
const DEFAULT_OFFER_EXPIRY: Duration = Duration::from_secs(15 * 60);
const DEFAULT_RELAY_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_RELAY_BATCH: i64 = 100;

/// Runtime configuration for the dispatch engine. Every field can be set through a `PD_`-prefixed environment
/// variable; missing or malformed values fall back to the defaults with a log message.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub database_url: String,
    pub max_connections: u32,
    /// How long a stored idempotency outcome remains replayable.
    pub idempotency_ttl: Duration,
    /// The offer deadline used when a caller does not supply one.
    pub default_offer_expiry: Duration,
    /// How often the outbox relay polls for unpublished events.
    pub relay_interval: Duration,
    /// The maximum number of outbox rows relayed per tick.
    pub relay_batch: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: String::default(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            idempotency_ttl: DEFAULT_IDEMPOTENCY_TTL,
            default_offer_expiry: DEFAULT_OFFER_EXPIRY,
            relay_interval: DEFAULT_RELAY_INTERVAL,
            relay_batch: DEFAULT_RELAY_BATCH,
        }
    }
}

impl EngineConfig {
    pub fn from_env_or_default() -> Self {
        let database_url = env::var("PD_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ PD_DATABASE_URL is not set. Please set it to the URL for the dispatch database.");
            String::default()
        });
        let max_connections = env_u64("PD_MAX_CONNECTIONS", u64::from(DEFAULT_MAX_CONNECTIONS)) as u32;
        let idempotency_ttl = Duration::from_secs(env_u64(
            "PD_IDEMPOTENCY_TTL_SECS",
            DEFAULT_IDEMPOTENCY_TTL.as_secs(),
        ));
        let default_offer_expiry =
            Duration::from_secs(env_u64("PD_OFFER_EXPIRY_SECS", DEFAULT_OFFER_EXPIRY.as_secs()));
        let relay_interval =
            Duration::from_secs(env_u64("PD_RELAY_INTERVAL_SECS", DEFAULT_RELAY_INTERVAL.as_secs()));
        let relay_batch = env_u64("PD_RELAY_BATCH", DEFAULT_RELAY_BATCH as u64) as i64;
        Self { database_url, max_connections, idempotency_ttl, default_offer_expiry, relay_interval, relay_batch }
    }
}

fn env_u64(var: &str, default: u64) -> u64 {
    match env::var(var) {
        Ok(s) => s.parse::<u64>().unwrap_or_else(|e| {
            error!("🪛️ {s} is not a valid value for {var}. {e} Using the default, {default}, instead.");
            default
        }),
        Err(_) => default,
    }
}
