use serde::Deserialize;
use thiserror::Error;

fn default_log_level() -> String {
    "info".into()
}

fn default_zmq_bind_endpoint() -> String {
    "tcp://127.0.0.1:8050".into()
}

fn default_location_service_url() -> String {
    "https://static-data.internal/v1/location/".into()
}

#[derive(Error, Debug)]
#[error("missing or malformed configuration: {0}")]
pub struct ConfigMissing(String);

/// Process configuration, loaded once at startup from the environment
/// (prefix `MARKET_STREAMER_`), with a local `.env` file merged in first
/// when present.
#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    pub client_id: String,
    pub secret_key: String,
    pub refresh_token: String,
    #[serde(default = "default_zmq_bind_endpoint")]
    pub zmq_bind_endpoint: String,
    #[serde(default = "default_location_service_url")]
    pub location_service_url: String,
}

impl Config {
    pub fn load() -> Result<Self, ConfigMissing> {
        // Best-effort: a missing `.env` file is normal in production.
        let _ = dotenvy::dotenv();

        envy::prefixed("MARKET_STREAMER_")
            .from_env::<Config>()
            .map_err(|e| ConfigMissing(e.to_string()))
    }
}
