use base64::prelude::*;
use http_cache_reqwest::{CACacheManager, Cache, CacheMode, CacheOptions, HttpCache, HttpCacheOptions};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::Response;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use serde::de::DeserializeOwned;
use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tokio::sync::{Mutex, Semaphore};
use tokio::time::sleep;
use tracing::{debug, warn};

pub mod error;
mod macros;
pub mod market;
pub mod types;
pub mod universe;

pub use error::EsiError;
pub use macros::ESI_URL;

/// Thin wrapper around the upstream game API: connection pooling, an
/// OAuth2 bearer token, and the upstream's own error-budget backoff. It
/// knows nothing about regions, markets, or schedules -- callers build
/// those semantics on top of [`EsiClient::get`] and [`EsiClient::get_json`].
#[derive(Clone, Debug)]
pub struct EsiClient {
    errors: Arc<Mutex<u32>>,
    error_timeout: Arc<Mutex<u32>>,
    client: ClientWithMiddleware,
    component_name: String,
    platform_name: String,
    connect_pool: Arc<Semaphore>,
    auth_tok: Arc<Mutex<Option<String>>>,
    base_url: String,
}

impl EsiClient {
    pub fn new(component_name: &str, platform_name: &str, max_connections: usize) -> Self {
        Self::with_base_url(component_name, platform_name, max_connections, ESI_URL)
    }

    /// Same as [`Self::new`] but pointed at an arbitrary base URL instead
    /// of the real upstream -- used by tests to aim the client at a
    /// `wiremock` server.
    pub fn with_base_url(component_name: &str, platform_name: &str, max_connections: usize, base_url: &str) -> Self {
        EsiClient {
            errors: Arc::new(Mutex::new(100)),
            error_timeout: Arc::new(Mutex::new(0)),
            base_url: base_url.to_string(),
            client: ClientBuilder::new(
                reqwest::Client::builder()
                    .pool_max_idle_per_host(32)
                    .pool_idle_timeout(Duration::from_secs(15))
                    .timeout(Duration::from_secs(10))
                    .build()
                    .expect("failed to build the base reqwest client"),
            )
            .with(Cache(HttpCache {
                mode: CacheMode::Default,
                manager: CACacheManager::default(),
                options: HttpCacheOptions {
                    cache_key: None,
                    cache_mode_fn: None,
                    cache_options: Some(CacheOptions {
                        shared: true,
                        cache_heuristic: 0.01,
                        ignore_cargo_cult: false,
                        immutable_min_time_to_live: Duration::from_secs(24 * 3600),
                    }),
                    cache_bust: None,
                    cache_status_headers: true,
                },
            }))
            .build(),
            component_name: String::from(component_name),
            platform_name: String::from(platform_name),
            connect_pool: Arc::new(Semaphore::new(max_connections)),
            auth_tok: Arc::new(Mutex::new(None)),
        }
    }

    /// Issue a GET against `{ESI_URL}{path}`, honoring the error-budget
    /// backoff and retrying once on a bare transport failure.
    pub async fn get(&self, path: &str) -> Result<Response, EsiError> {
        let _permit = self.connect_pool.acquire().await.expect("semaphore closed");

        {
            let errors = self.errors.lock().await;
            if *errors <= 10 {
                self.await_esi_timeout().await;
            }
        }

        let auth_tok = self.auth_tok_if_valid().await;

        let build_request = || {
            let mut req = self.client.get([self.base_url.as_str(), path].join("")).header(
                USER_AGENT,
                format!(
                    "{}; component of market-streamer (+https://github.com/market-streamer) on {}",
                    self.component_name, self.platform_name
                ),
            );
            if let Some(tok) = &auth_tok {
                req = req.header(AUTHORIZATION, format!("Bearer {tok}"));
            }
            req
        };

        let mut result = build_request().send().await;

        // A single unconditional retry on transport failure only -- status
        // errors (4xx/5xx) go through the ESI error-budget path below and
        // must not be blindly retried.
        if result.is_err() {
            warn!(path, "transport error talking to ESI, retrying once");
            *self.errors.lock().await -= 1;
            result = build_request().send().await;
        }

        let response = result?;

        match response.status().as_u16() {
            200 => Ok(response),
            403 => {
                self.record_error_budget(&response).await;
                Err(EsiError::PermissionDenied)
            }
            420 => {
                self.await_esi_timeout().await;
                Err(EsiError::Status(response.status()))
            }
            400..=499 => {
                self.record_error_budget(&response).await;
                Err(EsiError::Status(response.status()))
            }
            500..=599 => Err(EsiError::Status(response.status())),
            _ => {
                warn!(status = %response.status(), "unknown ESI status code");
                Err(EsiError::Status(response.status()))
            }
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, EsiError> {
        Ok(self.get(path).await?.json::<T>().await?)
    }

    async fn record_error_budget(&self, response: &Response) {
        if let Some(remain) = response
            .headers()
            .get("x-esi-error-limit-remain")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
        {
            *self.errors.lock().await = remain;
        }
        if let Some(reset) = response
            .headers()
            .get("x-esi-error-limit-reset")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
        {
            *self.error_timeout.lock().await = reset;
        }
    }

    async fn auth_tok_if_valid(&self) -> Option<String> {
        let tok = self.auth_tok.lock().await.clone()?;
        if Self::jwt_is_valid(&tok) { Some(tok) } else { None }
    }

    fn jwt_is_valid(tok: &str) -> bool {
        let parts: Vec<&str> = tok.split('.').collect();
        if parts.len() != 3 {
            return false;
        }

        let payload_b64 = parts[1];
        let padded_payload = match payload_b64.len() % 4 {
            0 => payload_b64.to_string(),
            n => format!("{}{}", payload_b64, "=".repeat(4 - n)),
        };

        let Ok(decoded) = BASE64_STANDARD.decode(padded_payload.as_bytes()) else {
            return false;
        };
        let Ok(payload) = serde_json::from_slice::<serde_json::Value>(&decoded) else {
            return false;
        };
        let Some(exp) = payload.get("exp").and_then(|v| v.as_u64()) else {
            return false;
        };

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before unix epoch")
            .as_secs();

        now < exp
    }

    /// Exchange a refresh token for a fresh bearer access token.
    pub async fn load_auth_tok(
        &self,
        refresh_tok: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<(), EsiError> {
        let auth_str = BASE64_STANDARD.encode(format!("{client_id}:{client_secret}").as_bytes());

        let response = self
            .client
            .post("https://login.eveonline.com/v2/oauth/token")
            .header(AUTHORIZATION, format!("Basic {auth_str}"))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .form(&[("grant_type", "refresh_token"), ("refresh_token", refresh_tok)])
            .send()
            .await?;

        let token_response: serde_json::Value = response.json().await?;
        let access_token = token_response["access_token"]
            .as_str()
            .ok_or_else(|| EsiError::Auth("missing access_token in response".into()))?
            .to_string();

        debug!("refreshed ESI access token");
        *self.auth_tok.lock().await = Some(access_token);

        Ok(())
    }

    async fn await_esi_timeout(&self) {
        let timeout = *self.error_timeout.lock().await;
        sleep(Duration::from_secs(timeout.into())).await
    }
}
