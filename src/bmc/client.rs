//! Management Controller HTTP Client
//!
//! One hardened `reqwest` client per exporter. Every component that talks to a
//! device goes through [`FetchClient::get_json`].
//!
//! # Session budget
//!
//! Controllers cap concurrent authenticated sessions (often around four) and fail
//! requests beyond that, so the connection pool keeps at most one idle connection
//! per host; request concurrency itself is bounded by the task pool.
//!
//! # Retry policy
//!
//! | Response | Behaviour |
//! |---|---|
//! | network error, 5xx | retried `max_retries` times after a fixed `retry_wait_ms` |
//! | 404, [`Presence::Expected`] | retried `not_found_retries` times (controllers race during boot) |
//! | 404, [`Presence::Optional`] | returned immediately as `NotFound` |
//! | 401 | one fresh credential read from the secret backend, then one retry |
//! | other 4xx | returned as `Status` |
//!
//! A second 401 after rotation is [`ExporterError::Auth`]. Without a secret backend
//! no rotation is possible and the 401 is [`ExporterError::Unauthorized`].

use super::Target;
use crate::config::FetchConfig;
use crate::credentials::CredentialStore;
use crate::error::{ExporterError, Result};
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use secrecy::ExposeSecret;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Whether a resource is known to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    /// Listed by the device itself; a 404 is probably a boot-time race.
    Expected,
    /// May legitimately be absent on this hardware.
    Optional,
}

pub struct FetchClient {
    http: reqwest::Client,
    target: Target,
    credentials: Arc<CredentialStore>,
    max_retries: u32,
    not_found_retries: u32,
    retry_wait: Duration,
    /// Bumped on every credential rotation so concurrent 401s rotate once.
    generation: AtomicU64,
    rotation: Mutex<()>,
}

impl FetchClient {
    /// Build a client for `target`. A `proxy` override replaces any proxy taken
    /// from the environment.
    pub fn new(
        config: &FetchConfig,
        target: Target,
        credentials: Arc<CredentialStore>,
        proxy: Option<&str>,
    ) -> Result<Self> {
        let mut tls = native_tls::TlsConnector::builder();
        if config.insecure_skip_verify {
            // Most controllers ship self-signed certificates.
            tls.danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true);
        }
        let tls = tls
            .build()
            .map_err(|e| ExporterError::Config(e.to_string()))?;

        let mut builder = reqwest::Client::builder()
            .use_preconfigured_tls(tls)
            .pool_max_idle_per_host(1)
            .timeout(Duration::from_secs(config.timeout_seconds));

        if let Some(proxy) = proxy.filter(|p| !p.is_empty()) {
            debug!("Using proxy {} for {}", proxy, target.host);
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }

        Ok(Self {
            http: builder.build()?,
            target,
            credentials,
            max_retries: config.max_retries,
            not_found_retries: config.not_found_retries,
            retry_wait: Duration::from_millis(config.retry_wait_ms),
            generation: AtomicU64::new(0),
            rotation: Mutex::new(()),
        })
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Absolute URL for a link found in a payload.
    pub fn url(&self, link: &str) -> String {
        super::types::absolute_url(&self.target.base_url, link)
    }

    /// Force a fresh credential read unless another request already did so
    /// since `seen_generation`.
    async fn rotate(&self, seen_generation: u64) -> Result<()> {
        let _guard = self.rotation.lock().await;
        if self.generation.load(Ordering::SeqCst) != seen_generation {
            debug!("Credentials for {} already rotated", self.target.host);
            return Ok(());
        }
        info!(
            "Received 401 from {}, fetching fresh credentials",
            self.target.host
        );
        self.credentials
            .get_credentials(&self.target.credential_profile, &self.target.host, &[])
            .await?;
        self.generation.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// GET `url` and decode the body as JSON, applying the retry policy.
    pub async fn get_json(&self, url: &str, presence: Presence) -> Result<Value> {
        let mut failures = 0;
        let mut not_found = 0;
        let mut rotated = false;

        loop {
            let generation = self.generation.load(Ordering::SeqCst);
            let credential = self
                .credentials
                .resolve(&self.target.credential_profile, &self.target.host)
                .await?;

            debug!("GET {}", url);
            let result = self
                .http
                .get(url)
                .header(ACCEPT, "application/json")
                .basic_auth(&credential.username, Some(credential.password.expose_secret()))
                .send()
                .await;

            let response = match result {
                Ok(response) => response,
                Err(e) if failures < self.max_retries => {
                    failures += 1;
                    warn!(
                        "Request to {} failed, retrying ({}/{}): {}",
                        url, failures, self.max_retries, e
                    );
                    tokio::time::sleep(self.retry_wait).await;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let status = response.status();
            match status {
                StatusCode::UNAUTHORIZED if rotated => {
                    return Err(ExporterError::Auth(format!(
                        "{} rejected fresh credentials for {}",
                        self.target.host, url
                    )));
                }
                StatusCode::UNAUTHORIZED if !self.credentials.has_backend() => {
                    return Err(ExporterError::Unauthorized(url.to_string()));
                }
                StatusCode::UNAUTHORIZED => {
                    self.rotate(generation).await?;
                    rotated = true;
                }
                StatusCode::NOT_FOUND
                    if presence == Presence::Expected && not_found < self.not_found_retries =>
                {
                    not_found += 1;
                    debug!(
                        "{} returned 404, retrying ({}/{})",
                        url, not_found, self.not_found_retries
                    );
                    tokio::time::sleep(self.retry_wait).await;
                }
                StatusCode::NOT_FOUND => return Err(ExporterError::NotFound(url.to_string())),
                s if s.is_server_error() && failures < self.max_retries => {
                    failures += 1;
                    warn!(
                        "{} returned {}, retrying ({}/{})",
                        url, s, failures, self.max_retries
                    );
                    tokio::time::sleep(self.retry_wait).await;
                }
                s if !s.is_success() => {
                    return Err(ExporterError::Status {
                        url: url.to_string(),
                        status: s.as_u16(),
                    });
                }
                _ => {
                    let body = response.bytes().await?;
                    return serde_json::from_slice(&body).map_err(ExporterError::from);
                }
            }
        }
    }
}
