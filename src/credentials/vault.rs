//! Vault Secret Backend
//!
//! Reads device credentials from a Vault KV v2 mount and keeps a renewable
//! AppRole login token alive for the life of the process.
//!
//! # Token lifecycle
//!
//! [`TokenLifecycle::start`] spawns a background task that:
//! 1. logs in with `role_id` + `secret_id` (retrying every `login_retry_seconds` on failure)
//! 2. renews the token after two thirds of each lease
//! 3. logs in again when renewal fails or the lease stops growing (max TTL reached)
//! 4. revokes the live token when [`TokenLifecycle::stop`] is called
//!
//! Scrapes read the token concurrently with renewal; it sits behind a `RwLock`.

use super::{Credential, SecretBackend};
use crate::config::{CredentialProfile, VaultConfig};
use crate::error::{ExporterError, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const TOKEN_HEADER: &str = "X-Vault-Token";

#[derive(Debug, Deserialize)]
struct AuthResponse {
    auth: AuthInfo,
}

#[derive(Debug, Deserialize)]
struct AuthInfo {
    client_token: String,
    #[serde(default)]
    lease_duration: u64,
    #[serde(default)]
    renewable: bool,
}

#[derive(Debug, Deserialize)]
struct KvResponse {
    data: KvData,
}

#[derive(Debug, Deserialize)]
struct KvData {
    #[serde(default)]
    data: serde_json::Map<String, Value>,
    #[serde(default)]
    metadata: Option<KvMetadata>,
}

#[derive(Debug, Deserialize)]
struct KvMetadata {
    #[serde(default)]
    version: Option<u64>,
}

/// Lease granted by a login or renewal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lease {
    pub duration: Duration,
    pub renewable: bool,
}

pub struct VaultClient {
    http: reqwest::Client,
    address: String,
    role_id: String,
    secret_id: SecretString,
    token: RwLock<Option<SecretString>>,
    login_retry: Duration,
    increment: u64,
}

impl VaultClient {
    pub fn new(config: &VaultConfig) -> Result<Self> {
        let mut tls = native_tls::TlsConnector::builder();
        if let Some(path) = &config.ca_cert {
            let pem = std::fs::read(path)?;
            let cert = native_tls::Certificate::from_pem(&pem)
                .map_err(|e| ExporterError::Config(format!("invalid Vault CA certificate: {}", e)))?;
            tls.add_root_certificate(cert);
        }
        let tls = tls
            .build()
            .map_err(|e| ExporterError::Config(e.to_string()))?;

        let http = reqwest::Client::builder()
            .use_preconfigured_tls(tls)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            address: config.address.trim_end_matches('/').to_string(),
            role_id: config.role_id.clone(),
            secret_id: config.secret_id.clone(),
            token: RwLock::new(None),
            login_retry: Duration::from_secs(config.login_retry_seconds.max(1)),
            increment: config.token_increment_seconds,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.address, path.trim_start_matches('/'))
    }

    async fn current_token(&self) -> Result<String> {
        self.token
            .read()
            .await
            .as_ref()
            .map(|t| t.expose_secret().to_string())
            .ok_or_else(|| ExporterError::SecretBackend("not logged in to Vault".to_string()))
    }

    async fn store_auth(&self, auth: AuthInfo) -> Lease {
        *self.token.write().await = Some(SecretString::from(auth.client_token));
        Lease {
            duration: Duration::from_secs(auth.lease_duration),
            renewable: auth.renewable,
        }
    }

    /// AppRole login; replaces the live token.
    pub async fn login(&self) -> Result<Lease> {
        let body = serde_json::json!({
            "role_id": self.role_id,
            "secret_id": self.secret_id.expose_secret(),
        });
        let response = self
            .http
            .post(self.url("auth/approle/login"))
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ExporterError::SecretBackend(format!(
                "AppRole login failed with HTTP {}",
                response.status()
            )));
        }
        let auth: AuthResponse = response.json().await?;
        let lease = self.store_auth(auth.auth).await;
        info!("Logged in to Vault (lease {:?})", lease.duration);
        Ok(lease)
    }

    /// Renew the live token by `token_increment_seconds`.
    pub async fn renew(&self) -> Result<Lease> {
        let token = self.current_token().await?;
        let response = self
            .http
            .post(self.url("auth/token/renew-self"))
            .header(TOKEN_HEADER, token)
            .json(&serde_json::json!({ "increment": format!("{}s", self.increment) }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ExporterError::SecretBackend(format!(
                "token renewal failed with HTTP {}",
                response.status()
            )));
        }
        let auth: AuthResponse = response.json().await?;
        Ok(self.store_auth(auth.auth).await)
    }

    /// Revoke and forget the live token.
    pub async fn revoke(&self) -> Result<()> {
        let Some(token) = self.token.write().await.take() else {
            return Ok(());
        };
        let response = self
            .http
            .post(self.url("auth/token/revoke-self"))
            .header(TOKEN_HEADER, token.expose_secret())
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ExporterError::SecretBackend(format!(
                "token revocation failed with HTTP {}",
                response.status()
            )));
        }
        info!("Revoked Vault token");
        Ok(())
    }

    /// Read a KV v2 secret. `Ok(None)` when the path does not exist.
    async fn read_secret(&self, mount: &str, path: &str) -> Result<Option<KvData>> {
        let token = self.current_token().await?;
        let url = self.url(&format!(
            "{}/data/{}",
            mount.trim_matches('/'),
            path.trim_matches('/')
        ));
        let response = self.http.get(&url).header(TOKEN_HEADER, token).send().await?;
        match response.status().as_u16() {
            404 => Ok(None),
            s if (200..300).contains(&s) => {
                let kv: KvResponse = response.json().await?;
                Ok(Some(kv.data))
            }
            s => Err(ExporterError::SecretBackend(format!(
                "reading {} failed with HTTP {}",
                url, s
            ))),
        }
    }
}

fn field(data: &serde_json::Map<String, Value>, name: &str) -> Option<String> {
    data.get(name).and_then(Value::as_str).map(str::to_string)
}

#[async_trait]
impl SecretBackend for VaultClient {
    async fn fetch_credential(
        &self,
        profile: &CredentialProfile,
        target: &str,
        paths: &[String],
    ) -> Result<Credential> {
        for template in paths {
            let path = template.replace("{target}", target);
            debug!("Reading secret {}/{}", profile.mount_path, path);
            let Some(kv) = self.read_secret(&profile.mount_path, &path).await? else {
                continue;
            };
            let username = field(&kv.data, &profile.user_field);
            let password = field(&kv.data, &profile.password_field);
            return match (username, password) {
                (Some(username), Some(password)) => Ok(Credential {
                    username,
                    password: SecretString::from(password),
                    version: kv.metadata.and_then(|m| m.version),
                }),
                _ => Err(ExporterError::SecretBackend(format!(
                    "secret {} is missing '{}' or '{}'",
                    path, profile.user_field, profile.password_field
                ))),
            };
        }
        Err(ExporterError::SecretBackend(format!(
            "no secret found for {} under mount {}",
            target, profile.mount_path
        )))
    }
}

/// Handle to the background login/renewal task.
pub struct TokenLifecycle {
    done: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl TokenLifecycle {
    pub fn start(client: Arc<VaultClient>) -> Self {
        let (done, done_rx) = watch::channel(false);
        let handle = tokio::spawn(run_lifecycle(client, done_rx));
        Self { done, handle }
    }

    /// Stop renewing and revoke the live token.
    pub async fn stop(self) {
        let _ = self.done.send(true);
        if let Err(e) = self.handle.await {
            warn!("Vault token lifecycle task ended abnormally: {}", e);
        }
    }
}

/// Sleep for `wait`; returns `true` if shutdown was requested first.
async fn sleep_or_done(wait: Duration, done: &mut watch::Receiver<bool>) -> bool {
    if *done.borrow() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(wait) => false,
        _ = done.changed() => true,
    }
}

/// Next renewal point: two thirds of the lease, at least one second.
fn renew_after(lease: Duration) -> Duration {
    (lease * 2 / 3).max(Duration::from_secs(1))
}

async fn run_lifecycle(client: Arc<VaultClient>, mut done: watch::Receiver<bool>) {
    'login: loop {
        let mut lease = match client.login().await {
            Ok(lease) => lease,
            Err(e) => {
                warn!(
                    "Vault login failed, retrying in {:?}: {}",
                    client.login_retry, e
                );
                if sleep_or_done(client.login_retry, &mut done).await {
                    break 'login;
                }
                continue 'login;
            }
        };

        loop {
            if lease.duration.is_zero() {
                // Non-expiring token: nothing to renew.
                let _ = done.changed().await;
                break 'login;
            }
            if sleep_or_done(renew_after(lease.duration), &mut done).await {
                break 'login;
            }
            if !lease.renewable {
                info!("Vault token is not renewable, logging in again");
                continue 'login;
            }
            match client.renew().await {
                Ok(renewed) if renewed.duration.as_secs() < client.increment => {
                    info!(
                        "Vault token reached its max TTL ({:?} left), logging in again",
                        renewed.duration
                    );
                    continue 'login;
                }
                Ok(renewed) => {
                    debug!("Renewed Vault token (lease {:?})", renewed.duration);
                    lease = renewed;
                }
                Err(e) => {
                    warn!("Vault token renewal failed, logging in again: {}", e);
                    continue 'login;
                }
            }
        }
    }

    if let Err(e) = client.revoke().await {
        warn!("Failed to revoke Vault token: {}", e);
    }
}
