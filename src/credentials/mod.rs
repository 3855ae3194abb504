//! Device Credential Store
//!
//! Resolves the username/password used to talk to a management controller.
//!
//! - **Static profiles**: `[credentials.<name>]` entries with inline `username`/`password`
//! - **Secret backend**: when configured, credentials are read lazily on first use per
//!   host, cached, and re-read on demand after a 401 (secrets may be rotated out-of-band)
//!
//! The cache is shared by every concurrent scrape, keyed by host, and guarded by a
//! read/write lock (reads on every scrape, writes only on first use or rotation).
//! Concurrent cache misses for one host wait on a per-host lock so the backend is
//! read once.

pub mod vault;

use crate::config::CredentialProfile;
use crate::error::{ExporterError, Result};
use async_trait::async_trait;
use secrecy::SecretString;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, info};

pub use vault::{TokenLifecycle, VaultClient};

/// Username/password pair for one device.
#[derive(Debug, Clone)]
pub struct Credential {
    pub username: String,
    pub password: SecretString,
    /// Secret version reported by the backend, if any.
    pub version: Option<u64>,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
            version: None,
        }
    }
}

/// A store of device secrets (e.g. Vault KV).
#[async_trait]
pub trait SecretBackend: Send + Sync {
    /// Read the credential for `target` from the first of `paths` that exists.
    async fn fetch_credential(
        &self,
        profile: &CredentialProfile,
        target: &str,
        paths: &[String],
    ) -> Result<Credential>;
}

pub struct CredentialStore {
    profiles: HashMap<String, CredentialProfile>,
    backend: Option<Arc<dyn SecretBackend>>,
    cache: RwLock<HashMap<String, Credential>>,
    first_use: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl CredentialStore {
    pub fn new(profiles: HashMap<String, CredentialProfile>) -> Self {
        Self {
            profiles,
            backend: None,
            cache: RwLock::new(HashMap::new()),
            first_use: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_backend(
        profiles: HashMap<String, CredentialProfile>,
        backend: Arc<dyn SecretBackend>,
    ) -> Self {
        Self {
            profiles,
            backend: Some(backend),
            cache: RwLock::new(HashMap::new()),
            first_use: Mutex::new(HashMap::new()),
        }
    }

    /// Whether a 401 can be answered with a fresh secret read.
    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    pub fn get(&self, host: &str) -> Option<Credential> {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(host)
            .cloned()
    }

    pub fn set(&self, host: &str, credential: Credential) {
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(host.to_string(), credential);
    }

    fn profile(&self, name: &str) -> Result<&CredentialProfile> {
        self.profiles
            .get(name)
            .ok_or_else(|| ExporterError::Config(format!("unknown credential profile '{}'", name)))
    }

    /// Fetch credentials for `host`, bypassing the cache.
    ///
    /// With a secret backend this always performs exactly one backend read and
    /// overwrites the cache entry. `path_hints` override the profile's own paths.
    pub async fn get_credentials(
        &self,
        profile_name: &str,
        host: &str,
        path_hints: &[String],
    ) -> Result<Credential> {
        let profile = self.profile(profile_name)?;

        let credential = match &self.backend {
            Some(backend) => {
                let paths: Vec<String> = if path_hints.is_empty() {
                    profile
                        .path
                        .iter()
                        .chain(profile.path_hints.iter())
                        .cloned()
                        .collect()
                } else {
                    path_hints.to_vec()
                };
                if paths.is_empty() {
                    return Err(ExporterError::Config(format!(
                        "credential profile '{}' has no secret path",
                        profile_name
                    )));
                }
                let credential = backend.fetch_credential(profile, host, &paths).await?;
                info!(
                    "Fetched credentials for {} from secret backend (version {:?})",
                    host, credential.version
                );
                credential
            }
            None => match (&profile.username, &profile.password) {
                (Some(username), Some(password)) => Credential {
                    username: username.clone(),
                    password: password.clone(),
                    version: None,
                },
                _ => {
                    return Err(ExporterError::Config(format!(
                        "credential profile '{}' has no static username/password and no secret backend is configured",
                        profile_name
                    )))
                }
            },
        };

        self.set(host, credential.clone());
        Ok(credential)
    }

    /// Cached credential for `host`, fetched on first use.
    pub async fn resolve(&self, profile_name: &str, host: &str) -> Result<Credential> {
        if let Some(credential) = self.get(host) {
            debug!("Using cached credentials for {}", host);
            return Ok(credential);
        }

        let lock = Arc::clone(
            self.first_use
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(host.to_string())
                .or_default(),
        );
        let _guard = lock.lock().await;
        if let Some(credential) = self.get(host) {
            debug!("Credentials for {} fetched by a concurrent scrape", host);
            return Ok(credential);
        }
        self.get_credentials(profile_name, host, &[]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn static_profiles() -> HashMap<String, CredentialProfile> {
        let mut profiles = HashMap::new();
        profiles.insert(
            "default".to_string(),
            CredentialProfile {
                username: Some("admin".to_string()),
                password: Some(SecretString::from("secret")),
                ..Default::default()
            },
        );
        profiles
    }

    #[tokio::test]
    async fn test_static_profile_is_cached_per_host() {
        let store = CredentialStore::new(static_profiles());
        assert!(store.get("10.0.0.1").is_none());

        let cred = store.resolve("default", "10.0.0.1").await.unwrap();

        assert_eq!(cred.username, "admin");
        assert_eq!(cred.password.expose_secret(), "secret");
        assert!(store.get("10.0.0.1").is_some());
        assert!(store.get("10.0.0.2").is_none());
    }

    #[tokio::test]
    async fn test_unknown_profile_is_config_error() {
        let store = CredentialStore::new(static_profiles());
        let err = store.resolve("missing", "10.0.0.1").await.unwrap_err();
        assert!(matches!(err, ExporterError::Config(_)));
    }

    struct SlowBackend {
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl SecretBackend for SlowBackend {
        async fn fetch_credential(
            &self,
            _profile: &CredentialProfile,
            _target: &str,
            _paths: &[String],
        ) -> Result<Credential> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            Ok(Credential::new("monitor", "from-backend"))
        }
    }

    #[tokio::test]
    async fn test_concurrent_first_use_reads_backend_once() {
        let backend = Arc::new(SlowBackend {
            calls: std::sync::atomic::AtomicUsize::new(0),
        });
        let mut profiles = HashMap::new();
        profiles.insert(
            "vault".to_string(),
            CredentialProfile {
                path: Some("bmc/{target}".to_string()),
                ..Default::default()
            },
        );
        let store = CredentialStore::with_backend(profiles, Arc::clone(&backend) as Arc<dyn SecretBackend>);

        let results =
            futures_util::future::join_all((0..8).map(|_| store.resolve("vault", "10.0.0.7"))).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(backend.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn test_set_overwrites_entry() {
        let store = CredentialStore::new(HashMap::new());
        store.set("bmc1", Credential::new("a", "1"));
        store.set("bmc1", Credential::new("b", "2"));
        assert_eq!(store.get("bmc1").unwrap().username, "b");
    }
}
