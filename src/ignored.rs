//! Ignored-Device Registry
//!
//! A device whose controller rejects freshly read credentials is put on this
//! list and receives no further requests until an operator clears it, either
//! explicitly or through [`IgnoredDevices::test_connection`]. This keeps a bad
//! password from locking the controller account.
//!
//! The registry is shared by every scrape; all operations take a short
//! `std::sync::RwLock` and never hold it across an `.await`.

use crate::bmc::{FetchClient, Presence, Target};
use crate::config::FetchConfig;
use crate::credentials::CredentialStore;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

/// One circuit-broken device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IgnoredDevice {
    pub host: String,
    /// URL whose request was rejected; re-tested before the entry is cleared.
    pub endpoint: String,
    pub model: String,
    pub credential_profile: String,
    /// Seconds since the Unix epoch.
    pub since: u64,
}

impl IgnoredDevice {
    pub fn new(target: &Target, endpoint: impl Into<String>) -> Self {
        let since = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        Self {
            host: target.host.clone(),
            endpoint: endpoint.into(),
            model: target.model.clone(),
            credential_profile: target.credential_profile.clone(),
            since,
        }
    }
}

#[derive(Debug, Default)]
pub struct IgnoredDevices {
    devices: RwLock<HashMap<String, IgnoredDevice>>,
}

impl IgnoredDevices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the entry for `device.host`.
    pub fn insert(&self, device: IgnoredDevice) {
        warn!(
            "Ignoring {} after authentication failure on {}",
            device.host, device.endpoint
        );
        self.devices
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(device.host.clone(), device);
    }

    pub fn contains(&self, host: &str) -> bool {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(host)
    }

    pub fn get(&self, host: &str) -> Option<IgnoredDevice> {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(host)
            .cloned()
    }

    pub fn remove(&self, host: &str) -> Option<IgnoredDevice> {
        let removed = self
            .devices
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(host);
        if removed.is_some() {
            info!("Removed {} from the ignored list", host);
        }
        removed
    }

    /// Entries sorted by host.
    pub fn list(&self) -> Vec<IgnoredDevice> {
        let mut devices: Vec<IgnoredDevice> = self
            .devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        devices.sort_by(|a, b| a.host.cmp(&b.host));
        devices
    }

    pub fn len(&self) -> usize {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Re-read credentials and issue one request to the recorded endpoint.
    ///
    /// Success clears the entry and returns `true`. Any failure keeps it and
    /// returns `false`. Unknown hosts return `false`.
    pub async fn test_connection(
        &self,
        host: &str,
        credentials: &Arc<CredentialStore>,
        fetch: &FetchConfig,
    ) -> bool {
        let Some(device) = self.get(host) else {
            return false;
        };

        let target = match Target::parse(&device.endpoint, &device.model, &device.credential_profile) {
            Ok(target) => target,
            Err(e) => {
                warn!("Cannot re-test {}: {}", host, e);
                return false;
            }
        };

        if credentials.has_backend() {
            if let Err(e) = credentials
                .get_credentials(&device.credential_profile, &target.host, &[])
                .await
            {
                warn!("Fresh credential read for {} failed: {}", host, e);
                return false;
            }
        }

        let single_shot = FetchConfig {
            max_retries: 0,
            not_found_retries: 0,
            ..fetch.clone()
        };
        let client = match FetchClient::new(&single_shot, target, Arc::clone(credentials), None) {
            Ok(client) => client,
            Err(e) => {
                warn!("Cannot build client for {}: {}", host, e);
                return false;
            }
        };

        match client.get_json(&device.endpoint, Presence::Optional).await {
            Ok(_) => {
                info!("{} accepted credentials again", host);
                self.remove(host);
                true
            }
            Err(e) => {
                warn!("{} still failing: {}", host, e);
                false
            }
        }
    }
}
