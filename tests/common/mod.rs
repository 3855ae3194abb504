//! Shared test fixtures: an in-process fake management controller and helpers.
#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bmc_exporter::bmc::Target;
use bmc_exporter::config::{CredentialProfile, FetchConfig};
use bmc_exporter::credentials::{Credential, CredentialStore, SecretBackend};
use bmc_exporter::error::{ExporterError, Result};
use secrecy::SecretString;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// What the fake controller answers for one path.
#[derive(Debug, Clone)]
pub enum Reply {
    Json(Value),
    Status(u16),
}

#[derive(Default)]
struct FakeState {
    routes: Mutex<HashMap<String, Reply>>,
    hits: Mutex<HashMap<String, usize>>,
    total: AtomicUsize,
    accepted: Mutex<Option<String>>,
}

fn with_slash(path: &str) -> String {
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{}/", path)
    }
}

pub fn basic_auth(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{}:{}", username, password)))
}

async fn handle(State(state): State<Arc<FakeState>>, uri: Uri, headers: HeaderMap) -> Response {
    let path = with_slash(uri.path());
    state.total.fetch_add(1, Ordering::SeqCst);
    *state.hits.lock().unwrap().entry(path.clone()).or_default() += 1;

    if let Some(expected) = state.accepted.lock().unwrap().clone() {
        let given = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if given != expected {
            return StatusCode::UNAUTHORIZED.into_response();
        }
    }

    let reply = state.routes.lock().unwrap().get(&path).cloned();
    match reply {
        Some(Reply::Json(body)) => Json(body).into_response(),
        Some(Reply::Status(code)) => StatusCode::from_u16(code).unwrap().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Fake management controller bound to an ephemeral local port.
pub struct FakeBmc {
    pub addr: SocketAddr,
    state: Arc<FakeState>,
}

impl FakeBmc {
    pub async fn start() -> Self {
        let state = Arc::new(FakeState::default());
        let app = Router::new().fallback(handle).with_state(Arc::clone(&state));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self { addr, state }
    }

    pub fn host(&self) -> String {
        self.addr.to_string()
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Absolute, slash-terminated URL for `path`.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), with_slash(path))
    }

    pub fn target(&self, model: &str) -> Target {
        Target::parse(&self.base_url(), model, "default").unwrap()
    }

    pub fn json(&self, path: &str, body: Value) {
        self.state
            .routes
            .lock()
            .unwrap()
            .insert(with_slash(path), Reply::Json(body));
    }

    pub fn status(&self, path: &str, code: u16) {
        self.state
            .routes
            .lock()
            .unwrap()
            .insert(with_slash(path), Reply::Status(code));
    }

    /// Require these credentials on every request.
    pub fn accept(&self, username: &str, password: &str) {
        *self.state.accepted.lock().unwrap() = Some(basic_auth(username, password));
    }

    pub fn hits(&self, path: &str) -> usize {
        self.state
            .hits
            .lock()
            .unwrap()
            .get(&with_slash(path))
            .copied()
            .unwrap_or_default()
    }

    pub fn total_hits(&self) -> usize {
        self.state.total.load(Ordering::SeqCst)
    }

    /// Manager collection plus one chassis linking one storage subsystem with
    /// one controller and two drives.
    pub fn install_storage_tree(&self) {
        self.json(
            "/redfish/v1/Managers",
            json!({ "Members": [ { "@odata.id": "/redfish/v1/Managers/1" } ] }),
        );
        self.json(
            "/redfish/v1/Chassis",
            json!({ "Members": [ { "@odata.id": "/redfish/v1/Chassis/1" } ] }),
        );
        self.json(
            "/redfish/v1/Chassis/1",
            json!({
                "Links": { "Storage": [ { "@odata.id": "/redfish/v1/Systems/1/Storage/DE00A000" } ] }
            }),
        );
        self.json(
            "/redfish/v1/Systems/1/Storage/DE00A000",
            json!({
                "Drives": [
                    { "@odata.id": "/redfish/v1/Systems/1/Storage/DE00A000/Drives/0" },
                    { "@odata.id": "/redfish/v1/Systems/1/Storage/DE00A000/Drives/1" }
                ],
                "Controllers": { "@odata.id": "/redfish/v1/Systems/1/Storage/DE00A000/Controllers" }
            }),
        );
        self.json(
            "/redfish/v1/Systems/1/Storage/DE00A000/Controllers",
            json!({ "Members": [ { "@odata.id": "/redfish/v1/Systems/1/Storage/DE00A000/Controllers/0" } ] }),
        );
        self.json(
            "/redfish/v1/Systems/1/Storage/DE00A000/Controllers/0",
            json!({ "Name": "MR416i-a", "Model": "MR416i-a", "Status": { "Health": "OK" } }),
        );
        for drive in 0..2 {
            self.json(
                &format!("/redfish/v1/Systems/1/Storage/DE00A000/Drives/{}", drive),
                json!({ "Name": format!("Drive {}", drive), "CapacityBytes": 960197124096u64, "Status": { "Health": "OK" } }),
            );
        }
    }
}

/// Fast retry policy for tests.
pub fn fetch_config() -> FetchConfig {
    FetchConfig {
        timeout_seconds: 5,
        max_retries: 2,
        retry_wait_ms: 5,
        not_found_retries: 2,
        insecure_skip_verify: true,
        pool_concurrency: 1,
    }
}

pub fn static_profiles(username: &str, password: &str) -> HashMap<String, CredentialProfile> {
    let mut profiles = HashMap::new();
    profiles.insert(
        "default".to_string(),
        CredentialProfile {
            username: Some(username.to_string()),
            password: Some(SecretString::from(password.to_string())),
            ..Default::default()
        },
    );
    profiles
}

pub fn backend_profiles() -> HashMap<String, CredentialProfile> {
    let mut profiles = HashMap::new();
    profiles.insert(
        "default".to_string(),
        CredentialProfile {
            path: Some("bmc/{target}".to_string()),
            ..Default::default()
        },
    );
    profiles
}

/// Secret backend that hands out a scripted sequence of credentials.
/// The last credential repeats once the sequence is exhausted.
pub struct MockBackend {
    calls: AtomicUsize,
    credentials: Vec<Credential>,
}

impl MockBackend {
    pub fn new(credentials: Vec<Credential>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            credentials,
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SecretBackend for MockBackend {
    async fn fetch_credential(
        &self,
        _profile: &CredentialProfile,
        _target: &str,
        _paths: &[String],
    ) -> Result<Credential> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.credentials
            .get(call)
            .or_else(|| self.credentials.last())
            .cloned()
            .ok_or_else(|| ExporterError::SecretBackend("no credentials scripted".to_string()))
    }
}

pub fn backend_store(backend: Arc<MockBackend>) -> Arc<CredentialStore> {
    Arc::new(CredentialStore::with_backend(backend_profiles(), backend))
}

/// Value of the first sample of `metric` whose label set contains `label`.
pub fn sample(text: &str, metric: &str, label: &str) -> Option<f64> {
    text.lines()
        .filter(|line| !line.starts_with('#'))
        .filter(|line| line.starts_with(&format!("{}{{", metric)) || line.starts_with(&format!("{} ", metric)))
        .find(|line| label.is_empty() || line.contains(label))
        .and_then(|line| line.rsplit(' ').next())
        .and_then(|value| value.parse().ok())
}
