use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub credentials: HashMap<String, CredentialProfile>,
    #[serde(default)]
    pub vault: Option<VaultConfig>,
    #[serde(default)]
    pub devices: DevicesConfig,
    #[serde(default)]
    pub plugins: HashMap<String, PluginConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_addr")]
    pub addr: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Used when Prometheus does not send `X-Prometheus-Scrape-Timeout-Seconds`.
    #[serde(default = "default_scrape_timeout")]
    pub scrape_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
            port: default_port(),
            scrape_timeout_seconds: default_scrape_timeout(),
        }
    }
}

/// HTTP client policy shared by every exporter.
#[derive(Debug, Deserialize, Clone)]
pub struct FetchConfig {
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_wait")]
    pub retry_wait_ms: u64,
    #[serde(default = "default_not_found_retries")]
    pub not_found_retries: u32,
    #[serde(default = "default_true")]
    pub insecure_skip_verify: bool,
    /// Most controllers cap concurrent sessions at about four.
    #[serde(default = "default_pool_concurrency")]
    pub pool_concurrency: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout(),
            max_retries: default_max_retries(),
            retry_wait_ms: default_retry_wait(),
            not_found_retries: default_not_found_retries(),
            insecure_skip_verify: default_true(),
            pool_concurrency: default_pool_concurrency(),
        }
    }
}

/// A named way to obtain device credentials.
///
/// Static profiles carry `username`/`password`. When a `[vault]` section is
/// configured the secret is read from `<mount_path>/data/<path>` instead,
/// where `{target}` in `path` and `path_hints` is replaced by the device host.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct CredentialProfile {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<SecretString>,
    #[serde(default = "default_mount_path")]
    pub mount_path: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub path_hints: Vec<String>,
    #[serde(default = "default_user_field")]
    pub user_field: String,
    #[serde(default = "default_password_field")]
    pub password_field: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct VaultConfig {
    pub address: String,
    pub role_id: String,
    pub secret_id: SecretString,
    #[serde(default)]
    pub ca_cert: Option<String>,
    #[serde(default = "default_login_retry")]
    pub login_retry_seconds: u64,
    #[serde(default = "default_token_increment")]
    pub token_increment_seconds: u64,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DevicesConfig {
    /// Regexes matched against drive URLs during discovery.
    #[serde(default)]
    pub exclude_drives: Vec<String>,
    /// Regexes matched against firmware inventory URLs during discovery.
    #[serde(default)]
    pub exclude_firmware: Vec<String>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PluginConfig {
    /// Paths relative to the API root, e.g. `Systems/1/Oem/Vendor/Health`.
    #[serde(default)]
    pub paths: Vec<String>,
}

fn default_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    9533
}

fn default_scrape_timeout() -> u64 {
    60
}

fn default_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_wait() -> u64 {
    1000
}

fn default_not_found_retries() -> u32 {
    2
}

fn default_true() -> bool {
    true
}

fn default_pool_concurrency() -> usize {
    1
}

fn default_mount_path() -> String {
    "kv".to_string()
}

fn default_user_field() -> String {
    "username".to_string()
}

fn default_password_field() -> String {
    "password".to_string()
}

fn default_login_retry() -> u64 {
    10
}

fn default_token_increment() -> u64 {
    3600
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        // Load environment variables from .env if present
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("BMC_EXPORTER").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}
