//! BMC Prometheus Exporter
//!
//! A multi-target Prometheus exporter for out-of-band management controllers
//! (iLO, iDRAC, XClarity and other Redfish implementations).
//!
//! # Overview
//!
//! Prometheus calls `/scrape?target=<host>&model=<model>`. For each request the
//! exporter walks the device's resource graph, fetches every discovered resource
//! with a small bounded worker pool, maps the payloads to gauges, and answers with
//! a per-request registry. A device that rejects freshly read credentials is put
//! on an ignored list so a bad password cannot lock the controller account.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐   /scrape   ┌──────────────────────────┐  HTTPS   ┌─────────────┐
//! │ Prometheus │ ──────────► │ server                   │ ───────► │ Management  │
//! └────────────┘ ◄────────── │  └─ Exporter per request │ ◄─────── │ controller  │
//!                 <scope>_*  │     ├─ Discovery         │          └─────────────┘
//!                            │     ├─ Pool + FetchClient│
//!                            │     └─ MetricsCollector  │  AppRole ┌─────────────┐
//!                            │ CredentialStore ─────────┼────────► │ Vault KV v2 │
//!                            │ IgnoredDevices           │          └─────────────┘
//!                            └──────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`bmc`] - HTTP fetch client, device target and resource link helpers
//! - [`credentials`] - credential cache and the Vault secret backend
//! - [`discovery`] - resource graph walk producing the endpoint set
//! - [`pool`] - bounded task pool
//! - [`collectors`] - payload to metric mapping per resource kind
//! - [`metrics`] - Prometheus metric definitions
//! - [`exporter`] - scrape orchestration
//! - [`ignored`] - circuit-broken devices
//! - [`profile`] - per-vendor device profiles
//! - [`server`] - HTTP front door
//! - [`config`] - Configuration management
//! - [`error`] - Error types
//!
//! # Quick Start
//!
//! ```no_run
//! use bmc_exporter::{
//!     config::Config, credentials::CredentialStore, exporter::Services,
//!     ignored::IgnoredDevices, server,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config/Default.toml")?;
//!     let credentials = Arc::new(CredentialStore::new(config.credentials.clone()));
//!     let services = Arc::new(Services::new(&config, credentials, Arc::new(IgnoredDevices::new()))?);
//!     server::start(config, services, async {
//!         tokio::signal::ctrl_c().await.ok();
//!     })
//!     .await?;
//!     Ok(())
//! }
//! ```

pub mod bmc;
pub mod collectors;
pub mod config;
pub mod credentials;
pub mod discovery;
pub mod error;
pub mod exporter;
pub mod ignored;
pub mod metrics;
pub mod pool;
pub mod profile;
pub mod server;
