//! Scrape Orchestrator
//!
//! One [`Exporter`] is built per scrape request and owns everything that must
//! not outlive it: the HTTP client, the discovered task list and the metric
//! registry. Process-wide state (credential cache, ignored devices, policy)
//! arrives through [`Services`].
//!
//! # Lifecycle
//!
//! ```text
//! Exporter::new ──► ignored? ──yes──────────────────────────► IGNORED
//!                     │no
//!                     ▼
//!              credentials ─► manager probe ─► discovery ─► tasks ─► READY
//!                     │ 401 after rotation
//!                     └──────────► ignored entry ────────────► IGNORED
//!
//! Exporter::scrape ─► pool ─► evaluate in task order ─► publish(up)
//! ```
//!
//! # Evaluation
//!
//! - conclusive authentication failure: ignored entry, `up=2`, remaining tasks
//!   are not evaluated
//! - expected resource still missing after retries: skipped
//! - any other fetch or mapping error: logged, `up=0`
//!
//! Observations gathered before an authentication abort are still published.

use crate::bmc::{FetchClient, Presence, Target};
use crate::collectors::{self, ResourceKind};
use crate::config::{Config, FetchConfig, PluginConfig};
use crate::credentials::CredentialStore;
use crate::discovery::{Component, Components, Discovery, EndpointSet, Exclusions};
use crate::error::{ExporterError, Result, ScrapeOutcome};
use crate::ignored::{IgnoredDevice, IgnoredDevices};
use crate::metrics::{MetricsCollector, Observation, Reliability};
use crate::pool::{Pool, Task};
use crate::profile::DeviceProfile;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Process-wide collaborators shared by every exporter.
pub struct Services {
    pub credentials: Arc<CredentialStore>,
    pub ignored: Arc<IgnoredDevices>,
    pub fetch: FetchConfig,
    pub exclusions: Exclusions,
    pub plugins: HashMap<String, PluginConfig>,
}

impl Services {
    pub fn new(
        config: &Config,
        credentials: Arc<CredentialStore>,
        ignored: Arc<IgnoredDevices>,
    ) -> Result<Self> {
        Ok(Self {
            credentials,
            ignored,
            fetch: config.fetch.clone(),
            exclusions: Exclusions::new(
                &config.devices.exclude_drives,
                &config.devices.exclude_firmware,
            )?,
            plugins: config.plugins.clone(),
        })
    }
}

/// Per-request options from the front door.
#[derive(Debug, Clone, Default)]
pub struct ScrapeRequest {
    pub components: Components,
    pub plugins: Vec<String>,
    /// Overrides any proxy from the environment.
    pub proxy: Option<String>,
}

enum State {
    Ready { client: FetchClient, tasks: Vec<Task> },
    Ignored,
}

pub struct Exporter {
    target: Target,
    metrics: MetricsCollector,
    services: Arc<Services>,
    state: State,
}

impl Exporter {
    /// Build the exporter, discovering the device unless it is ignored.
    ///
    /// A 401 that survives a fresh credential read puts the host on the ignored
    /// list and yields an exporter in the ignored state. Every other failure,
    /// including a 401 with no way to rotate credentials, is returned.
    pub async fn new(
        target: Target,
        request: &ScrapeRequest,
        services: Arc<Services>,
    ) -> Result<Self> {
        let profile = DeviceProfile::for_model(&target.model)?;
        let metrics = MetricsCollector::new(profile.scope)?;

        if services.ignored.contains(&target.host) {
            info!("{} is on the ignored list, skipping discovery", target.host);
            return Ok(Self {
                target,
                metrics,
                services,
                state: State::Ignored,
            });
        }

        let client = FetchClient::new(
            &services.fetch,
            target.clone(),
            Arc::clone(&services.credentials),
            request.proxy.as_deref(),
        )?;
        let manager = format!(
            "{}{}/",
            profile.root_url(&target.base_url),
            profile.manager_path
        );

        let state = match Self::construct(&client, profile, &manager, request, &services).await {
            Ok(tasks) => {
                info!("Prepared {} tasks for {}", tasks.len(), target.host);
                State::Ready { client, tasks }
            }
            Err(e) if e.is_conclusive_auth() => {
                services.ignored.insert(IgnoredDevice::new(&target, manager));
                State::Ignored
            }
            Err(e) => return Err(e),
        };

        Ok(Self {
            target,
            metrics,
            services,
            state,
        })
    }

    async fn construct(
        client: &FetchClient,
        profile: &'static DeviceProfile,
        manager: &str,
        request: &ScrapeRequest,
        services: &Services,
    ) -> Result<Vec<Task>> {
        let target = client.target();
        services
            .credentials
            .resolve(&target.credential_profile, &target.host)
            .await?;

        client.get_json(manager, Presence::Expected).await?;

        let endpoints = Discovery::new(client, profile, &request.components, &services.exclusions)
            .run()
            .await?;

        let mut tasks = build_tasks(&endpoints, &request.components);

        let root = profile.root_url(&target.base_url);
        for name in &request.plugins {
            let plugin = services
                .plugins
                .get(name)
                .ok_or_else(|| ExporterError::Config(format!("unknown plugin '{}'", name)))?;
            for path in &plugin.paths {
                let url = client.url(&format!("{}{}", root, path.trim_start_matches('/')));
                tasks.push(Task::new(ResourceKind::Plugin(name.clone()), url));
            }
        }

        Ok(tasks)
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn is_ignored(&self) -> bool {
        matches!(self.state, State::Ignored)
    }

    pub fn tasks(&self) -> &[Task] {
        match &self.state {
            State::Ready { tasks, .. } => tasks,
            State::Ignored => &[],
        }
    }

    /// Run one scrape and publish its observations.
    pub async fn scrape(&self) -> Reliability {
        let (client, tasks) = match &self.state {
            State::Ready { client, tasks } if !self.services.ignored.contains(&self.target.host) => {
                (client, tasks)
            }
            _ => {
                self.metrics.publish(&[], Reliability::Ignored);
                return Reliability::Ignored;
            }
        };

        let pool = Pool::new(tasks.clone(), self.services.fetch.pool_concurrency);
        let outcomes = pool
            .run(|task: &Task| {
                let url = task.url.clone();
                async move { client.get_json(&url, Presence::Expected).await }
            })
            .await;

        let mut observations: Vec<Observation> = Vec::new();
        let mut reliability = Reliability::Up;

        for outcome in outcomes {
            let task = outcome.task;
            let payload = match outcome.result {
                Ok(payload) => payload,
                Err(e) => match e.classify() {
                    ScrapeOutcome::Authentication => {
                        self.services
                            .ignored
                            .insert(IgnoredDevice::new(&self.target, task.url.clone()));
                        reliability = Reliability::Ignored;
                        break;
                    }
                    ScrapeOutcome::NotFound => {
                        debug!("Skipping {} {}: {}", task.kind.name(), task.url, e);
                        continue;
                    }
                    ScrapeOutcome::Transient | ScrapeOutcome::Decode => {
                        warn!("Failed to fetch {} {}: {}", task.kind.name(), task.url, e);
                        reliability = Reliability::Down;
                        continue;
                    }
                },
            };

            match collectors::map(&task, &payload) {
                Ok(mapped) => observations.extend(mapped),
                Err(e) => {
                    warn!("Failed to map {} {}: {}", task.kind.name(), task.url, e);
                    reliability = Reliability::Down;
                }
            }
        }

        self.metrics.publish(&observations, reliability);
        info!(
            "Scraped {} ({} observations, up={})",
            self.target.host,
            observations.len(),
            reliability.value()
        );
        reliability
    }

    /// Prometheus text exposition of the last scrape.
    pub fn render(&self) -> anyhow::Result<String> {
        self.metrics.render()
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }
}

/// One task per discovered URL; the system resource comes first.
pub fn build_tasks(endpoints: &EndpointSet, components: &Components) -> Vec<Task> {
    let mut tasks = Vec::new();
    let mut add = |kind: ResourceKind, urls: &[String]| {
        tasks.extend(urls.iter().map(|url| Task::new(kind.clone(), url.clone())));
    };

    if components.includes(Component::System) {
        add(ResourceKind::System, &endpoints.systems[..endpoints.systems.len().min(1)]);
    }
    add(ResourceKind::Thermal, &endpoints.thermal);
    add(ResourceKind::Power, &endpoints.power);
    add(ResourceKind::Memory, &endpoints.memory);
    add(ResourceKind::Processor, &endpoints.processors);
    add(ResourceKind::StorageController, &endpoints.storage_controllers);
    add(ResourceKind::Drive, &endpoints.drives);
    add(ResourceKind::LogicalDrive, &endpoints.logical_drives);
    add(ResourceKind::Firmware, &endpoints.firmware);
    tasks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_tasks_orders_system_first() {
        let endpoints = EndpointSet {
            systems: vec!["https://bmc/redfish/v1/Systems/1/".into(), "https://bmc/redfish/v1/Systems/2/".into()],
            thermal: vec!["https://bmc/redfish/v1/Chassis/1/Thermal/".into()],
            drives: vec!["https://bmc/redfish/v1/Chassis/1/Drives/0/".into()],
            ..Default::default()
        };

        let tasks = build_tasks(&endpoints, &Components::all());

        let kinds: Vec<ResourceKind> = tasks.iter().map(|t| t.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![ResourceKind::System, ResourceKind::Thermal, ResourceKind::Drive]
        );
    }

    #[test]
    fn test_build_tasks_without_system_component() {
        let endpoints = EndpointSet {
            systems: vec!["https://bmc/redfish/v1/Systems/1/".into()],
            ..Default::default()
        };

        let tasks = build_tasks(&endpoints, &Components::parse("thermal").unwrap());

        assert!(tasks.is_empty());
    }
}
