//! Metric Mapping
//!
//! Each module turns one kind of resource payload into typed [`Observation`]s.
//! Handlers are pure: they never touch the registry and never do I/O, so the
//! orchestrator can collect everything first and publish in one step.
//!
//! # Architecture
//!
//! A [`ResourceKind`] owns a fixed table of handlers. A task of that kind is
//! evaluated by running every handler over the same payload:
//!
//! | Kind | Handlers |
//! |---|---|
//! | `Thermal` | fans, temperatures |
//! | `Power` | supplies, power control |
//! | `Memory` | DIMM |
//! | `Processor` | processor |
//! | `StorageController` | controller |
//! | `Drive` | physical drive |
//! | `LogicalDrive` | logical drive |
//! | `Firmware` | firmware component |
//! | `System` | health, power state, info |
//! | `Plugin` | plugin health |
//!
//! # Error Handling
//!
//! A payload that cannot be decoded into the expected shape is an error; the
//! orchestrator counts it as a failed task. Missing optional fields simply
//! produce no observation.

use crate::error::{ExporterError, Result};
use crate::metrics::Observation;
use crate::pool::Task;
use serde::de::DeserializeOwned;
use serde_json::Value;

pub mod firmware;
pub mod memory;
pub mod plugin;
pub mod power;
pub mod processor;
pub mod storage;
pub mod system;
pub mod thermal;

/// What a fetched resource is, which decides how it is mapped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Thermal,
    Power,
    Memory,
    Processor,
    StorageController,
    Drive,
    LogicalDrive,
    Firmware,
    System,
    /// Vendor plugin resource, carrying the plugin name.
    Plugin(String),
}

/// Maps one payload to observations.
pub type Handler = fn(&Task, &Value) -> Result<Vec<Observation>>;

const THERMAL: &[Handler] = &[thermal::map_fans, thermal::map_temperatures];
const POWER: &[Handler] = &[power::map_supplies, power::map_power_control];
const MEMORY: &[Handler] = &[memory::map_dimm];
const PROCESSOR: &[Handler] = &[processor::map_processor];
const STORAGE_CONTROLLER: &[Handler] = &[storage::map_controller];
const DRIVE: &[Handler] = &[storage::map_drive];
const LOGICAL_DRIVE: &[Handler] = &[storage::map_logical_drive];
const FIRMWARE: &[Handler] = &[firmware::map_component];
const SYSTEM: &[Handler] = &[system::map_health, system::map_power_state, system::map_info];
const PLUGIN: &[Handler] = &[plugin::map_health];

impl ResourceKind {
    pub fn handlers(&self) -> &'static [Handler] {
        match self {
            ResourceKind::Thermal => THERMAL,
            ResourceKind::Power => POWER,
            ResourceKind::Memory => MEMORY,
            ResourceKind::Processor => PROCESSOR,
            ResourceKind::StorageController => STORAGE_CONTROLLER,
            ResourceKind::Drive => DRIVE,
            ResourceKind::LogicalDrive => LOGICAL_DRIVE,
            ResourceKind::Firmware => FIRMWARE,
            ResourceKind::System => SYSTEM,
            ResourceKind::Plugin(_) => PLUGIN,
        }
    }

    /// Short name used in log lines.
    pub fn name(&self) -> &str {
        match self {
            ResourceKind::Thermal => "thermal",
            ResourceKind::Power => "power",
            ResourceKind::Memory => "memory",
            ResourceKind::Processor => "processor",
            ResourceKind::StorageController => "storage_controller",
            ResourceKind::Drive => "drive",
            ResourceKind::LogicalDrive => "logical_drive",
            ResourceKind::Firmware => "firmware",
            ResourceKind::System => "system",
            ResourceKind::Plugin(name) => name,
        }
    }
}

/// Run every handler of the task's kind over `payload`.
///
/// The first handler error aborts the task; observations from earlier handlers
/// of the same task are discarded with it.
pub fn map(task: &Task, payload: &Value) -> Result<Vec<Observation>> {
    let mut observations = Vec::new();
    for handler in task.kind.handlers() {
        observations.extend(handler(task, payload)?);
    }
    Ok(observations)
}

/// Decode a payload, reporting which resource did not match.
pub(crate) fn decode<T: DeserializeOwned>(task: &Task, payload: &Value) -> Result<T> {
    if !payload.is_object() {
        return Err(ExporterError::Decode(format!(
            "{} payload at {} is not an object",
            task.kind.name(),
            task.url
        )));
    }
    serde_json::from_value(payload.clone()).map_err(|e| {
        ExporterError::Decode(format!("{} payload at {}: {}", task.kind.name(), task.url, e))
    })
}

/// Label for a resource: its name, else its id, else the last URL segment.
pub(crate) fn resource_name(name: Option<&str>, id: Option<&str>, url: &str) -> String {
    name.or(id)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| {
            url.trim_end_matches('/')
                .rsplit('/')
                .next()
                .unwrap_or_default()
                .to_string()
        })
}
