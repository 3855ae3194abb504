//! Memory Metrics
//!
//! Maps one memory module resource.
//!
//! # Metrics Produced
//! - `<scope>_memory_dimm_health` - Labels: name
//! - `<scope>_memory_dimm_capacity_mib` - Labels: name
//!
//! Older vendor memory resources carry `DIMMStatus` instead of a `Status` block
//! and `SizeMB` instead of `CapacityMiB`.

use super::{decode, resource_name};
use crate::bmc::types::{Reading, Status};
use crate::error::Result;
use crate::metrics::{Metric, Observation};
use crate::pool::Task;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct Dimm {
    #[serde(rename = "Name", default)]
    name: Option<String>,
    #[serde(rename = "Id", default)]
    id: Option<String>,
    #[serde(rename = "CapacityMiB", default)]
    capacity_mib: Option<Reading>,
    #[serde(rename = "SizeMB", default)]
    size_mb: Option<Reading>,
    #[serde(rename = "Status", default)]
    status: Status,
    #[serde(rename = "DIMMStatus", default)]
    dimm_status: Option<String>,
}

impl Dimm {
    fn health(&self) -> Option<f64> {
        self.status.health_value().or_else(|| {
            self.dimm_status.as_deref().map(|s| match s {
                "GoodInUse" | "GoodPartiallyInUse" => 1.0,
                _ => 0.0,
            })
        })
    }

    fn capacity_mib(&self) -> Option<f64> {
        self.capacity_mib
            .as_ref()
            .and_then(Reading::as_f64)
            .or_else(|| self.size_mb.as_ref().and_then(Reading::as_f64))
    }

    fn absent(&self) -> bool {
        self.status.is_absent() || self.dimm_status.as_deref() == Some("NotPresent")
    }
}

pub fn map_dimm(task: &Task, payload: &Value) -> Result<Vec<Observation>> {
    let dimm: Dimm = decode(task, payload)?;
    if dimm.absent() {
        return Ok(Vec::new());
    }

    let name = resource_name(dimm.name.as_deref(), dimm.id.as_deref(), &task.url);
    let mut observations = Vec::new();
    if let Some(health) = dimm.health() {
        observations.push(Observation::new(Metric::MemoryDimmHealth, &[&name], health));
    }
    if let Some(capacity) = dimm.capacity_mib() {
        observations.push(Observation::new(Metric::MemoryDimmCapacityMib, &[&name], capacity));
    }
    Ok(observations)
}
