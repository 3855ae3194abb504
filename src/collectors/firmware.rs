//! Firmware Inventory Metrics
//!
//! # Metrics Produced
//! - `<scope>_firmware_component_info` - Labels: name, version (value is always 1)

use super::{decode, resource_name};
use crate::bmc::types::Reading;
use crate::error::Result;
use crate::metrics::{Metric, Observation};
use crate::pool::Task;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct Component {
    #[serde(rename = "Name", default)]
    name: Option<String>,
    #[serde(rename = "Id", default)]
    id: Option<String>,
    #[serde(rename = "Version", default)]
    version: Option<Reading>,
    #[serde(rename = "VersionString", default)]
    version_string: Option<Reading>,
}

pub fn map_component(task: &Task, payload: &Value) -> Result<Vec<Observation>> {
    let component: Component = decode(task, payload)?;
    let Some(version) = component
        .version
        .as_ref()
        .or(component.version_string.as_ref())
        .map(Reading::as_text) else {
        return Ok(Vec::new());
    };
    let name = resource_name(component.name.as_deref(), component.id.as_deref(), &task.url);
    Ok(vec![Observation::new(
        Metric::FirmwareComponentInfo,
        &[&name, version.trim()],
        1.0,
    )])
}
