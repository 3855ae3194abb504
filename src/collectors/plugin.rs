//! Vendor Plugin Metrics
//!
//! Plugins name extra resources (relative to the API root) whose `Status.Health`
//! is exported without a dedicated mapping.
//!
//! # Metrics Produced
//! - `<scope>_plugin_health` - Labels: plugin, resource

use super::{decode, resource_name, ResourceKind};
use crate::bmc::types::Status;
use crate::error::Result;
use crate::metrics::{Metric, Observation};
use crate::pool::Task;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct PluginResource {
    #[serde(rename = "Name", default)]
    name: Option<String>,
    #[serde(rename = "Id", default)]
    id: Option<String>,
    #[serde(rename = "Status", default)]
    status: Option<Status>,
    #[serde(rename = "status", default)]
    legacy_status: Option<Status>,
}

impl PluginResource {
    fn health_value(&self) -> Option<f64> {
        self.status
            .as_ref()
            .or(self.legacy_status.as_ref())
            .and_then(Status::health_value)
    }
}

pub fn map_health(task: &Task, payload: &Value) -> Result<Vec<Observation>> {
    let resource: PluginResource = decode(task, payload)?;
    let plugin = match &task.kind {
        ResourceKind::Plugin(name) => name.as_str(),
        other => other.name(),
    };
    let name = resource_name(resource.name.as_deref(), resource.id.as_deref(), &task.url);

    Ok(resource
        .health_value()
        .map(|health| Observation::new(Metric::PluginHealth, &[plugin, &name], health))
        .into_iter()
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plugin_health() {
        let task = Task::new(
            ResourceKind::Plugin("ilo_nic".to_string()),
            "https://bmc/redfish/v1/Managers/1/EthernetInterfaces/1/",
        );
        let payload = json!({ "Id": "1", "Status": { "Health": "OK" } });

        let obs = map_health(&task, &payload).unwrap();

        assert_eq!(obs, vec![Observation::new(Metric::PluginHealth, &["ilo_nic", "1"], 1.0)]);
    }
}
