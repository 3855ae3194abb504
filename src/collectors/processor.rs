//! Processor Metrics
//!
//! # Metrics Produced
//! - `<scope>_processor_health` - Labels: name, model
//! - `<scope>_processor_cores` - Labels: name

use super::{decode, resource_name};
use crate::bmc::types::{Reading, Status};
use crate::error::Result;
use crate::metrics::{Metric, Observation};
use crate::pool::Task;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct Processor {
    #[serde(rename = "Socket", default)]
    socket: Option<String>,
    #[serde(rename = "Id", default)]
    id: Option<String>,
    #[serde(rename = "Model", default)]
    model: Option<String>,
    #[serde(rename = "TotalCores", default)]
    total_cores: Option<Reading>,
    #[serde(rename = "Status", default)]
    status: Status,
}

pub fn map_processor(task: &Task, payload: &Value) -> Result<Vec<Observation>> {
    let cpu: Processor = decode(task, payload)?;
    if cpu.status.is_absent() {
        return Ok(Vec::new());
    }

    let name = resource_name(cpu.socket.as_deref(), cpu.id.as_deref(), &task.url);
    let model = cpu.model.as_deref().map(str::trim).unwrap_or_default();
    let mut observations = Vec::new();
    if let Some(health) = cpu.status.health_value() {
        observations.push(Observation::new(Metric::ProcessorHealth, &[&name, model], health));
    }
    if let Some(cores) = cpu.total_cores.as_ref().and_then(Reading::as_f64) {
        observations.push(Observation::new(Metric::ProcessorCores, &[&name], cores));
    }
    Ok(observations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::ResourceKind;
    use serde_json::json;

    #[test]
    fn test_processor() {
        let task = Task::new(ResourceKind::Processor, "https://bmc/redfish/v1/Systems/1/Processors/1/");
        let payload = json!({
            "Socket": "Proc 1",
            "Model": " Intel(R) Xeon(R) Gold 6230 CPU @ 2.10GHz ",
            "TotalCores": 20,
            "Status": { "Health": "OK" }
        });

        let obs = map_processor(&task, &payload).unwrap();

        assert_eq!(
            obs,
            vec![
                Observation::new(
                    Metric::ProcessorHealth,
                    &["Proc 1", "Intel(R) Xeon(R) Gold 6230 CPU @ 2.10GHz"],
                    1.0
                ),
                Observation::new(Metric::ProcessorCores, &["Proc 1"], 20.0),
            ]
        );
    }
}
