//! Power Metrics
//!
//! Maps a chassis `Power` resource.
//!
//! # Metrics Produced
//! - `<scope>_power_supply_health` - Labels: name
//! - `<scope>_power_supply_output_watts` - Labels: name
//! - `<scope>_power_control_consumed_watts` - Labels: name

use super::{decode, resource_name};
use crate::bmc::types::{Reading, Status};
use crate::error::Result;
use crate::metrics::{Metric, Observation};
use crate::pool::Task;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct PowerPayload {
    #[serde(rename = "PowerSupplies", default)]
    supplies: Option<Vec<PowerSupply>>,
    #[serde(rename = "powerSupplies", default)]
    legacy_supplies: Option<Vec<PowerSupply>>,
    #[serde(rename = "PowerControl", default)]
    control: Option<Vec<PowerControl>>,
    #[serde(rename = "powerControl", default)]
    legacy_control: Option<Vec<PowerControl>>,
}

impl PowerPayload {
    fn supplies(&self) -> &[PowerSupply] {
        self.supplies
            .as_deref()
            .or(self.legacy_supplies.as_deref())
            .unwrap_or_default()
    }

    fn control(&self) -> &[PowerControl] {
        self.control
            .as_deref()
            .or(self.legacy_control.as_deref())
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct PowerSupply {
    #[serde(rename = "Name", default)]
    name: Option<String>,
    #[serde(rename = "MemberId", default)]
    member_id: Option<String>,
    #[serde(rename = "LastPowerOutputWatts", default)]
    last_output_watts: Option<Reading>,
    #[serde(rename = "PowerOutputWatts", default)]
    output_watts: Option<Reading>,
    #[serde(rename = "Status", default)]
    status: Status,
}

impl PowerSupply {
    fn output_watts(&self) -> Option<f64> {
        self.last_output_watts
            .as_ref()
            .and_then(Reading::as_f64)
            .or_else(|| self.output_watts.as_ref().and_then(Reading::as_f64))
    }
}

#[derive(Debug, Deserialize)]
struct PowerControl {
    #[serde(rename = "Name", default)]
    name: Option<String>,
    #[serde(rename = "MemberId", default)]
    member_id: Option<String>,
    #[serde(rename = "PowerConsumedWatts", default)]
    consumed_watts: Option<Reading>,
}

pub fn map_supplies(task: &Task, payload: &Value) -> Result<Vec<Observation>> {
    let power: PowerPayload = decode(task, payload)?;
    let mut observations = Vec::new();

    for (index, psu) in power.supplies().iter().enumerate() {
        if psu.status.is_absent() {
            continue;
        }
        let fallback = index.to_string();
        let name = resource_name(psu.name.as_deref(), psu.member_id.as_deref(), &fallback);

        if let Some(health) = psu.status.health_value() {
            observations.push(Observation::new(Metric::PowerSupplyHealth, &[&name], health));
        }
        if let Some(watts) = psu.output_watts() {
            observations.push(Observation::new(Metric::PowerSupplyOutputWatts, &[&name], watts));
        }
    }

    Ok(observations)
}

pub fn map_power_control(task: &Task, payload: &Value) -> Result<Vec<Observation>> {
    let power: PowerPayload = decode(task, payload)?;

    Ok(power
        .control()
        .iter()
        .enumerate()
        .filter_map(|(index, control)| {
            let watts = control.consumed_watts.as_ref().and_then(Reading::as_f64)?;
            let fallback = index.to_string();
            let name = resource_name(
                control.name.as_deref(),
                control.member_id.as_deref(),
                &fallback,
            );
            Some(Observation::new(Metric::PowerControlConsumedWatts, &[&name], watts))
        })
        .collect())
}
