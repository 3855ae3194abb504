//! System Metrics
//!
//! Maps the computer system resource found during discovery.
//!
//! # Metrics Produced
//! - `<scope>_system_health` - Labels: hostname
//! - `<scope>_system_power_state` - Labels: hostname (1=On, 0=anything else)
//! - `<scope>_system_info` - Labels: hostname, serial, bios_version, model (value is always 1)

use super::decode;
use crate::bmc::types::Status;
use crate::error::Result;
use crate::metrics::{Metric, Observation};
use crate::pool::Task;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct System {
    #[serde(rename = "HostName", default)]
    host_name: Option<String>,
    #[serde(rename = "Hostname", default)]
    hostname: Option<String>,
    #[serde(rename = "SerialNumber", default)]
    serial_number: Option<String>,
    #[serde(rename = "Model", default)]
    model: Option<String>,
    #[serde(rename = "BiosVersion", default)]
    bios_version: Option<String>,
    #[serde(rename = "Bios", default)]
    bios: Option<Value>,
    #[serde(rename = "PowerState", default)]
    power_state: Option<String>,
    #[serde(rename = "Power", default)]
    power: Option<String>,
    #[serde(rename = "Status", default)]
    status: Status,
}

impl System {
    fn hostname(&self) -> &str {
        self.host_name
            .as_deref()
            .or(self.hostname.as_deref())
            .unwrap_or_default()
    }

    fn power_state(&self) -> Option<&str> {
        self.power_state.as_deref().or(self.power.as_deref())
    }

    /// Older firmware nests the version under `Bios.Current.VersionString`.
    fn bios_version(&self) -> String {
        self.bios_version
            .clone()
            .or_else(|| {
                self.bios
                    .as_ref()
                    .and_then(|b| b.pointer("/Current/VersionString"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or_default()
    }
}

pub fn map_health(task: &Task, payload: &Value) -> Result<Vec<Observation>> {
    let system: System = decode(task, payload)?;
    Ok(system
        .status
        .health_value()
        .map(|health| Observation::new(Metric::SystemHealth, &[system.hostname()], health))
        .into_iter()
        .collect())
}

pub fn map_power_state(task: &Task, payload: &Value) -> Result<Vec<Observation>> {
    let system: System = decode(task, payload)?;
    Ok(system
        .power_state()
        .map(|state| {
            let on = if state.eq_ignore_ascii_case("on") { 1.0 } else { 0.0 };
            Observation::new(Metric::SystemPowerState, &[system.hostname()], on)
        })
        .into_iter()
        .collect())
}

pub fn map_info(task: &Task, payload: &Value) -> Result<Vec<Observation>> {
    let system: System = decode(task, payload)?;
    let bios_version = system.bios_version();
    Ok(vec![Observation::new(
        Metric::SystemInfo,
        &[
            system.hostname(),
            system.serial_number.as_deref().map(str::trim).unwrap_or_default(),
            &bios_version,
            system.model.as_deref().unwrap_or_default(),
        ],
        1.0,
    )])
}
