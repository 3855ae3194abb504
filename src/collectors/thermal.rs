//! Thermal Metrics
//!
//! Maps a chassis `Thermal` resource.
//!
//! # Metrics Produced
//! - `<scope>_thermal_fan_health` - Labels: name
//! - `<scope>_thermal_fan_speed` - Labels: name, unit (`RPM` or `Percent`)
//! - `<scope>_thermal_sensor_temperature_celsius` - Labels: name
//!
//! Older firmware names fans `FanName` and reports `CurrentReading` / `Units`;
//! either spelling, or both, may appear.

use super::{decode, resource_name};
use crate::bmc::types::{Reading, Status};
use crate::error::Result;
use crate::metrics::{Metric, Observation};
use crate::pool::Task;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct ThermalPayload {
    #[serde(rename = "Fans", default)]
    fans: Option<Vec<Fan>>,
    #[serde(rename = "fans", default)]
    legacy_fans: Option<Vec<Fan>>,
    #[serde(rename = "Temperatures", default)]
    temperatures: Option<Vec<Temperature>>,
    #[serde(rename = "temperatures", default)]
    legacy_temperatures: Option<Vec<Temperature>>,
}

impl ThermalPayload {
    fn fans(&self) -> &[Fan] {
        self.fans
            .as_deref()
            .or(self.legacy_fans.as_deref())
            .unwrap_or_default()
    }

    fn temperatures(&self) -> &[Temperature] {
        self.temperatures
            .as_deref()
            .or(self.legacy_temperatures.as_deref())
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct Fan {
    #[serde(rename = "Name", default)]
    name: Option<String>,
    #[serde(rename = "FanName", default)]
    fan_name: Option<String>,
    #[serde(rename = "MemberId", default)]
    member_id: Option<String>,
    #[serde(rename = "Reading", default)]
    reading: Option<Reading>,
    #[serde(rename = "CurrentReading", default)]
    current_reading: Option<Reading>,
    #[serde(rename = "ReadingUnits", default)]
    reading_units: Option<String>,
    #[serde(rename = "Units", default)]
    units: Option<String>,
    #[serde(rename = "Status", default)]
    status: Status,
}

impl Fan {
    fn name(&self) -> Option<&str> {
        self.name.as_deref().or(self.fan_name.as_deref())
    }

    fn speed(&self) -> Option<f64> {
        self.reading
            .as_ref()
            .and_then(Reading::as_f64)
            .or_else(|| self.current_reading.as_ref().and_then(Reading::as_f64))
    }

    fn unit(&self) -> &str {
        self.reading_units
            .as_deref()
            .or(self.units.as_deref())
            .unwrap_or("RPM")
    }
}

#[derive(Debug, Deserialize)]
struct Temperature {
    #[serde(rename = "Name", default)]
    name: Option<String>,
    #[serde(rename = "MemberId", default)]
    member_id: Option<String>,
    #[serde(rename = "ReadingCelsius", default)]
    reading_celsius: Option<Reading>,
    #[serde(rename = "CurrentReading", default)]
    current_reading: Option<Reading>,
    #[serde(rename = "Status", default)]
    status: Status,
}

impl Temperature {
    fn celsius(&self) -> Option<f64> {
        self.reading_celsius
            .as_ref()
            .and_then(Reading::as_f64)
            .or_else(|| self.current_reading.as_ref().and_then(Reading::as_f64))
    }
}

pub fn map_fans(task: &Task, payload: &Value) -> Result<Vec<Observation>> {
    let thermal: ThermalPayload = decode(task, payload)?;
    let mut observations = Vec::new();

    for (index, fan) in thermal.fans().iter().enumerate() {
        if fan.status.is_absent() {
            continue;
        }
        let fallback = index.to_string();
        let name = resource_name(fan.name(), fan.member_id.as_deref(), &fallback);

        if let Some(health) = fan.status.health_value() {
            observations.push(Observation::new(Metric::ThermalFanHealth, &[&name], health));
        }
        if let Some(speed) = fan.speed() {
            observations.push(Observation::new(
                Metric::ThermalFanSpeed,
                &[&name, fan.unit()],
                speed,
            ));
        }
    }

    Ok(observations)
}

pub fn map_temperatures(task: &Task, payload: &Value) -> Result<Vec<Observation>> {
    let thermal: ThermalPayload = decode(task, payload)?;
    let mut observations = Vec::new();

    for (index, sensor) in thermal.temperatures().iter().enumerate() {
        if sensor.status.is_absent() {
            continue;
        }
        let Some(celsius) = sensor.celsius() else {
            continue;
        };
        let fallback = index.to_string();
        let name = resource_name(
            sensor.name.as_deref(),
            sensor.member_id.as_deref(),
            &fallback,
        );
        observations.push(Observation::new(
            Metric::ThermalSensorTemperatureCelsius,
            &[&name],
            celsius,
        ));
    }

    Ok(observations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::ResourceKind;
    use serde_json::json;

    fn task() -> Task {
        Task::new(ResourceKind::Thermal, "https://bmc/redfish/v1/Chassis/1/Thermal/")
    }

    #[test]
    fn test_fans_current_and_legacy_fields() {
        let payload = json!({
            "Fans": [
                { "Name": "Fan 1", "Reading": 4200, "ReadingUnits": "RPM", "Status": { "Health": "OK", "State": "Enabled" } },
                { "FanName": "Fan 2", "CurrentReading": "35", "Units": "Percent", "Status": { "Health": "Critical" } },
                { "Name": "Fan 3", "Status": { "State": "Absent" } }
            ]
        });

        let obs = map_fans(&task(), &payload).unwrap();

        assert!(obs.contains(&Observation::new(Metric::ThermalFanHealth, &["Fan 1"], 1.0)));
        assert!(obs.contains(&Observation::new(Metric::ThermalFanSpeed, &["Fan 1", "RPM"], 4200.0)));
        assert!(obs.contains(&Observation::new(Metric::ThermalFanHealth, &["Fan 2"], 0.0)));
        assert!(obs.contains(&Observation::new(Metric::ThermalFanSpeed, &["Fan 2", "Percent"], 35.0)));
        assert!(!obs.iter().any(|o| o.labels[0] == "Fan 3"));
    }

    #[test]
    fn test_temperatures_skip_missing_readings() {
        let payload = json!({
            "Temperatures": [
                { "Name": "01-Inlet Ambient", "ReadingCelsius": 21, "Status": { "Health": "OK" } },
                { "Name": "02-CPU 1", "Status": { "Health": "OK" } }
            ]
        });

        let obs = map_temperatures(&task(), &payload).unwrap();

        assert_eq!(
            obs,
            vec![Observation::new(
                Metric::ThermalSensorTemperatureCelsius,
                &["01-Inlet Ambient"],
                21.0
            )]
        );
    }

    #[test]
    fn test_empty_thermal_resource() {
        assert!(map_fans(&task(), &json!({})).unwrap().is_empty());
    }

    #[test]
    fn test_fan_with_both_spellings_prefers_current_fields() {
        let payload = json!({
            "Fans": [
                {
                    "Name": "Fan Block 1",
                    "FanName": "Fan 1",
                    "Reading": 40,
                    "CurrentReading": 40,
                    "ReadingUnits": "Percent",
                    "Units": "Percent",
                    "Status": { "Health": "OK" }
                }
            ],
            "Temperatures": [
                { "Name": "01-Inlet Ambient", "ReadingCelsius": 22, "CurrentReading": 22, "Status": { "Health": "OK" } }
            ]
        });

        let fans = map_fans(&task(), &payload).unwrap();
        let temps = map_temperatures(&task(), &payload).unwrap();

        assert!(fans.contains(&Observation::new(
            Metric::ThermalFanSpeed,
            &["Fan Block 1", "Percent"],
            40.0
        )));
        assert_eq!(
            temps,
            vec![Observation::new(
                Metric::ThermalSensorTemperatureCelsius,
                &["01-Inlet Ambient"],
                22.0
            )]
        );
    }
}
