//! Storage Metrics
//!
//! Maps storage controllers, physical drives and logical drives from both the
//! standard storage tree and the older vendor smart-storage tree.
//!
//! # Metrics Produced
//! - `<scope>_storage_controller_health` - Labels: name, model
//! - `<scope>_storage_drive_health` - Labels: name
//! - `<scope>_storage_drive_capacity_bytes` - Labels: name
//! - `<scope>_storage_logical_drive_health` - Labels: name, raid
//!
//! A storage resource without a `Controllers` collection inlines its controllers
//! as `StorageControllers`; both shapes arrive here as a `StorageController` task.

use super::{decode, resource_name};
use crate::bmc::types::{Reading, Status};
use crate::error::Result;
use crate::metrics::{Metric, Observation};
use crate::pool::Task;
use serde::Deserialize;
use serde_json::Value;

const MIB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Deserialize)]
struct Controller {
    #[serde(rename = "Name", default)]
    name: Option<String>,
    #[serde(rename = "Id", default)]
    id: Option<String>,
    #[serde(rename = "MemberId", default)]
    member_id: Option<String>,
    #[serde(rename = "Model", default)]
    model: Option<String>,
    #[serde(rename = "Status", default)]
    status: Status,
    #[serde(rename = "StorageControllers", default)]
    inline: Vec<Controller>,
}

#[derive(Debug, Deserialize)]
struct Drive {
    #[serde(rename = "Name", default)]
    name: Option<String>,
    #[serde(rename = "Id", default)]
    id: Option<String>,
    #[serde(rename = "Location", default)]
    location: Option<Value>,
    #[serde(rename = "CapacityBytes", default)]
    capacity_bytes: Option<Reading>,
    #[serde(rename = "CapacityMiB", default)]
    capacity_mib: Option<Reading>,
    #[serde(rename = "Status", default)]
    status: Status,
}

#[derive(Debug, Deserialize)]
struct LogicalDrive {
    #[serde(rename = "Name", default)]
    name: Option<String>,
    #[serde(rename = "LogicalDriveName", default)]
    logical_drive_name: Option<String>,
    #[serde(rename = "Id", default)]
    id: Option<String>,
    #[serde(rename = "RAIDType", default)]
    raid_type: Option<Reading>,
    #[serde(rename = "Raid", default)]
    raid: Option<Reading>,
    #[serde(rename = "Status", default)]
    status: Status,
}

impl Controller {
    fn id(&self) -> Option<&str> {
        self.id.as_deref().or(self.member_id.as_deref())
    }
}

impl LogicalDrive {
    /// Smart-storage volumes carry a generic `Name` next to the operator-chosen `LogicalDriveName`.
    fn name(&self) -> Option<&str> {
        self.logical_drive_name.as_deref().or(self.name.as_deref())
    }

    fn raid(&self) -> String {
        self.raid_type
            .as_ref()
            .or(self.raid.as_ref())
            .map(Reading::as_text)
            .unwrap_or_default()
    }
}

fn controller_observation(controller: &Controller, fallback: &str) -> Option<Observation> {
    if controller.status.is_absent() {
        return None;
    }
    let health = controller.status.health_value()?;
    let name = resource_name(controller.name.as_deref(), controller.id(), fallback);
    let model = controller.model.as_deref().map(str::trim).unwrap_or_default();
    Some(Observation::new(
        Metric::StorageControllerHealth,
        &[&name, model],
        health,
    ))
}

pub fn map_controller(task: &Task, payload: &Value) -> Result<Vec<Observation>> {
    let controller: Controller = decode(task, payload)?;

    if controller.inline.is_empty() {
        return Ok(controller_observation(&controller, &task.url)
            .into_iter()
            .collect());
    }

    Ok(controller
        .inline
        .iter()
        .enumerate()
        .filter_map(|(index, inline)| controller_observation(inline, &index.to_string()))
        .collect())
}

impl Drive {
    /// Older vendor drives report a free-form `Location` string such as `1I:1:3`.
    fn label(&self, url: &str) -> String {
        let location = self.location.as_ref().and_then(Value::as_str);
        resource_name(location.or(self.name.as_deref()), self.id.as_deref(), url)
    }

    fn capacity_bytes(&self) -> Option<f64> {
        self.capacity_bytes
            .as_ref()
            .and_then(Reading::as_f64)
            .or_else(|| {
                self.capacity_mib
                    .as_ref()
                    .and_then(Reading::as_f64)
                    .map(|mib| mib * MIB)
            })
    }
}

pub fn map_drive(task: &Task, payload: &Value) -> Result<Vec<Observation>> {
    let drive: Drive = decode(task, payload)?;
    if drive.status.is_absent() {
        return Ok(Vec::new());
    }

    let name = drive.label(&task.url);
    let mut observations = Vec::new();
    if let Some(health) = drive.status.health_value() {
        observations.push(Observation::new(Metric::StorageDriveHealth, &[&name], health));
    }
    if let Some(bytes) = drive.capacity_bytes() {
        observations.push(Observation::new(Metric::StorageDriveCapacityBytes, &[&name], bytes));
    }
    Ok(observations)
}

pub fn map_logical_drive(task: &Task, payload: &Value) -> Result<Vec<Observation>> {
    let volume: LogicalDrive = decode(task, payload)?;
    if volume.status.is_absent() {
        return Ok(Vec::new());
    }
    let Some(health) = volume.status.health_value() else {
        return Ok(Vec::new());
    };

    let name = resource_name(volume.name(), volume.id.as_deref(), &task.url);
    let raid = volume.raid();
    Ok(vec![Observation::new(
        Metric::StorageLogicalDriveHealth,
        &[&name, &raid],
        health,
    )])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::ResourceKind;
    use serde_json::json;

    #[test]
    fn test_controller_resource() {
        let task = Task::new(
            ResourceKind::StorageController,
            "https://bmc/redfish/v1/Systems/1/Storage/DE00A000/Controllers/0/",
        );
        let payload = json!({ "Name": "HPE MR416i-a", "Model": "MR416i-a", "Status": { "Health": "OK" } });

        let obs = map_controller(&task, &payload).unwrap();

        assert_eq!(
            obs,
            vec![Observation::new(
                Metric::StorageControllerHealth,
                &["HPE MR416i-a", "MR416i-a"],
                1.0
            )]
        );
    }

    #[test]
    fn test_inline_storage_controllers() {
        let task = Task::new(
            ResourceKind::StorageController,
            "https://bmc/redfish/v1/Systems/1/Storage/RAID.Integrated.1-1/",
        );
        let payload = json!({
            "Name": "PERC H740P Mini",
            "StorageControllers": [
                { "MemberId": "RAID.Integrated.1-1", "Model": "PERC H740P Mini", "Status": { "Health": "Critical" } }
            ]
        });

        let obs = map_controller(&task, &payload).unwrap();

        assert_eq!(
            obs,
            vec![Observation::new(
                Metric::StorageControllerHealth,
                &["RAID.Integrated.1-1", "PERC H740P Mini"],
                0.0
            )]
        );
    }

    #[test]
    fn test_legacy_physical_drive() {
        let task = Task::new(
            ResourceKind::Drive,
            "https://bmc/redfish/v1/Systems/1/SmartStorage/ArrayControllers/0/DiskDrives/0/",
        );
        let payload = json!({ "Location": "1I:1:1", "CapacityMiB": 1, "Status": { "Health": "OK" } });

        let obs = map_drive(&task, &payload).unwrap();

        assert_eq!(
            obs,
            vec![
                Observation::new(Metric::StorageDriveHealth, &["1I:1:1"], 1.0),
                Observation::new(Metric::StorageDriveCapacityBytes, &["1I:1:1"], MIB),
            ]
        );
    }

    #[test]
    fn test_logical_drive_raid_label() {
        let task = Task::new(
            ResourceKind::LogicalDrive,
            "https://bmc/redfish/v1/Systems/1/SmartStorage/ArrayControllers/0/LogicalDrives/1/",
        );
        let payload = json!({ "LogicalDriveName": "boot", "Raid": "1", "Status": { "Health": "OK" } });

        let obs = map_logical_drive(&task, &payload).unwrap();

        assert_eq!(
            obs,
            vec![Observation::new(Metric::StorageLogicalDriveHealth, &["boot", "1"], 1.0)]
        );
    }

    #[test]
    fn test_smart_storage_volume_with_both_name_spellings() {
        let task = Task::new(
            ResourceKind::LogicalDrive,
            "https://bmc/redfish/v1/Systems/1/SmartStorage/ArrayControllers/0/LogicalDrives/2/",
        );
        let payload = json!({
            "Name": "HpeSmartStorageLogicalDrive",
            "LogicalDriveName": "data",
            "Raid": "5",
            "Status": { "Health": "Degraded" }
        });

        let obs = map_logical_drive(&task, &payload).unwrap();

        assert_eq!(
            obs,
            vec![Observation::new(Metric::StorageLogicalDriveHealth, &["data", "5"], 0.0)]
        );
    }

    #[test]
    fn test_controller_with_id_and_member_id() {
        let task = Task::new(
            ResourceKind::StorageController,
            "https://bmc/redfish/v1/Systems/1/Storage/1/",
        );
        let payload = json!({
            "StorageControllers": [
                { "Id": "0", "MemberId": "0", "Model": "P408i-a", "Status": { "Health": "OK" } }
            ]
        });

        let obs = map_controller(&task, &payload).unwrap();

        assert_eq!(
            obs,
            vec![Observation::new(Metric::StorageControllerHealth, &["0", "P408i-a"], 1.0)]
        );
    }
}
