//! Endpoint Discovery
//!
//! Walks a device's resource graph to find every URL one scrape needs:
//!
//! ```text
//! Chassis collection ─► Chassis ─┬─► Systems ─┬─► Memory / Processors collections
//!                                ├─► Power    ├─► Storage ─► Drives, Controllers, Volumes
//!                                ├─► Thermal  ├─► Oem.<ns>.SmartStorage ─► ArrayControllers
//!                                ├─► Storage  │        └─► PhysicalDrives / LogicalDrives
//!                                └─► Drives   └─► Oem.<ns>.FirmwareInventory
//! ```
//!
//! Every hop is fetched as [`Presence::Optional`]: a 404 means the feature is absent
//! on this hardware. Any other failure aborts discovery. Excluded drive and firmware
//! URLs are dropped during the walk so they never become tasks.

use crate::bmc::types::{collection_members, first_string, links, LinkPath};
use crate::bmc::{FetchClient, Presence};
use crate::error::{ExporterError, Result};
use crate::profile::DeviceProfile;
use regex::Regex;
use serde_json::Value;
use std::str::FromStr;
use tracing::{debug, info};

const SYSTEMS: &[LinkPath] = &[&["Links", "ComputerSystems"], &["links", "ComputerSystems"]];
const POWER: &[LinkPath] = &[&["Power"], &["Links", "Power"], &["links", "Power"]];
const THERMAL: &[LinkPath] = &[&["Thermal"], &["Links", "Thermal"], &["links", "Thermal"]];
const CHASSIS_STORAGE: &[LinkPath] = &[&["Links", "Storage"], &["links", "Storage"]];
const CHASSIS_DRIVES: &[LinkPath] = &[&["Links", "Drives"], &["links", "Drives"]];
const MEMORY: &[LinkPath] = &[&["Memory"], &["links", "Memory"]];
const PROCESSORS: &[LinkPath] = &[&["Processors"], &["links", "Processors"]];
const SYSTEM_STORAGE: &[LinkPath] = &[&["Storage"], &["links", "Storage"]];
const STORAGE_DRIVES: &[LinkPath] = &[&["Drives"], &["links", "Drives"]];
const STORAGE_CONTROLLERS: &[LinkPath] = &[&["Controllers"], &["links", "Controllers"]];
const VOLUMES: &[LinkPath] = &[&["Volumes"], &["links", "Volumes"]];
const ARRAY_CONTROLLERS: &[LinkPath] = &[&["Links", "ArrayControllers"], &["links", "ArrayControllers"]];
const PHYSICAL_DRIVES: &[LinkPath] = &[&["Links", "PhysicalDrives"], &["links", "PhysicalDrives"]];
const LOGICAL_DRIVES: &[LinkPath] = &[&["Links", "LogicalDrives"], &["links", "LogicalDrives"]];
const BIOS_VERSION: &[LinkPath] = &[&["BiosVersion"], &["Bios", "Current", "VersionString"]];
const SERIAL_NUMBER: &[LinkPath] = &[&["SerialNumber"]];
const HOSTNAME: &[LinkPath] = &[&["HostName"], &["Hostname"]];

/// A telemetry category that a partial scrape can select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    Thermal,
    Power,
    Memory,
    Processor,
    Drives,
    StorageController,
    Firmware,
    System,
}

impl Component {
    pub const ALL: [Component; 8] = [
        Component::Thermal,
        Component::Power,
        Component::Memory,
        Component::Processor,
        Component::Drives,
        Component::StorageController,
        Component::Firmware,
        Component::System,
    ];
}

impl FromStr for Component {
    type Err = ExporterError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "thermal" => Ok(Component::Thermal),
            "power" => Ok(Component::Power),
            "memory" => Ok(Component::Memory),
            "processor" => Ok(Component::Processor),
            "drives" => Ok(Component::Drives),
            "storage_controller" => Ok(Component::StorageController),
            "firmware" => Ok(Component::Firmware),
            "system" => Ok(Component::System),
            other => Err(ExporterError::Config(format!("unknown component '{}'", other))),
        }
    }
}

/// Components selected for one scrape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Components(Vec<Component>);

impl Components {
    pub fn all() -> Self {
        Self(Component::ALL.to_vec())
    }

    /// Parse a comma-separated list; an empty list selects everything.
    pub fn parse(list: &str) -> Result<Self> {
        let mut selected = Vec::new();
        for part in list.split(',').filter(|p| !p.trim().is_empty()) {
            let component: Component = part.parse()?;
            if !selected.contains(&component) {
                selected.push(component);
            }
        }
        if selected.is_empty() {
            return Ok(Self::all());
        }
        Ok(Self(selected))
    }

    pub fn includes(&self, component: Component) -> bool {
        self.0.contains(&component)
    }

    fn storage(&self) -> bool {
        self.includes(Component::Drives) || self.includes(Component::StorageController)
    }
}

impl Default for Components {
    fn default() -> Self {
        Self::all()
    }
}

/// Operator-supplied URL patterns that bound scrape fan-out.
#[derive(Debug, Clone, Default)]
pub struct Exclusions {
    drives: Vec<Regex>,
    firmware: Vec<Regex>,
}

impl Exclusions {
    pub fn new(drives: &[String], firmware: &[String]) -> Result<Self> {
        let compile = |patterns: &[String]| {
            patterns
                .iter()
                .map(|p| {
                    Regex::new(p).map_err(|e| {
                        ExporterError::Config(format!("invalid exclude pattern '{}': {}", p, e))
                    })
                })
                .collect::<Result<Vec<_>>>()
        };
        Ok(Self {
            drives: compile(drives)?,
            firmware: compile(firmware)?,
        })
    }

    fn drive_excluded(&self, url: &str) -> bool {
        self.drives.iter().any(|r| r.is_match(url))
    }

    fn firmware_excluded(&self, url: &str) -> bool {
        self.firmware.iter().any(|r| r.is_match(url))
    }
}

/// Concrete resource URLs for one scrape, de-duplicated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointSet {
    pub systems: Vec<String>,
    pub storage_controllers: Vec<String>,
    pub drives: Vec<String>,
    pub logical_drives: Vec<String>,
    pub power: Vec<String>,
    pub thermal: Vec<String>,
    pub memory: Vec<String>,
    pub processors: Vec<String>,
    pub firmware: Vec<String>,
    pub bios_version: Option<String>,
    pub serial_number: Option<String>,
    pub hostname: Option<String>,
}

fn push_unique(list: &mut Vec<String>, url: String) {
    if !list.contains(&url) {
        list.push(url);
    }
}

pub struct Discovery<'a> {
    client: &'a FetchClient,
    profile: &'static DeviceProfile,
    components: &'a Components,
    exclusions: &'a Exclusions,
}

impl<'a> Discovery<'a> {
    pub fn new(
        client: &'a FetchClient,
        profile: &'static DeviceProfile,
        components: &'a Components,
        exclusions: &'a Exclusions,
    ) -> Self {
        Self {
            client,
            profile,
            components,
            exclusions,
        }
    }

    /// Fetch a hop; `None` when the device does not have it.
    async fn fetch_optional(&self, url: &str) -> Result<Option<Value>> {
        match self.client.get_json(url, Presence::Optional).await {
            Ok(value) => Ok(Some(value)),
            Err(ExporterError::NotFound(_)) => {
                debug!("{} not present on this device", url);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Absolute member URLs of the collection at `url`.
    async fn members(&self, url: &str) -> Result<Vec<String>> {
        Ok(match self.fetch_optional(url).await? {
            Some(collection) => collection_members(&collection)
                .iter()
                .map(|m| self.client.url(m))
                .collect(),
            None => Vec::new(),
        })
    }

    fn resolve(&self, value: &Value, variants: &[&[&str]]) -> Vec<String> {
        links(value, variants)
            .iter()
            .map(|l| self.client.url(l))
            .collect()
    }

    /// Link paths under every OEM namespace of the profile, in both casings.
    fn oem_paths(&self, field: &'static str) -> Vec<[&'static str; 4]> {
        self.profile
            .oem_namespaces
            .iter()
            .flat_map(|ns| [["Oem", *ns, "Links", field], ["Oem", *ns, "links", field]])
            .collect()
    }

    fn resolve_oem(&self, value: &Value, field: &'static str) -> Vec<String> {
        let paths = self.oem_paths(field);
        let variants: Vec<&[&str]> = paths.iter().map(|p| &p[..]).collect();
        self.resolve(value, &variants)
    }

    fn add_drive(&self, set: &mut EndpointSet, url: String) {
        if self.exclusions.drive_excluded(&url) {
            debug!("Excluding drive {}", url);
            return;
        }
        push_unique(&mut set.drives, url);
    }

    fn add_logical_drive(&self, set: &mut EndpointSet, url: String) {
        if self.exclusions.drive_excluded(&url) {
            debug!("Excluding logical drive {}", url);
            return;
        }
        push_unique(&mut set.logical_drives, url);
    }

    /// Resolve the full endpoint set, starting from the profile's chassis collections.
    pub async fn run(&self) -> Result<EndpointSet> {
        let root = self.profile.root_url(&self.client.target().base_url);
        let mut set = EndpointSet::default();
        let mut storage = Vec::new();

        for path in self.profile.chassis_paths {
            let collection = self.client.url(&format!("{}{}", root, path));
            for chassis_url in self.members(&collection).await? {
                if let Some(chassis) = self.fetch_optional(&chassis_url).await? {
                    self.read_chassis(&chassis, &mut set, &mut storage);
                }
            }
        }

        if let Some(system_url) = set.systems.first().cloned() {
            if let Some(system) = self.fetch_optional(&system_url).await? {
                self.walk_system(&root, &system, &mut set, &mut storage)
                    .await?;
            }
        } else if self.components.includes(Component::Firmware) {
            self.walk_firmware(&format!("{}UpdateService/FirmwareInventory/", root), &mut set)
                .await?;
        }

        if self.components.storage() {
            for storage_url in storage {
                self.walk_storage(&storage_url, &mut set).await?;
            }
        }

        info!(
            "Discovered {} systems, {} storage controllers, {} drives, {} firmware items on {}",
            set.systems.len(),
            set.storage_controllers.len(),
            set.drives.len(),
            set.firmware.len(),
            self.client.target().host
        );
        Ok(set)
    }

    fn read_chassis(&self, chassis: &Value, set: &mut EndpointSet, storage: &mut Vec<String>) {
        for url in self.resolve(chassis, SYSTEMS) {
            push_unique(&mut set.systems, url);
        }
        if self.components.includes(Component::Power) {
            for url in self.resolve(chassis, POWER) {
                push_unique(&mut set.power, url);
            }
        }
        if self.components.includes(Component::Thermal) {
            for url in self.resolve(chassis, THERMAL) {
                push_unique(&mut set.thermal, url);
            }
        }
        if self.components.storage() {
            for url in self.resolve(chassis, CHASSIS_STORAGE) {
                push_unique(storage, url);
            }
        }
        if self.components.includes(Component::Drives) {
            for url in self.resolve(chassis, CHASSIS_DRIVES) {
                self.add_drive(set, url);
            }
        }
    }

    async fn walk_system(
        &self,
        root: &str,
        system: &Value,
        set: &mut EndpointSet,
        storage: &mut Vec<String>,
    ) -> Result<()> {
        set.bios_version = first_string(system, BIOS_VERSION);
        set.serial_number = first_string(system, SERIAL_NUMBER);
        set.hostname = first_string(system, HOSTNAME);

        if self.components.includes(Component::Memory) {
            let mut collections = self.resolve(system, MEMORY);
            collections.extend(self.resolve_oem(system, "Memory"));
            for collection in collections {
                for url in self.members(&collection).await? {
                    push_unique(&mut set.memory, url);
                }
            }
        }

        if self.components.includes(Component::Processor) {
            for collection in self.resolve(system, PROCESSORS) {
                for url in self.members(&collection).await? {
                    push_unique(&mut set.processors, url);
                }
            }
        }

        if self.components.storage() {
            for collection in self.resolve(system, SYSTEM_STORAGE) {
                for url in self.members(&collection).await? {
                    push_unique(storage, url);
                }
            }
            for smart_storage in self.resolve_oem(system, "SmartStorage") {
                self.walk_smart_storage(&smart_storage, set).await?;
            }
        }

        if self.components.includes(Component::Firmware) {
            let inventory = self
                .resolve_oem(system, "FirmwareInventory")
                .into_iter()
                .next()
                .unwrap_or_else(|| format!("{}UpdateService/FirmwareInventory/", root));
            self.walk_firmware(&inventory, set).await?;
        }

        Ok(())
    }

    async fn walk_firmware(&self, inventory: &str, set: &mut EndpointSet) -> Result<()> {
        for url in self.members(inventory).await? {
            if self.exclusions.firmware_excluded(&url) {
                debug!("Excluding firmware {}", url);
                continue;
            }
            push_unique(&mut set.firmware, url);
        }
        Ok(())
    }

    /// Standard storage subsystem. Drives are linked directly; controllers and
    /// volumes need one more hop on newer firmware.
    async fn walk_storage(&self, url: &str, set: &mut EndpointSet) -> Result<()> {
        let Some(storage) = self.fetch_optional(url).await? else {
            return Ok(());
        };

        if self.components.includes(Component::Drives) {
            for drive in self.resolve(&storage, STORAGE_DRIVES) {
                self.add_drive(set, drive);
            }
        }

        if self.components.includes(Component::StorageController) {
            let collections = self.resolve(&storage, STORAGE_CONTROLLERS);
            if collections.is_empty() {
                // Older firmware inlines `StorageControllers` in the storage resource.
                push_unique(&mut set.storage_controllers, url.to_string());
            }
            for collection in collections {
                for controller in self.members(&collection).await? {
                    push_unique(&mut set.storage_controllers, controller);
                }
            }
        }

        if self.components.includes(Component::Drives) {
            for collection in self.resolve(&storage, VOLUMES) {
                for volume in self.members(&collection).await? {
                    self.add_logical_drive(set, volume);
                }
            }
        }

        Ok(())
    }

    /// Vendor smart-storage tree: array controllers, then their drive collections.
    async fn walk_smart_storage(&self, url: &str, set: &mut EndpointSet) -> Result<()> {
        let Some(smart_storage) = self.fetch_optional(url).await? else {
            return Ok(());
        };

        for collection in self.resolve(&smart_storage, ARRAY_CONTROLLERS) {
            for controller_url in self.members(&collection).await? {
                if self.components.includes(Component::StorageController) {
                    push_unique(&mut set.storage_controllers, controller_url.clone());
                }
                if !self.components.includes(Component::Drives) {
                    continue;
                }
                let Some(controller) = self.fetch_optional(&controller_url).await? else {
                    continue;
                };
                for physical in self.resolve(&controller, PHYSICAL_DRIVES) {
                    for drive in self.members(&physical).await? {
                        self.add_drive(set, drive);
                    }
                }
                for logical in self.resolve(&controller, LOGICAL_DRIVES) {
                    for drive in self.members(&logical).await? {
                        self.add_logical_drive(set, drive);
                    }
                }
            }
        }

        Ok(())
    }
}
