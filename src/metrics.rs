//! Prometheus Metrics Definitions
//!
//! Every exporter owns one [`MetricsCollector`]: a private registry holding one
//! `GaugeVec` per canonical [`Metric`] plus the scalar `up` gauge.
//!
//! # Naming
//!
//! `<scope>_<category>_<measurement>`, where the scope comes from the device profile
//! (e.g. `hpe_thermal_fan_health`). `<scope>_up` is always present:
//!
//! | Value | Meaning |
//! |---|---|
//! | 0 | at least one task failed |
//! | 1 | every task succeeded |
//! | 2 | device is on the ignored list |
//!
//! # Consistency
//!
//! [`MetricsCollector::publish`] resets every vector and re-populates it under a
//! write lock; [`MetricsCollector::render`] gathers under the read lock, so a
//! concurrent `/metrics` read never observes a half-reset scrape and series for
//! removed hardware never linger.

use crate::error::Result;
use prometheus::{Encoder, Gauge, GaugeVec, Opts, Registry, TextEncoder};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::warn;

/// Scrape-level reliability signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reliability {
    Down,
    Up,
    Ignored,
}

impl Reliability {
    pub fn value(self) -> f64 {
        match self {
            Reliability::Down => 0.0,
            Reliability::Up => 1.0,
            Reliability::Ignored => 2.0,
        }
    }
}

/// Canonical metrics shared by every hardware line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    ThermalFanHealth,
    ThermalFanSpeed,
    ThermalSensorTemperatureCelsius,
    PowerSupplyHealth,
    PowerSupplyOutputWatts,
    PowerControlConsumedWatts,
    MemoryDimmHealth,
    MemoryDimmCapacityMib,
    ProcessorHealth,
    ProcessorCores,
    StorageControllerHealth,
    StorageDriveHealth,
    StorageDriveCapacityBytes,
    StorageLogicalDriveHealth,
    FirmwareComponentInfo,
    SystemHealth,
    SystemPowerState,
    SystemInfo,
    PluginHealth,
}

impl Metric {
    pub const ALL: [Metric; 19] = [
        Metric::ThermalFanHealth,
        Metric::ThermalFanSpeed,
        Metric::ThermalSensorTemperatureCelsius,
        Metric::PowerSupplyHealth,
        Metric::PowerSupplyOutputWatts,
        Metric::PowerControlConsumedWatts,
        Metric::MemoryDimmHealth,
        Metric::MemoryDimmCapacityMib,
        Metric::ProcessorHealth,
        Metric::ProcessorCores,
        Metric::StorageControllerHealth,
        Metric::StorageDriveHealth,
        Metric::StorageDriveCapacityBytes,
        Metric::StorageLogicalDriveHealth,
        Metric::FirmwareComponentInfo,
        Metric::SystemHealth,
        Metric::SystemPowerState,
        Metric::SystemInfo,
        Metric::PluginHealth,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Metric::ThermalFanHealth => "thermal_fan_health",
            Metric::ThermalFanSpeed => "thermal_fan_speed",
            Metric::ThermalSensorTemperatureCelsius => "thermal_sensor_temperature_celsius",
            Metric::PowerSupplyHealth => "power_supply_health",
            Metric::PowerSupplyOutputWatts => "power_supply_output_watts",
            Metric::PowerControlConsumedWatts => "power_control_consumed_watts",
            Metric::MemoryDimmHealth => "memory_dimm_health",
            Metric::MemoryDimmCapacityMib => "memory_dimm_capacity_mib",
            Metric::ProcessorHealth => "processor_health",
            Metric::ProcessorCores => "processor_cores",
            Metric::StorageControllerHealth => "storage_controller_health",
            Metric::StorageDriveHealth => "storage_drive_health",
            Metric::StorageDriveCapacityBytes => "storage_drive_capacity_bytes",
            Metric::StorageLogicalDriveHealth => "storage_logical_drive_health",
            Metric::FirmwareComponentInfo => "firmware_component_info",
            Metric::SystemHealth => "system_health",
            Metric::SystemPowerState => "system_power_state",
            Metric::SystemInfo => "system_info",
            Metric::PluginHealth => "plugin_health",
        }
    }

    fn help(self) -> &'static str {
        match self {
            Metric::ThermalFanHealth => "Fan health (1=OK, 0=degraded)",
            Metric::ThermalFanSpeed => "Current fan reading in the unit reported by the controller",
            Metric::ThermalSensorTemperatureCelsius => "Temperature sensor reading in Celsius",
            Metric::PowerSupplyHealth => "Power supply health (1=OK, 0=degraded)",
            Metric::PowerSupplyOutputWatts => "Last reported power supply output in watts",
            Metric::PowerControlConsumedWatts => "Power consumed by the chassis in watts",
            Metric::MemoryDimmHealth => "Memory module health (1=OK, 0=degraded)",
            Metric::MemoryDimmCapacityMib => "Memory module capacity in MiB",
            Metric::ProcessorHealth => "Processor health (1=OK, 0=degraded)",
            Metric::ProcessorCores => "Number of processor cores",
            Metric::StorageControllerHealth => "Storage controller health (1=OK, 0=degraded)",
            Metric::StorageDriveHealth => "Physical drive health (1=OK, 0=degraded)",
            Metric::StorageDriveCapacityBytes => "Physical drive capacity in bytes",
            Metric::StorageLogicalDriveHealth => "Logical drive health (1=OK, 0=degraded)",
            Metric::FirmwareComponentInfo => "Installed firmware version (value is always 1)",
            Metric::SystemHealth => "Overall system health (1=OK, 0=degraded)",
            Metric::SystemPowerState => "System power state (1=On, 0=Off)",
            Metric::SystemInfo => "System identification (value is always 1)",
            Metric::PluginHealth => "Health reported by a vendor plugin resource (1=OK, 0=degraded)",
        }
    }

    pub fn labels(self) -> &'static [&'static str] {
        match self {
            Metric::ThermalFanSpeed => &["name", "unit"],
            Metric::ProcessorHealth | Metric::StorageControllerHealth => &["name", "model"],
            Metric::StorageLogicalDriveHealth => &["name", "raid"],
            Metric::FirmwareComponentInfo => &["name", "version"],
            Metric::SystemHealth | Metric::SystemPowerState => &["hostname"],
            Metric::SystemInfo => &["hostname", "serial", "bios_version", "model"],
            Metric::PluginHealth => &["plugin", "resource"],
            _ => &["name"],
        }
    }
}

/// One gauge value produced by metric mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub metric: Metric,
    pub labels: Vec<String>,
    pub value: f64,
}

impl Observation {
    pub fn new(metric: Metric, labels: &[&str], value: f64) -> Self {
        Self {
            metric,
            labels: labels.iter().map(|l| l.to_string()).collect(),
            value,
        }
    }
}

/// Metrics collector for one device
#[derive(Clone)]
pub struct MetricsCollector {
    registry: Arc<Registry>,
    gauges: Arc<HashMap<Metric, GaugeVec>>,
    pub up: Arc<Gauge>,
    publish_lock: Arc<RwLock<()>>,
}

impl MetricsCollector {
    /// Create the registry with every metric under `scope`.
    pub fn new(scope: &str) -> Result<Self> {
        let registry = Registry::new();
        let mut gauges = HashMap::with_capacity(Metric::ALL.len());

        for metric in Metric::ALL {
            let gauge = GaugeVec::new(
                Opts::new(metric.name(), metric.help()).namespace(scope),
                metric.labels(),
            )?;
            registry.register(Box::new(gauge.clone()))?;
            gauges.insert(metric, gauge);
        }

        let up = Gauge::with_opts(
            Opts::new(
                "up",
                "Scrape reliability (0=down, 1=healthy, 2=ignored after authentication failure)",
            )
            .namespace(scope),
        )?;
        registry.register(Box::new(up.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            gauges: Arc::new(gauges),
            up: Arc::new(up),
            publish_lock: Arc::new(RwLock::new(())),
        })
    }

    pub fn gauge(&self, metric: Metric) -> Option<&GaugeVec> {
        self.gauges.get(&metric)
    }

    /// Helper to set gauge values; mismatched label sets are logged and skipped.
    pub fn set_gauge(&self, metric: Metric, labels: &[&str], value: f64) {
        let Some(gauge) = self.gauges.get(&metric) else {
            return;
        };
        match gauge.get_metric_with_label_values(labels) {
            Ok(g) => g.set(value),
            Err(e) => warn!("Dropping observation for {}: {}", metric.name(), e),
        }
    }

    /// Reset all labelled metrics.
    pub fn reset(&self) {
        for gauge in self.gauges.values() {
            gauge.reset();
        }
    }

    /// Replace the previous scrape's series with `observations` and set `up`.
    pub fn publish(&self, observations: &[Observation], reliability: Reliability) {
        let _guard = self
            .publish_lock
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        self.reset();
        for observation in observations {
            let labels: Vec<&str> = observation.labels.iter().map(String::as_str).collect();
            self.set_gauge(observation.metric, &labels, observation.value);
        }
        self.up.set(reliability.value());
    }

    /// Render metrics in Prometheus text format
    pub fn render(&self) -> anyhow::Result<String> {
        let metric_families = {
            let _guard = self
                .publish_lock
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            self.registry.gather()
        };
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
