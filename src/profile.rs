//! Device Profiles
//!
//! One orchestrator serves every hardware line; what differs per vendor is
//! captured here: where discovery starts, which OEM namespaces carry extra links,
//! and the metric scope (`<scope>_<category>_<measurement>`).

use crate::error::{ExporterError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceProfile {
    pub model: &'static str,
    /// Metric namespace.
    pub scope: &'static str,
    /// API root relative to the device base URL.
    pub api_root: &'static str,
    /// Chassis collections, relative to the API root.
    pub chassis_paths: &'static [&'static str],
    /// Manager collection, probed first to validate credentials.
    pub manager_path: &'static str,
    /// OEM namespaces searched for vendor links, most recent first.
    pub oem_namespaces: &'static [&'static str],
}

const GENERIC: DeviceProfile = DeviceProfile {
    model: "generic",
    scope: "redfish",
    api_root: "/redfish/v1",
    chassis_paths: &["Chassis"],
    manager_path: "Managers",
    oem_namespaces: &[],
};

const HPE: DeviceProfile = DeviceProfile {
    model: "hpe",
    scope: "hpe",
    api_root: "/redfish/v1",
    chassis_paths: &["Chassis"],
    manager_path: "Managers",
    oem_namespaces: &["Hpe", "Hp"],
};

const DELL: DeviceProfile = DeviceProfile {
    model: "dell",
    scope: "dell",
    api_root: "/redfish/v1",
    chassis_paths: &["Chassis"],
    manager_path: "Managers",
    oem_namespaces: &["Dell"],
};

const LENOVO: DeviceProfile = DeviceProfile {
    model: "lenovo",
    scope: "lenovo",
    api_root: "/redfish/v1",
    chassis_paths: &["Chassis"],
    manager_path: "Managers",
    oem_namespaces: &["Lenovo"],
};

const PROFILES: &[DeviceProfile] = &[GENERIC, HPE, DELL, LENOVO];

impl DeviceProfile {
    /// Look up a profile by model name (case-insensitive).
    pub fn for_model(model: &str) -> Result<&'static DeviceProfile> {
        PROFILES
            .iter()
            .find(|p| p.model.eq_ignore_ascii_case(model.trim()))
            .ok_or_else(|| ExporterError::Config(format!("unknown hardware model '{}'", model)))
    }

    /// Absolute path of the API root for `base_url`.
    pub fn root_url(&self, base_url: &str) -> String {
        crate::bmc::types::absolute_url(base_url, self.api_root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        assert_eq!(DeviceProfile::for_model("HPE").unwrap().scope, "hpe");
        assert_eq!(DeviceProfile::for_model(" generic ").unwrap().scope, "redfish");
    }

    #[test]
    fn test_unknown_model() {
        assert!(DeviceProfile::for_model("c7000").is_err());
    }
}
