pub mod client;
pub mod types;

pub use client::{FetchClient, Presence};

use crate::error::{ExporterError, Result};

/// Identity of one management controller for the lifetime of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// URL authority (`host[:port]`), the key for credential and ignore state.
    pub host: String,
    /// Scheme plus authority, e.g. `https://10.0.0.5`.
    pub base_url: String,
    pub model: String,
    pub credential_profile: String,
}

impl Target {
    /// Accepts a bare host (`10.0.0.5`) or a URL (`http://10.0.0.5:8080/`).
    pub fn parse(target: &str, model: &str, credential_profile: &str) -> Result<Self> {
        let target = target.trim();
        let (scheme, rest) = match target.split_once("://") {
            Some((scheme, rest)) => (scheme.to_ascii_lowercase(), rest),
            None => ("https".to_string(), target),
        };
        if scheme != "http" && scheme != "https" {
            return Err(ExporterError::Config(format!(
                "unsupported scheme '{}' in target {}",
                scheme, target
            )));
        }
        let host = rest.split('/').next().unwrap_or_default();
        if host.is_empty() {
            return Err(ExporterError::Config("target host is empty".to_string()));
        }

        Ok(Self {
            host: host.to_string(),
            base_url: format!("{}://{}", scheme, host),
            model: model.to_string(),
            credential_profile: credential_profile.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_host_defaults_to_https() {
        let t = Target::parse("10.0.0.5", "hpe", "default").unwrap();
        assert_eq!(t.host, "10.0.0.5");
        assert_eq!(t.base_url, "https://10.0.0.5");
    }

    #[test]
    fn test_url_target_keeps_scheme_and_port() {
        let t = Target::parse("http://127.0.0.1:8080/redfish/v1/", "generic", "p").unwrap();
        assert_eq!(t.host, "127.0.0.1:8080");
        assert_eq!(t.base_url, "http://127.0.0.1:8080");
    }

    #[test]
    fn test_rejects_empty_and_unknown_scheme() {
        assert!(Target::parse("https://", "generic", "p").is_err());
        assert!(Target::parse("ftp://bmc", "generic", "p").is_err());
    }
}
