//! Resource Graph Types
//!
//! Management controllers describe their topology as hyperlinked JSON
//! resources, but the shape of a link drifted across schema revisions:
//!
//! - newer payloads: `"Links": { "Drives": [ { "@odata.id": "/redfish/v1/..." } ] }`
//! - older payloads: `"links": { "Drives": { "href": "/rest/v1/..." } }`
//!
//! Rather than one struct per casing, a [`LinkPath`] lists the field chain of
//! each known variant and [`links`] walks all of them, accepting any link
//! shape (bare string, `@odata.id` object, `href` object, or arrays of those).
//! Results are merged, normalized with a trailing slash, and de-duplicated.
//!
//! Numeric fields that firmware revisions report as integers, floats or
//! numeric strings decode through [`Reading`].

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// One field chain leading to a link, e.g. `&["Links", "Drives"]`.
pub type LinkPath = &'static [&'static str];

/// Collection member variants, newest first.
pub const MEMBERS: &[LinkPath] = &[&["Members"], &["links", "Member"], &["Links", "Members"]];

/// Append a trailing slash to the path part of a link.
pub fn normalize_link(link: &str) -> String {
    let link = link.trim();
    let (path, query) = match link.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (link, None),
    };
    let mut normalized = path.to_string();
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    if let Some(query) = query {
        normalized.push('?');
        normalized.push_str(query);
    }
    normalized
}

/// Resolve a (possibly relative) link against the device base URL.
pub fn absolute_url(base_url: &str, link: &str) -> String {
    if link.starts_with("http://") || link.starts_with("https://") {
        return normalize_link(link);
    }
    let base = base_url.trim_end_matches('/');
    if link.starts_with('/') {
        normalize_link(&format!("{}{}", base, link))
    } else {
        normalize_link(&format!("{}/{}", base, link))
    }
}

fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, key| current.get(*key))
}

fn link_targets(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) if !s.is_empty() => out.push(s.clone()),
        Value::Array(items) => {
            for item in items {
                link_targets(item, out);
            }
        }
        Value::Object(map) => {
            if let Some(Value::String(s)) = map.get("@odata.id").or_else(|| map.get("href")) {
                out.push(s.clone());
            }
        }
        _ => {}
    }
}

/// Every link reachable through any of `variants`, merged and de-duplicated.
pub fn links(value: &Value, variants: &[&[&str]]) -> Vec<String> {
    let mut raw = Vec::new();
    for path in variants {
        if let Some(found) = lookup(value, path) {
            link_targets(found, &mut raw);
        }
    }

    let mut merged: Vec<String> = Vec::with_capacity(raw.len());
    for link in raw {
        let link = normalize_link(&link);
        if !merged.contains(&link) {
            merged.push(link);
        }
    }
    merged
}

/// First link found through `variants`, tried in order.
pub fn first_link(value: &Value, variants: &[&[&str]]) -> Option<String> {
    links(value, variants).into_iter().next()
}

/// Member links of a collection resource.
pub fn collection_members(value: &Value) -> Vec<String> {
    links(value, MEMBERS)
}

/// First string found through `variants`, tried in order.
pub fn first_string(value: &Value, variants: &[&[&str]]) -> Option<String> {
    variants
        .iter()
        .filter_map(|path| lookup(value, path))
        .find_map(|v| v.as_str().map(str::to_string))
        .filter(|s| !s.is_empty())
}

/// A field some firmware reports as a number and some as a string.
#[derive(Debug, Clone, PartialEq)]
pub enum Reading {
    Number(f64),
    Text(String),
}

impl Reading {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Reading::Number(n) => Some(*n),
            Reading::Text(s) => s.trim().parse().ok(),
        }
    }

    pub fn as_text(&self) -> String {
        match self {
            Reading::Number(n) if n.fract() == 0.0 => format!("{}", *n as i64),
            Reading::Number(n) => n.to_string(),
            Reading::Text(s) => s.clone(),
        }
    }
}

impl<'de> Deserialize<'de> for Reading {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(i64),
            Float(f64),
            Text(String),
            Flag(bool),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Int(n) => Reading::Number(n as f64),
            Raw::Float(n) => Reading::Number(n),
            Raw::Text(s) => match s.trim().parse::<f64>() {
                Ok(n) => Reading::Number(n),
                Err(_) => Reading::Text(s),
            },
            Raw::Flag(b) => Reading::Number(if b { 1.0 } else { 0.0 }),
        })
    }
}

/// `Status` block shared by nearly every resource.
///
/// Some firmware repeats the block's fields in lower case; the capitalized
/// spelling wins when both are present.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Status {
    #[serde(rename = "Health", default)]
    health: Option<String>,
    #[serde(rename = "health", default)]
    legacy_health: Option<String>,
    #[serde(rename = "State", default)]
    state: Option<String>,
    #[serde(rename = "state", default)]
    legacy_state: Option<String>,
}

impl Status {
    pub fn health(&self) -> Option<&str> {
        self.health.as_deref().or(self.legacy_health.as_deref())
    }

    pub fn state(&self) -> Option<&str> {
        self.state.as_deref().or(self.legacy_state.as_deref())
    }

    /// `OK` maps to 1, any other reported health to 0.
    pub fn health_value(&self) -> Option<f64> {
        self.health()
            .map(|h| if h.eq_ignore_ascii_case("ok") { 1.0 } else { 0.0 })
    }

    /// Absent components (`State: Absent`) report no health.
    pub fn is_absent(&self) -> bool {
        self.state()
            .is_some_and(|s| s.eq_ignore_ascii_case("absent"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_links_merge_both_casings() {
        let chassis = json!({
            "Links": { "Storage": [ { "@odata.id": "/redfish/v1/Systems/1/Storage/DA000000" } ] },
            "links": { "Storage": { "href": "/redfish/v1/Systems/1/Storage/DA000000/" } }
        });

        let found = links(&chassis, &[&["Links", "Storage"], &["links", "Storage"]]);

        assert_eq!(found, vec!["/redfish/v1/Systems/1/Storage/DA000000/".to_string()]);
    }

    #[test]
    fn test_legacy_collection_members() {
        let collection = json!({
            "links": { "Member": [ { "href": "/rest/v1/Chassis/1" }, { "href": "/rest/v1/Chassis/2" } ] }
        });

        assert_eq!(
            collection_members(&collection),
            vec!["/rest/v1/Chassis/1/".to_string(), "/rest/v1/Chassis/2/".to_string()]
        );
    }

    #[test]
    fn test_absolute_url_keeps_query() {
        assert_eq!(
            absolute_url("https://10.0.0.5/", "/redfish/v1/Chassis?$expand=."),
            "https://10.0.0.5/redfish/v1/Chassis/?$expand=."
        );
    }

    #[test]
    fn test_reading_normalizes_numeric_strings() {
        let r: Reading = serde_json::from_value(json!("42")).unwrap();
        assert_eq!(r.as_f64(), Some(42.0));

        let r: Reading = serde_json::from_value(json!("2.10 Jan 2024")).unwrap();
        assert_eq!(r.as_f64(), None);
        assert_eq!(r.as_text(), "2.10 Jan 2024");

        let r: Reading = serde_json::from_value(json!(2.5)).unwrap();
        assert_eq!(r.as_text(), "2.5");
    }

    #[test]
    fn test_status_health_value() {
        let s: Status = serde_json::from_value(json!({"Health": "Warning"})).unwrap();
        assert_eq!(s.health_value(), Some(0.0));

        let s: Status = serde_json::from_value(json!({"health": "OK"})).unwrap();
        assert_eq!(s.health_value(), Some(1.0));

        let s = Status::default();
        assert_eq!(s.health_value(), None);
    }

    #[test]
    fn test_status_with_both_casings() {
        let status: Status = serde_json::from_value(json!({
            "Health": "OK",
            "health": "OK",
            "State": "Enabled",
            "state": "Enabled"
        }))
        .unwrap();

        assert_eq!(status.health_value(), Some(1.0));
        assert!(!status.is_absent());
    }
}
