//! Resource normalization
//!
//! Converts one raw provider object into one [`NormalizedResource`]:
//! tag extraction across the different tag models, field-name based
//! redaction of secrets, and identity mapping.

use super::{AccountScope, NormalizedResource, Tags};
use anyhow::{anyhow, Result};
use chrono::Utc;
use serde_json::{Map, Value};

/// Replacement written over sensitive fields
pub const REDACTED: &str = "[REDACTED]";

/// Field names redacted for every provider
pub const COMMON_SENSITIVE_FIELDS: &[&str] = &[
    "password",
    "secret",
    "token",
    "private_key",
    "privateKey",
    "connection_string",
    "connectionString",
    "certificate",
    "credentials",
];

/// How a provider exposes tags on a raw object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagModel<'a> {
    /// `{"env": "prod"}`
    Map { path: &'a str },
    /// `[{"Key": "env", "Value": "prod"}]`
    KeyValueList {
        path: &'a str,
        key: &'a str,
        value: &'a str,
    },
    /// `["env:prod", "critical"]`
    StringList { path: &'a str, separator: char },
    /// Freeform map plus `{"namespace": {"key": "value"}}`, flattened to
    /// `namespace.key`
    FreeformDefined {
        freeform: &'a str,
        defined: &'a str,
    },
}

/// Extract tags. Missing or null containers give an empty mapping.
pub fn extract_tags(raw: &Value, model: &TagModel<'_>) -> Tags {
    let mut tags = Tags::new();

    match *model {
        TagModel::Map { path } => {
            if let Some(map) = json_path(raw, path).and_then(|v| v.as_object()) {
                insert_map(&mut tags, None, map);
            }
        },
        TagModel::KeyValueList { path, key, value } => {
            let entries = json_path(raw, path).and_then(|v| v.as_array());
            for entry in entries.into_iter().flatten() {
                let Some(k) = entry.get(key).and_then(|v| v.as_str()) else {
                    continue;
                };
                tags.insert(k.to_string(), entry.get(value).and_then(tag_value));
            }
        },
        TagModel::StringList { path, separator } => {
            let entries = json_path(raw, path).and_then(|v| v.as_array());
            for entry in entries.into_iter().flatten().filter_map(|v| v.as_str()) {
                match entry.split_once(separator) {
                    Some((k, v)) => tags.insert(k.to_string(), Some(v.to_string())),
                    None => tags.insert(entry.to_string(), None),
                };
            }
        },
        TagModel::FreeformDefined { freeform, defined } => {
            if let Some(map) = json_path(raw, freeform).and_then(|v| v.as_object()) {
                insert_map(&mut tags, None, map);
            }
            if let Some(namespaces) = json_path(raw, defined).and_then(|v| v.as_object()) {
                for (namespace, entries) in namespaces {
                    if let Some(map) = entries.as_object() {
                        insert_map(&mut tags, Some(namespace.as_str()), map);
                    }
                }
            }
        },
    }

    tags
}

fn insert_map(tags: &mut Tags, namespace: Option<&str>, map: &Map<String, Value>) {
    for (key, value) in map {
        let key = match namespace {
            Some(ns) => format!("{}.{}", ns, key),
            None => key.clone(),
        };
        tags.insert(key, tag_value(value));
    }
}

fn tag_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Copy `raw` with every top-level sensitive field replaced by [`REDACTED`].
/// The input is never modified.
pub fn sanitize(raw: &Value, sensitive: &[&str]) -> Value {
    let mut copy = raw.clone();
    if let Value::Object(ref mut map) = copy {
        for field in sensitive {
            if let Some(slot) = map.get_mut(*field) {
                *slot = Value::String(REDACTED.to_string());
            }
        }
    }
    copy
}

/// Walk a dot-notation path; numeric segments index arrays
pub fn json_path<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
    if path.is_empty() {
        return None;
    }

    let mut current = value;
    for part in path.split('.') {
        current = match part.parse::<usize>() {
            Ok(idx) if current.is_array() => current.get(idx)?,
            _ => current.get(part)?,
        };
    }

    Some(current)
}

/// First candidate path holding a non-empty string or a number
pub fn pick_identifier(raw: &Value, candidates: &[&str]) -> Option<String> {
    candidates
        .iter()
        .filter_map(|path| json_path(raw, path))
        .find_map(|v| match v {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

/// Extract short name from a resource URL
/// e.g., "https://www.googleapis.com/compute/v1/projects/my-project/zones/us-central1-a" -> "us-central1-a"
pub fn extract_short_name(url: &str) -> String {
    url.rsplit('/').next().unwrap_or(url).to_string()
}

/// Per-driver normalization context
#[derive(Debug, Clone)]
pub struct Normalizer {
    provider: &'static str,
    scope: Option<AccountScope>,
    sensitive: Vec<&'static str>,
}

impl Normalizer {
    /// `sensitive` is added to [`COMMON_SENSITIVE_FIELDS`]
    pub fn new(provider: &'static str, scope: Option<AccountScope>, sensitive: &[&'static str]) -> Self {
        let mut fields: Vec<&'static str> = COMMON_SENSITIVE_FIELDS.to_vec();
        for field in sensitive {
            if !fields.contains(field) {
                fields.push(*field);
            }
        }

        Self {
            provider,
            scope,
            sensitive: fields,
        }
    }

    /// Start building a resource from `raw`
    pub fn resource<'n>(
        &'n self,
        service: &str,
        resource_type: &str,
        raw: &'n Value,
    ) -> ResourceBuilder<'n> {
        ResourceBuilder {
            normalizer: self,
            raw,
            service: service.to_string(),
            resource_type: resource_type.to_string(),
            id: None,
            id_candidates: &["id"],
            name_candidates: &["name"],
            region: None,
            tags: None,
            metadata: Map::new(),
        }
    }
}

/// Builder for one [`NormalizedResource`]. Sanitization always runs in
/// [`ResourceBuilder::build`].
pub struct ResourceBuilder<'n> {
    normalizer: &'n Normalizer,
    raw: &'n Value,
    service: String,
    resource_type: String,
    id: Option<String>,
    id_candidates: &'n [&'n str],
    name_candidates: &'n [&'n str],
    region: Option<String>,
    tags: Option<Tags>,
    metadata: Map<String, Value>,
}

impl<'n> ResourceBuilder<'n> {
    /// Identifier paths, most durable first
    pub fn id_from(mut self, candidates: &'n [&'n str]) -> Self {
        self.id_candidates = candidates;
        self
    }

    /// Explicit identifier for objects without a usable native id
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn name_from(mut self, candidates: &'n [&'n str]) -> Self {
        self.name_candidates = candidates;
        self
    }

    pub fn region(mut self, region: Option<String>) -> Self {
        self.region = region.filter(|r| !r.is_empty());
        self
    }

    pub fn tags(mut self, model: TagModel<'_>) -> Self {
        self.tags = Some(extract_tags(self.raw, &model));
        self
    }

    /// Relationship or summary field. Absent (null) values are not stored.
    pub fn meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        let value = value.into();
        if !value.is_null() {
            self.metadata.insert(key.to_string(), value);
        }
        self
    }

    pub fn build(self) -> Result<NormalizedResource> {
        let resource_id = self
            .id
            .or_else(|| pick_identifier(self.raw, self.id_candidates))
            .ok_or_else(|| {
                anyhow!(
                    "{} object has no identifier (looked at {:?})",
                    self.resource_type,
                    self.id_candidates
                )
            })?;

        Ok(NormalizedResource {
            provider: self.normalizer.provider.to_string(),
            scope: self.normalizer.scope.clone(),
            region: self.region,
            service: self.service,
            resource_type: self.resource_type,
            resource_id,
            name: pick_identifier(self.raw, self.name_candidates),
            tags: self.tags,
            metadata: self.metadata,
            configuration: sanitize(self.raw, &self.normalizer.sensitive),
            discovered_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_map_tags() {
        let raw = json!({ "labels": { "env": "prod", "team": null } });
        let tags = extract_tags(&raw, &TagModel::Map { path: "labels" });
        assert_eq!(tags.get("env"), Some(&Some("prod".to_string())));
        assert_eq!(tags.get("team"), Some(&None));
    }

    #[test]
    fn test_key_value_list_tags() {
        let raw = json!({ "Tags": [
            { "Key": "Name", "Value": "web-1" },
            { "Key": "flag" },
            { "Value": "orphan" }
        ]});
        let tags = extract_tags(
            &raw,
            &TagModel::KeyValueList { path: "Tags", key: "Key", value: "Value" },
        );
        assert_eq!(tags.len(), 2);
        assert_eq!(tags["Name"], Some("web-1".to_string()));
        assert_eq!(tags["flag"], None);
    }

    #[test]
    fn test_string_list_tags() {
        let raw = json!({ "tags": ["env:prod", "critical", "url:http://x"] });
        let tags = extract_tags(&raw, &TagModel::StringList { path: "tags", separator: ':' });
        assert_eq!(tags["env"], Some("prod".to_string()));
        assert_eq!(tags["critical"], None);
        assert_eq!(tags["url"], Some("http://x".to_string()));
    }

    #[test]
    fn test_freeform_and_defined_tags_flatten() {
        let raw = json!({
            "freeformTags": { "owner": "ops" },
            "definedTags": { "Finance": { "CostCenter": "42" }, "Ops": { "Tier": 1 } }
        });
        let tags = extract_tags(
            &raw,
            &TagModel::FreeformDefined { freeform: "freeformTags", defined: "definedTags" },
        );
        assert_eq!(tags["owner"], Some("ops".to_string()));
        assert_eq!(tags["Finance.CostCenter"], Some("42".to_string()));
        assert_eq!(tags["Ops.Tier"], Some("1".to_string()));
    }

    #[test]
    fn test_missing_or_null_container_is_empty() {
        let raw = json!({ "labels": null });
        assert!(extract_tags(&raw, &TagModel::Map { path: "labels" }).is_empty());
        assert!(extract_tags(&raw, &TagModel::StringList { path: "tags", separator: ':' }).is_empty());
        assert!(extract_tags(&json!("scalar"), &TagModel::Map { path: "labels" }).is_empty());
    }

    #[test]
    fn test_sanitize_copies_and_redacts_top_level_only() {
        let raw = json!({
            "name": "db-1",
            "password": "hunter2",
            "nested": { "password": "kept" }
        });
        let clean = sanitize(&raw, &["password"]);
        assert_eq!(clean["password"], REDACTED);
        assert_eq!(clean["nested"]["password"], "kept");
        assert_eq!(clean["name"], "db-1");
        assert_eq!(raw["password"], "hunter2");
    }

    #[test]
    fn test_json_path() {
        let raw = json!({ "a": { "b": [ { "c": 1 } ] } });
        assert_eq!(json_path(&raw, "a.b.0.c"), Some(&json!(1)));
        assert_eq!(json_path(&raw, "a.missing"), None);
        assert_eq!(json_path(&raw, ""), None);
    }

    #[test]
    fn test_pick_identifier_prefers_durable_id() {
        let raw = json!({ "id": 123456, "name": "vm-1" });
        assert_eq!(pick_identifier(&raw, &["id", "name"]).as_deref(), Some("123456"));

        let raw = json!({ "id": "", "name": "vm-1" });
        assert_eq!(pick_identifier(&raw, &["id", "name"]).as_deref(), Some("vm-1"));
    }

    #[test]
    fn test_extract_short_name() {
        assert_eq!(
            extract_short_name("https://www.googleapis.com/compute/v1/projects/p/zones/us-central1-a"),
            "us-central1-a"
        );
        assert_eq!(extract_short_name("plain"), "plain");
    }

    #[test]
    fn test_builder_always_sanitizes() {
        let normalizer = Normalizer::new("gcp", Some(AccountScope::ProjectId("p".into())), &["rootPassword"]);
        let raw = json!({ "id": "1", "name": "sql-1", "rootPassword": "pw", "token": "t" });
        let resource = normalizer
            .resource("sql", "gcp.sql.instance", &raw)
            .build()
            .unwrap();

        assert_eq!(resource.configuration["rootPassword"], REDACTED);
        assert_eq!(resource.configuration["token"], REDACTED);
        assert_eq!(resource.name.as_deref(), Some("sql-1"));
        assert!(resource.tags.is_none());
    }

    #[test]
    fn test_builder_without_identifier_fails() {
        let normalizer = Normalizer::new("gcp", None, &[]);
        let raw = json!({ "name": "x" });
        let result = normalizer
            .resource("compute", "gcp.compute.instance", &raw)
            .id_from(&["id"])
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_drops_absent_metadata() {
        let normalizer = Normalizer::new("digitalocean", None, &[]);
        let raw = json!({ "id": 7, "name": "web-1" });
        let resource = normalizer
            .resource("compute", "digitalocean.compute.droplet", &raw)
            .meta("size", raw.get("size_slug").cloned().unwrap_or(Value::Null))
            .meta("vpcName", None::<String>)
            .meta("clusterId", "c-1")
            .build()
            .unwrap();

        assert_eq!(resource.metadata.len(), 1);
        assert_eq!(resource.parent_id("clusterId"), Some("c-1"));
        assert!(!resource.metadata.contains_key("size"));
    }
}
