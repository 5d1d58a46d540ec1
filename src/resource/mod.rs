//! Normalized resource model
//!
//! Every provider maps its raw API objects into [`NormalizedResource`].
//!
//! # Architecture
//!
//! - [`normalize`] - Tag extraction, sanitization and identity mapping
//!
//! A record is self-describing: provider, ownership scope, type and id are all
//! on the record. Parent/child relationships live in `metadata` as plain ids.

pub mod normalize;

pub use normalize::{
    extract_short_name, extract_tags, json_path, pick_identifier, sanitize, Normalizer,
    ResourceBuilder, TagModel, COMMON_SENSITIVE_FIELDS, REDACTED,
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Provider-native tag keys; a `None` value is a valueless tag
pub type Tags = BTreeMap<String, Option<String>>;

/// Billing/ownership scope. At most one applies per provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AccountScope {
    AccountId(String),
    SubscriptionId(String),
    OrganizationId(String),
    ProjectId(String),
}

impl AccountScope {
    pub fn id(&self) -> &str {
        match self {
            Self::AccountId(id)
            | Self::SubscriptionId(id)
            | Self::OrganizationId(id)
            | Self::ProjectId(id) => id,
        }
    }
}

/// The unit of discovery output
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedResource {
    pub provider: String,
    #[serde(flatten)]
    pub scope: Option<AccountScope>,
    /// `None` for global resources
    pub region: Option<String>,
    pub service: String,
    /// Dotted, provider-namespaced type, e.g. `gcp.compute.instance`
    pub resource_type: String,
    pub resource_id: String,
    pub name: Option<String>,
    /// `None` when the resource type supports no tagging
    pub tags: Option<Tags>,
    pub metadata: Map<String, Value>,
    /// Sanitized copy of the raw provider object
    pub configuration: Value,
    pub discovered_at: DateTime<Utc>,
}

impl NormalizedResource {
    /// Parent id recorded under `key` in `metadata`
    pub fn parent_id(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }

    /// Comparable form without wall-clock fields
    pub fn fingerprint(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Value::Object(ref mut map) = value {
            map.remove("discoveredAt");
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scope_serializes_as_single_field() {
        let resource = NormalizedResource {
            provider: "gcp".into(),
            scope: Some(AccountScope::ProjectId("my-project".into())),
            region: None,
            service: "storage".into(),
            resource_type: "gcp.storage.bucket".into(),
            resource_id: "bucket-1".into(),
            name: Some("bucket-1".into()),
            tags: None,
            metadata: Map::new(),
            configuration: json!({}),
            discovered_at: Utc::now(),
        };

        let value = serde_json::to_value(&resource).unwrap();
        assert_eq!(value["projectId"], "my-project");
        assert!(value.get("accountId").is_none());
        assert_eq!(value["resourceType"], "gcp.storage.bucket");
        assert!(value["region"].is_null());
        assert!(resource.fingerprint().get("discoveredAt").is_none());
    }
}
