//! Property-based tests using proptest
//!
//! Filter precedence, sanitization, tag extraction and client cache
//! accounting over randomized inputs.

use cloudscan::discovery::{resolve_plan, ClientCache, ClientKey, ServiceKind};
use cloudscan::resource::{extract_tags, sanitize, TagModel, REDACTED};
use cloudscan::DiscoveryFilter;
use proptest::prelude::*;
use serde_json::{json, Map, Value};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq)]
struct Named(String);

impl ServiceKind for Named {
    fn parse(name: &str) -> Self {
        Named(name.to_string())
    }

    fn name(&self) -> &str {
        &self.0
    }

    fn catalog() -> Vec<Self> {
        SERVICES.iter().map(|s| Named(s.to_string())).collect()
    }
}

const SERVICES: &[&str] = &["compute", "storage", "network", "firewall", "kubernetes", "sql", "database"];

fn arb_service() -> impl Strategy<Value = String> {
    prop::sample::select(SERVICES).prop_map(String::from)
}

fn arb_services() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec(arb_service(), 0..8)
}

/// Flat raw object with string, number and null fields
fn arb_raw() -> impl Strategy<Value = Map<String, Value>> {
    prop::collection::btree_map(
        "[a-zA-Z_]{1,12}",
        prop_oneof![
            "[ -~]{0,20}".prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            Just(Value::Null),
        ],
        0..12,
    )
    .prop_map(|m| m.into_iter().collect())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// A service listed in both include and exclude is never planned
    #[test]
    fn exclude_always_wins(
        configured in arb_services(),
        include in arb_services(),
        exclude in arb_services(),
    ) {
        let filter = DiscoveryFilter::default().include(include.clone()).exclude(exclude.clone());
        let plan: Vec<Named> = resolve_plan(Some(configured.as_slice()), &filter);

        for service in &plan {
            prop_assert!(!exclude.contains(&service.0));
            prop_assert!(include.is_empty() || include.contains(&service.0));
            prop_assert!(configured.contains(&service.0));
        }
    }

    /// Plan keeps configured order and drops duplicates
    #[test]
    fn plan_preserves_first_occurrence_order(configured in arb_services()) {
        let plan: Vec<Named> = resolve_plan(Some(configured.as_slice()), &DiscoveryFilter::default());

        let mut expected: Vec<String> = Vec::new();
        for name in &configured {
            if !expected.contains(name) {
                expected.push(name.clone());
            }
        }
        let names: Vec<String> = plan.into_iter().map(|s| s.0).collect();
        prop_assert_eq!(names, expected);
    }

    /// Only sensitive top-level fields change, and they all change
    #[test]
    fn sanitize_alters_only_sensitive_fields(
        raw in arb_raw(),
        sensitive in prop::collection::vec("[a-zA-Z_]{1,12}", 0..6),
    ) {
        let original = Value::Object(raw.clone());
        let fields: Vec<&str> = sensitive.iter().map(String::as_str).collect();
        let clean = sanitize(&original, &fields);

        prop_assert_eq!(&original, &Value::Object(raw.clone()));
        for (key, value) in &raw {
            if fields.contains(&key.as_str()) {
                prop_assert_eq!(&clean[key], &json!(REDACTED));
            } else {
                prop_assert_eq!(&clean[key], value);
            }
        }
        prop_assert_eq!(clean.as_object().map(|m| m.len()), Some(raw.len()));
    }

    /// Objects without a tag container yield an empty mapping for every model
    #[test]
    fn missing_tag_container_is_empty(raw in arb_raw()) {
        let mut raw = raw;
        for key in ["labels", "tags", "Tags", "freeformTags", "definedTags"] {
            raw.remove(key);
        }
        let raw = Value::Object(raw);

        let models = [
            TagModel::Map { path: "labels" },
            TagModel::StringList { path: "tags", separator: ':' },
            TagModel::KeyValueList { path: "Tags", key: "Key", value: "Value" },
            TagModel::FreeformDefined { freeform: "freeformTags", defined: "definedTags" },
        ];
        for model in models {
            prop_assert!(extract_tags(&raw, &model).is_empty());
        }
    }

    /// Every `key:value` string becomes exactly one tag
    #[test]
    fn string_list_tags_split_on_first_separator(
        pairs in prop::collection::btree_map("[a-z]{1,8}", "[a-z0-9:]{0,8}", 0..10),
    ) {
        let entries: Vec<String> = pairs.iter().map(|(k, v)| format!("{}:{}", k, v)).collect();
        let tags = extract_tags(&json!({ "tags": entries }), &TagModel::StringList { path: "tags", separator: ':' });

        prop_assert_eq!(tags.len(), pairs.len());
        for (key, value) in &pairs {
            prop_assert_eq!(tags.get(key), Some(&Some(value.clone())));
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// One build per distinct key; every other request is a hit
    #[test]
    fn cache_builds_once_per_distinct_key(
        requests in prop::collection::vec((prop::option::of("r[1-4]"), arb_service()), 1..40),
    ) {
        let cache: ClientCache<String> = ClientCache::new();

        tokio_test::block_on(async {
            for (region, service) in &requests {
                let key = match region {
                    Some(r) => ClientKey::regional(r, service),
                    None => ClientKey::global(service),
                };
                let label = format!("{:?}", key);
                let client = cache
                    .get_or_try_init(key, || async move { Ok::<_, ()>(label) })
                    .await
                    .unwrap();
                assert!(client.contains(service.as_str()));
            }
        });

        let distinct: HashSet<(Option<String>, String)> = requests.iter().cloned().collect();
        let stats = cache.stats();
        prop_assert_eq!(stats.misses as usize, distinct.len());
        prop_assert_eq!(stats.hits as usize, requests.len() - distinct.len());
        prop_assert_eq!(tokio_test::block_on(cache.len()), distinct.len());
    }
}
