//! GCP service catalog and collectors
//!
//! One collector per [`GcpService`]. Each collector asks the driver's client
//! cache for the client it needs only once it actually runs.

use super::client::{GcpServiceClient, ListShape};
use super::GcpSession;
use crate::discovery::{
    expand_children, expand_each, per_region, ClientCache, ClientKey, CollectorStream, ServiceKind,
};
use crate::driver::DriverLogger;
use crate::resource::{extract_short_name, NormalizedResource, TagModel};
use anyhow::Result;
use async_stream::try_stream;
use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;

pub const RT_INSTANCE: &str = "gcp.compute.instance";
pub const RT_BUCKET: &str = "gcp.storage.bucket";
pub const RT_NETWORK: &str = "gcp.compute.network";
pub const RT_SUBNETWORK: &str = "gcp.compute.subnetwork";
pub const RT_FIREWALL: &str = "gcp.compute.firewall";
pub const RT_CLUSTER: &str = "gcp.container.cluster";
pub const RT_NODE_POOL: &str = "gcp.container.nodePool";
pub const RT_SQL_INSTANCE: &str = "gcp.sql.instance";

const LABELS: TagModel<'static> = TagModel::Map { path: "labels" };
const DURABLE_ID: &[&str] = &["id", "selfLink", "name"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GcpService {
    Compute,
    Storage,
    Network,
    Firewall,
    Kubernetes,
    Sql,
    Unknown(String),
}

impl ServiceKind for GcpService {
    fn parse(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "compute" => Self::Compute,
            "storage" => Self::Storage,
            "network" => Self::Network,
            "firewall" => Self::Firewall,
            "kubernetes" => Self::Kubernetes,
            "sql" => Self::Sql,
            _ => Self::Unknown(name.to_string()),
        }
    }

    fn name(&self) -> &str {
        match self {
            Self::Compute => "compute",
            Self::Storage => "storage",
            Self::Network => "network",
            Self::Firewall => "firewall",
            Self::Kubernetes => "kubernetes",
            Self::Sql => "sql",
            Self::Unknown(name) => name,
        }
    }

    fn catalog() -> Vec<Self> {
        vec![
            Self::Compute,
            Self::Storage,
            Self::Network,
            Self::Firewall,
            Self::Kubernetes,
            Self::Sql,
        ]
    }
}

/// Everything a collector borrows from the driver for one run
#[derive(Clone)]
pub(crate) struct CollectContext<'a> {
    pub logger: &'a DriverLogger,
    pub clients: &'a ClientCache<GcpServiceClient>,
    pub session: Arc<GcpSession>,
    pub regions: &'a [String],
}

impl<'a> CollectContext<'a> {
    async fn client(&self, key: ClientKey, base_url: String) -> Result<GcpServiceClient> {
        let session = &self.session;
        self.clients
            .get_or_try_init(key, || async move { Ok::<_, anyhow::Error>(session.client.scoped(base_url)) })
            .await
    }

    /// Collector for `service`; `None` when there is none
    pub fn collector(self, service: &GcpService) -> Option<CollectorStream<'a>> {
        let stream = match service {
            GcpService::Compute => self.compute(),
            GcpService::Storage => self.storage(),
            GcpService::Network => self.network(),
            GcpService::Firewall => self.firewall(),
            GcpService::Kubernetes => self.kubernetes(),
            GcpService::Sql => self.sql(),
            GcpService::Unknown(_) => return None,
        };
        Some(stream)
    }

    fn compute(self) -> CollectorStream<'a> {
        if self.regions.is_empty() {
            return Box::pin(try_stream! {
                let base = self.session.client.compute_aggregated_url();
                let client = self.client(ClientKey::global("compute"), base).await?;
                let mut items = client.list("instances", ListShape::Aggregated, &[]);
                while let Some(raw) = items.next().await {
                    let raw = raw?;
                    yield self.instance(&raw)?;
                }
            });
        }

        let logger = self.logger;
        let locations = self.regions.to_vec();
        per_region(logger, "compute", locations, move |location| {
            let ctx = self.clone();
            if is_region(&location) {
                return ctx.instances_in_region(location);
            }
            Box::pin(try_stream! {
                let base = ctx.session.client.compute_zonal_url(&location);
                let client = ctx.client(ClientKey::regional(&location, "compute"), base).await?;
                let mut items = client.list("instances", ListShape::Field("items"), &[]);
                while let Some(raw) = items.next().await {
                    let raw = raw?;
                    yield ctx.instance(&raw)?;
                }
            })
        })
    }

    /// Instances live in zones; a region entry lists every zone of it
    fn instances_in_region(self, region: String) -> CollectorStream<'a> {
        Box::pin(try_stream! {
            let base = self.session.client.compute_aggregated_url();
            let client = self.client(ClientKey::regional(&region, "compute"), base).await?;
            let prefix = format!("{}-", region);
            let mut items = client.list("instances", ListShape::Aggregated, &[]);
            while let Some(raw) = items.next().await {
                let raw = raw?;
                if short_field(&raw, "zone").is_some_and(|zone| zone.starts_with(&prefix)) {
                    yield self.instance(&raw)?;
                }
            }
        })
    }

    fn instance(&self, raw: &Value) -> Result<NormalizedResource> {
        self.session
            .normalizer
            .resource("compute", RT_INSTANCE, raw)
            .id_from(DURABLE_ID)
            .region(short_field(raw, "zone"))
            .tags(LABELS)
            .meta("machineType", short_field(raw, "machineType"))
            .build()
    }

    fn storage(self) -> CollectorStream<'a> {
        Box::pin(try_stream! {
            let base = self.session.client.storage_base();
            let client = self.client(ClientKey::global("storage"), base).await?;
            let project = self.session.client.project_id.clone();
            let mut buckets = client.list("b", ListShape::Field("items"), &[("project", project.as_str())]);
            while let Some(raw) = buckets.next().await {
                let raw = raw?;
                let location = raw
                    .get("location")
                    .and_then(|v| v.as_str())
                    .map(|l| l.to_ascii_lowercase());
                yield self
                    .session
                    .normalizer
                    .resource("storage", RT_BUCKET, &raw)
                    .id_from(DURABLE_ID)
                    .region(location)
                    .tags(LABELS)
                    .build()?;
            }
        })
    }

    fn network(self) -> CollectorStream<'a> {
        Box::pin(try_stream! {
            let base = self.session.client.compute_global_url();
            let client = self.client(ClientKey::global("network"), base).await?;
            let mut networks = client.list("networks", ListShape::Field("items"), &[]);

            while let Some(raw) = networks.next().await {
                let raw = raw?;
                let network = self
                    .session
                    .normalizer
                    .resource("network", RT_NETWORK, &raw)
                    .id_from(DURABLE_ID)
                    .build()?;
                let vpc_id = network.resource_id.clone();
                let vpc_name = network.name.clone();
                yield network;

                let links: Vec<String> = raw
                    .get("subnetworks")
                    .and_then(|v| v.as_array())
                    .map(|arr| arr.iter().filter_map(|v| v.as_str()).map(String::from).collect())
                    .unwrap_or_default();
                if links.is_empty() {
                    continue;
                }

                let ctx = self.clone();
                let links_client = client.clone();
                let parent_id = vpc_id.clone();
                let mut subnets = expand_each(self.logger, "network", vpc_id, links, move |link| {
                    let ctx = ctx.clone();
                    let client = links_client.clone();
                    let vpc_id = parent_id.clone();
                    let vpc_name = vpc_name.clone();
                    async move {
                        let url = client.client().compute_link(&link)?;
                        let raw = client.get(&url).await?;
                        ctx.subnetwork(&raw, &vpc_id, vpc_name)
                    }
                });
                while let Some(subnet) = subnets.next().await {
                    yield subnet?;
                }
            }
        })
    }

    /// One subnetwork fetched from its network's `subnetworks` link
    fn subnetwork(&self, raw: &Value, vpc_id: &str, vpc_name: Option<String>) -> Result<NormalizedResource> {
        self.session
            .normalizer
            .resource("network", RT_SUBNETWORK, raw)
            .id_from(DURABLE_ID)
            .region(short_field(raw, "region"))
            .meta("vpcId", vpc_id)
            .meta("vpcName", vpc_name)
            .build()
    }

    fn firewall(self) -> CollectorStream<'a> {
        Box::pin(try_stream! {
            let base = self.session.client.compute_global_url();
            let client = self.client(ClientKey::global("firewall"), base).await?;
            let mut rules = client.list("firewalls", ListShape::Field("items"), &[]);
            while let Some(raw) = rules.next().await {
                let raw = raw?;
                yield self
                    .session
                    .normalizer
                    .resource("firewall", RT_FIREWALL, &raw)
                    .id_from(DURABLE_ID)
                    .build()?;
            }
        })
    }

    fn kubernetes(self) -> CollectorStream<'a> {
        Box::pin(try_stream! {
            let base = self.session.client.container_base();
            let client = self.client(ClientKey::global("kubernetes"), base).await?;
            let mut clusters = client.list("locations/-/clusters", ListShape::Field("clusters"), &[]);

            while let Some(raw) = clusters.next().await {
                let raw = raw?;
                let location = short_field(&raw, "location");
                let cluster = self
                    .session
                    .normalizer
                    .resource("kubernetes", RT_CLUSTER, &raw)
                    .id_from(DURABLE_ID)
                    .region(location.clone())
                    .tags(TagModel::Map { path: "resourceLabels" })
                    .build()?;
                let cluster_id = cluster.resource_id.clone();
                let cluster_name = cluster.name.clone();
                yield cluster;

                let pools: Vec<Value> = raw
                    .get("nodePools")
                    .and_then(|v| v.as_array())
                    .cloned()
                    .unwrap_or_default();
                if pools.is_empty() {
                    continue;
                }

                let children = self.clone().node_pools(pools, location, cluster_id.clone(), cluster_name);
                let mut children = expand_children(self.logger, "kubernetes", cluster_id, children);
                while let Some(pool) = children.next().await {
                    yield pool?;
                }
            }
        })
    }

    /// Node pools come inline with their cluster
    fn node_pools(
        self,
        pools: Vec<Value>,
        location: Option<String>,
        cluster_id: String,
        cluster_name: Option<String>,
    ) -> CollectorStream<'a> {
        Box::pin(try_stream! {
            for raw in pools {
                yield self
                    .session
                    .normalizer
                    .resource("kubernetes", RT_NODE_POOL, &raw)
                    .id_from(&["selfLink", "name"])
                    .region(location.clone())
                    .tags(TagModel::Map { path: "config.labels" })
                    .meta("clusterId", cluster_id.as_str())
                    .meta("clusterName", cluster_name.clone())
                    .build()?;
            }
        })
    }

    fn sql(self) -> CollectorStream<'a> {
        Box::pin(try_stream! {
            let base = self.session.client.sql_base();
            let client = self.client(ClientKey::global("sql"), base).await?;
            let mut instances = client.list("instances", ListShape::Field("items"), &[]);
            while let Some(raw) = instances.next().await {
                let raw = raw?;
                yield self
                    .session
                    .normalizer
                    .resource("sql", RT_SQL_INSTANCE, &raw)
                    .id_from(&["selfLink", "connectionName", "name"])
                    .region(short_field(&raw, "region"))
                    .tags(TagModel::Map { path: "settings.userLabels" })
                    .meta("databaseVersion", raw.get("databaseVersion").cloned().unwrap_or(Value::Null))
                    .build()?;
            }
        })
    }
}

/// `us-central1` is a region, `us-central1-a` a zone. Anything else is
/// taken as a zone name.
fn is_region(location: &str) -> bool {
    match location.split_once('-') {
        Some((area, rest)) => {
            !area.is_empty() && !rest.contains('-') && rest.ends_with(|c: char| c.is_ascii_digit())
        },
        None => false,
    }
}

/// Last path segment of a string field holding a resource URL
fn short_field(raw: &Value, key: &str) -> Option<String> {
    raw.get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(extract_short_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::resolve_plan;
    use crate::driver::DiscoveryFilter;
    use serde_json::json;

    #[test]
    fn test_parse_is_case_insensitive_and_total() {
        assert_eq!(GcpService::parse("Compute"), GcpService::Compute);
        assert_eq!(GcpService::parse("sql"), GcpService::Sql);
        assert_eq!(GcpService::parse("spanner"), GcpService::Unknown("spanner".into()));
        assert_eq!(GcpService::parse("spanner").name(), "spanner");
    }

    #[test]
    fn test_catalog_names_round_trip() {
        for service in GcpService::catalog() {
            assert_eq!(GcpService::parse(service.name()), service);
        }
    }

    #[test]
    fn test_filter_matches_case_variants() {
        let configured = vec!["Compute".to_string(), "SQL".to_string()];
        let filter = DiscoveryFilter::default().exclude(["Compute"]);
        let plan: Vec<GcpService> = resolve_plan(Some(configured.as_slice()), &filter);
        assert_eq!(plan, vec![GcpService::Sql]);

        let filter = DiscoveryFilter::default().exclude(["compute"]);
        let plan: Vec<GcpService> = resolve_plan(Some(configured.as_slice()), &filter);
        assert_eq!(plan, vec![GcpService::Sql]);
    }

    #[test]
    fn test_is_region() {
        assert!(is_region("us-central1"));
        assert!(is_region("europe-west4"));
        assert!(!is_region("us-central1-a"));
        assert!(!is_region("r1"));
        assert!(!is_region("global"));
    }

    #[test]
    fn test_short_field() {
        let raw = json!({
            "zone": "https://www.googleapis.com/compute/v1/projects/p/zones/us-central1-a",
            "empty": ""
        });
        assert_eq!(short_field(&raw, "zone").as_deref(), Some("us-central1-a"));
        assert_eq!(short_field(&raw, "empty"), None);
        assert_eq!(short_field(&raw, "missing"), None);
    }
}
