//! DigitalOcean service catalog and collectors

use super::client::DoClient;
use super::DoSession;
use crate::discovery::{
    expand_children, per_region, ClientCache, ClientKey, ClientScope, CollectorStream, ServiceKind,
};
use crate::driver::DriverLogger;
use crate::resource::{json_path, TagModel};
use anyhow::Result;
use async_stream::try_stream;
use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;

pub const RT_DROPLET: &str = "digitalocean.compute.droplet";
pub const RT_VOLUME: &str = "digitalocean.storage.volume";
pub const RT_VPC: &str = "digitalocean.network.vpc";
pub const RT_K8S_CLUSTER: &str = "digitalocean.kubernetes.cluster";
pub const RT_K8S_NODE_POOL: &str = "digitalocean.kubernetes.nodePool";
pub const RT_DATABASE: &str = "digitalocean.database.cluster";
pub const RT_DATABASE_POOL: &str = "digitalocean.database.pool";

const TAGS: TagModel<'static> = TagModel::StringList {
    path: "tags",
    separator: ':',
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DoService {
    Compute,
    Storage,
    Network,
    Kubernetes,
    Database,
    Unknown(String),
}

impl ServiceKind for DoService {
    fn parse(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "compute" | "droplets" => Self::Compute,
            "storage" | "volumes" => Self::Storage,
            "network" | "vpc" => Self::Network,
            "kubernetes" => Self::Kubernetes,
            "database" | "databases" => Self::Database,
            _ => Self::Unknown(name.to_string()),
        }
    }

    fn name(&self) -> &str {
        match self {
            Self::Compute => "compute",
            Self::Storage => "storage",
            Self::Network => "network",
            Self::Kubernetes => "kubernetes",
            Self::Database => "database",
            Self::Unknown(name) => name,
        }
    }

    fn catalog() -> Vec<Self> {
        vec![
            Self::Compute,
            Self::Storage,
            Self::Network,
            Self::Kubernetes,
            Self::Database,
        ]
    }
}

#[derive(Clone)]
pub(crate) struct CollectContext<'a> {
    pub logger: &'a DriverLogger,
    pub clients: &'a ClientCache<DoClient>,
    pub session: Arc<DoSession>,
    pub regions: &'a [String],
}

impl<'a> CollectContext<'a> {
    async fn client(&self, key: ClientKey) -> Result<DoClient> {
        let session = &self.session;
        self.clients
            .get_or_try_init(key.clone(), || async move {
                let client = match &key.scope {
                    ClientScope::Region(region) => session.client.for_region(region),
                    ClientScope::Global => session.client.clone(),
                };
                Ok::<_, anyhow::Error>(client)
            })
            .await
    }

    pub fn collector(self, service: &DoService) -> Option<CollectorStream<'a>> {
        let stream = match service {
            DoService::Compute => self.droplets(),
            DoService::Storage => self.volumes(),
            DoService::Network => self.vpcs(),
            DoService::Kubernetes => self.kubernetes(),
            DoService::Database => self.databases(),
            DoService::Unknown(_) => return None,
        };
        Some(stream)
    }

    fn droplets(self) -> CollectorStream<'a> {
        Box::pin(try_stream! {
            let client = self.client(ClientKey::global("compute")).await?;
            let mut droplets = client.list("v2/droplets", "droplets");
            while let Some(raw) = droplets.next().await {
                let raw = raw?;
                yield self
                    .session
                    .normalizer
                    .resource("compute", RT_DROPLET, &raw)
                    .region(string_at(&raw, "region.slug"))
                    .tags(TAGS)
                    .meta("size", string_at(&raw, "size_slug"))
                    .build()?;
            }
        })
    }

    /// Volumes are listed per region when regions are configured
    fn volumes(self) -> CollectorStream<'a> {
        if self.regions.is_empty() {
            return self.volumes_in(ClientKey::global("storage"));
        }

        let logger = self.logger;
        let regions = self.regions.to_vec();
        per_region(logger, "storage", regions, move |region| {
            self.clone().volumes_in(ClientKey::regional(&region, "storage"))
        })
    }

    fn volumes_in(self, key: ClientKey) -> CollectorStream<'a> {
        Box::pin(try_stream! {
            let client = self.client(key).await?;
            let mut volumes = client.list("v2/volumes", "volumes");
            while let Some(raw) = volumes.next().await {
                let raw = raw?;
                yield self
                    .session
                    .normalizer
                    .resource("storage", RT_VOLUME, &raw)
                    .region(string_at(&raw, "region.slug"))
                    .tags(TAGS)
                    .build()?;
            }
        })
    }

    fn vpcs(self) -> CollectorStream<'a> {
        Box::pin(try_stream! {
            let client = self.client(ClientKey::global("network")).await?;
            let mut vpcs = client.list("v2/vpcs", "vpcs");
            while let Some(raw) = vpcs.next().await {
                let raw = raw?;
                // VPCs carry no tags
                yield self
                    .session
                    .normalizer
                    .resource("network", RT_VPC, &raw)
                    .region(string_at(&raw, "region"))
                    .meta("default", raw.get("default").cloned().unwrap_or(Value::Null))
                    .build()?;
            }
        })
    }

    fn kubernetes(self) -> CollectorStream<'a> {
        Box::pin(try_stream! {
            let client = self.client(ClientKey::global("kubernetes")).await?;
            let mut clusters = client.list("v2/kubernetes/clusters", "kubernetes_clusters");

            while let Some(raw) = clusters.next().await {
                let raw = raw?;
                let region = string_at(&raw, "region");
                let cluster = self
                    .session
                    .normalizer
                    .resource("kubernetes", RT_K8S_CLUSTER, &raw)
                    .region(region.clone())
                    .tags(TAGS)
                    .build()?;
                let cluster_id = cluster.resource_id.clone();
                let cluster_name = cluster.name.clone();
                yield cluster;

                let pools: Vec<Value> = raw
                    .get("node_pools")
                    .and_then(|v| v.as_array())
                    .cloned()
                    .unwrap_or_default();
                if pools.is_empty() {
                    continue;
                }

                let children = self.clone().node_pools(pools, region, cluster_id.clone(), cluster_name);
                let mut children = expand_children(self.logger, "kubernetes", cluster_id, children);
                while let Some(pool) = children.next().await {
                    yield pool?;
                }
            }
        })
    }

    fn node_pools(
        self,
        pools: Vec<Value>,
        region: Option<String>,
        cluster_id: String,
        cluster_name: Option<String>,
    ) -> CollectorStream<'a> {
        Box::pin(try_stream! {
            for raw in pools {
                yield self
                    .session
                    .normalizer
                    .resource("kubernetes", RT_K8S_NODE_POOL, &raw)
                    .region(region.clone())
                    .tags(TAGS)
                    .meta("clusterId", cluster_id.as_str())
                    .meta("clusterName", cluster_name.clone())
                    .build()?;
            }
        })
    }

    fn databases(self) -> CollectorStream<'a> {
        Box::pin(try_stream! {
            let client = self.client(ClientKey::global("database")).await?;
            let mut databases = client.list("v2/databases", "databases");

            while let Some(raw) = databases.next().await {
                let raw = raw?;
                let region = string_at(&raw, "region");
                let database = self
                    .session
                    .normalizer
                    .resource("database", RT_DATABASE, &raw)
                    .region(region.clone())
                    .tags(TAGS)
                    .meta("engine", string_at(&raw, "engine"))
                    .build()?;
                let database_id = database.resource_id.clone();
                let database_name = database.name.clone();
                yield database;

                // Connection pools exist only for PostgreSQL clusters
                if string_at(&raw, "engine").as_deref() != Some("pg") {
                    continue;
                }

                let pools = self.clone().database_pools(client.clone(), region, database_id.clone(), database_name);
                let mut pools = expand_children(self.logger, "database", database_id, pools);
                while let Some(pool) = pools.next().await {
                    yield pool?;
                }
            }
        })
    }

    fn database_pools(
        self,
        client: DoClient,
        region: Option<String>,
        database_id: String,
        database_name: Option<String>,
    ) -> CollectorStream<'a> {
        Box::pin(try_stream! {
            let response = client.get(&format!("v2/databases/{}/pools", database_id)).await?;
            let pools = response
                .get("pools")
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default();

            for raw in pools {
                let Some(name) = string_at(&raw, "name") else {
                    continue;
                };
                yield self
                    .session
                    .normalizer
                    .resource("database", RT_DATABASE_POOL, &raw)
                    .id(format!("{}/{}", database_id, name))
                    .region(region.clone())
                    .meta("databaseId", database_id.as_str())
                    .meta("databaseName", database_name.clone())
                    .build()?;
            }
        })
    }
}

fn string_at(raw: &Value, path: &str) -> Option<String> {
    json_path(raw, path)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(String::from)
}
