//! GCP Client
//!
//! [`GcpClient`] combines credentials and HTTP for one project.
//! [`GcpServiceClient`] is that client bound to one service base URL
//! (zonal, regional or global); these are what the driver caches.

use super::auth::GcpCredentials;
use crate::discovery::{paginate, PaginatedResult};
use crate::http::{with_query, RestClient};
use anyhow::{bail, Context, Result};
use futures::stream::BoxStream;
use serde_json::Value;

const COMPUTE_HOST: &str = "https://compute.googleapis.com";
const STORAGE_HOST: &str = "https://storage.googleapis.com";
const CONTAINER_HOST: &str = "https://container.googleapis.com";
const SQLADMIN_HOST: &str = "https://sqladmin.googleapis.com";
const RESOURCEMANAGER_HOST: &str = "https://cloudresourcemanager.googleapis.com";

/// Main GCP client
#[derive(Clone)]
pub struct GcpClient {
    pub credentials: GcpCredentials,
    pub http: RestClient,
    pub project_id: String,
    /// Replaces every API host when set
    endpoint: Option<String>,
}

impl GcpClient {
    pub fn new(credentials: GcpCredentials, project_id: &str, endpoint: Option<&str>) -> Result<Self> {
        Ok(Self {
            credentials,
            http: RestClient::new()?,
            project_id: project_id.to_string(),
            endpoint: endpoint.map(|e| e.trim_end_matches('/').to_string()),
        })
    }

    /// Make a GET request to a GCP API
    pub async fn get(&self, url: &str) -> Result<Value> {
        let token = self.credentials.get_token().await?;
        self.http.get(url, &token).await
    }

    fn root(&self, host: &'static str) -> &str {
        self.endpoint.as_deref().unwrap_or(host)
    }

    /// Bind this client to one service base URL
    pub fn scoped(&self, base_url: String) -> GcpServiceClient {
        GcpServiceClient {
            client: self.clone(),
            base_url,
        }
    }

    // =========================================================================
    // Compute Engine API helpers
    // =========================================================================

    pub fn compute_base(&self) -> String {
        format!("{}/compute/v1/projects/{}", self.root(COMPUTE_HOST), self.project_id)
    }

    /// Build Compute Engine API URL
    pub fn compute_url(&self, path: &str) -> String {
        format!("{}/{}", self.compute_base(), path)
    }

    pub fn compute_zonal_url(&self, zone: &str) -> String {
        self.compute_url(&format!("zones/{}", zone))
    }

    pub fn compute_global_url(&self) -> String {
        self.compute_url("global")
    }

    /// All zones at once
    pub fn compute_aggregated_url(&self) -> String {
        self.compute_url("aggregated")
    }

    /// Rebase a Compute `selfLink` onto the configured compute host
    pub fn compute_link(&self, self_link: &str) -> Result<String> {
        let parsed = url::Url::parse(self_link).with_context(|| format!("Invalid selfLink: {}", self_link))?;
        let path = parsed.path();
        if !path.starts_with("/compute/") {
            bail!("Not a Compute Engine link: {}", self_link);
        }
        Ok(format!("{}{}", self.root(COMPUTE_HOST), path))
    }

    // =========================================================================
    // Other APIs
    // =========================================================================

    pub fn storage_base(&self) -> String {
        format!("{}/storage/v1", self.root(STORAGE_HOST))
    }

    pub fn container_base(&self) -> String {
        format!("{}/v1/projects/{}", self.root(CONTAINER_HOST), self.project_id)
    }

    pub fn sql_base(&self) -> String {
        format!("{}/sql/v1beta4/projects/{}", self.root(SQLADMIN_HOST), self.project_id)
    }

    /// Build Resource Manager API URL
    pub fn resourcemanager_url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.root(RESOURCEMANAGER_HOST), path)
    }
}

/// Where a listing response keeps its items
#[derive(Debug, Clone, Copy)]
pub enum ListShape {
    /// Plain array under this field
    Field(&'static str),
    /// `{"items": {"zones/x": {"instances": [...]}}}`
    Aggregated,
}

/// GCP client bound to one service base URL
#[derive(Clone)]
pub struct GcpServiceClient {
    client: GcpClient,
    base_url: String,
}

impl GcpServiceClient {
    pub fn url(&self, resource: &str) -> String {
        format!("{}/{}", self.base_url, resource)
    }

    pub fn client(&self) -> &GcpClient {
        &self.client
    }

    pub async fn get(&self, url: &str) -> Result<Value> {
        self.client.get(url).await
    }

    /// Every item of `resource`, all pages
    pub fn list<'c>(
        &'c self,
        resource: &str,
        shape: ListShape,
        query: &[(&str, &str)],
    ) -> BoxStream<'c, Result<Value>> {
        let url = with_query(&self.url(resource), query);

        paginate(move |page_token: Option<String>| {
            let page_url = match page_token.as_deref() {
                Some(token) => with_query(&url, &[("pageToken", token)]),
                None => url.clone(),
            };
            async move {
                let response = self.get(&page_url).await?;
                Ok(PaginatedResult {
                    items: extract_items(&response, shape),
                    next_token: response
                        .get("nextPageToken")
                        .and_then(|v| v.as_str())
                        .map(|s| s.to_string()),
                })
            }
        })
    }
}

fn extract_items(response: &Value, shape: ListShape) -> Vec<Value> {
    match shape {
        ListShape::Field(field) => response
            .get(field)
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default(),
        ListShape::Aggregated => flatten_aggregated_response(response),
    }
}

/// Flatten an aggregated API response into a plain item list.
/// Each scope entry holds one array field plus an optional `warning`.
fn flatten_aggregated_response(response: &Value) -> Vec<Value> {
    let Some(items) = response.get("items").and_then(|v| v.as_object()) else {
        return Vec::new();
    };

    let mut all_items: Vec<Value> = Vec::new();
    for scope_data in items.values() {
        if let Some(obj) = scope_data.as_object() {
            for (key, value) in obj {
                if key == "warning" {
                    continue;
                }
                if let Some(arr) = value.as_array() {
                    all_items.extend(arr.iter().cloned());
                }
            }
        }
    }

    all_items
}
