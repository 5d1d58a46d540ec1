//! DigitalOcean API client
//!
//! Listings are page-numbered: `?page=N&per_page=200`, continuing while the
//! response carries `links.pages.next`.

use crate::discovery::{paginate, PaginatedResult};
use crate::http::{with_query, RestClient};
use anyhow::Result;
use futures::stream::BoxStream;
use serde_json::Value;
use std::fmt;

pub const API_HOST: &str = "https://api.digitalocean.com";
const PER_PAGE: &str = "200";

#[derive(Clone)]
pub struct DoClient {
    http: RestClient,
    token: String,
    base: String,
    /// Added as `region=` to every listing when set
    region: Option<String>,
}

impl fmt::Debug for DoClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DoClient")
            .field("base", &self.base)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

impl DoClient {
    pub fn new(token: &str, endpoint: Option<&str>) -> Result<Self> {
        Ok(Self {
            http: RestClient::new()?,
            token: token.to_string(),
            base: endpoint.unwrap_or(API_HOST).trim_end_matches('/').to_string(),
            region: None,
        })
    }

    /// Same client, listings restricted to one region
    pub fn for_region(&self, region: &str) -> Self {
        Self {
            region: Some(region.to_string()),
            ..self.clone()
        }
    }

    /// `path` is relative to the API root, e.g. `v2/account`
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }

    pub async fn get(&self, path: &str) -> Result<Value> {
        self.http.get(&self.url(path), &self.token).await
    }

    /// Every item under `field` across all pages of `path`
    pub fn list<'c>(&'c self, path: &str, field: &'static str) -> BoxStream<'c, Result<Value>> {
        let mut url = self.url(path);
        if let Some(region) = self.region.as_deref() {
            url = with_query(&url, &[("region", region)]);
        }

        paginate(move |page: Option<String>| {
            let page = page.unwrap_or_else(|| "1".to_string());
            let page_url = with_query(&url, &[("page", page.as_str()), ("per_page", PER_PAGE)]);

            async move {
                let response = self.http.get(&page_url, &self.token).await?;
                let items = response
                    .get(field)
                    .and_then(|v| v.as_array())
                    .cloned()
                    .unwrap_or_default();

                Ok(PaginatedResult {
                    next_token: next_page(&response, &page),
                    items,
                })
            }
        })
    }
}

fn next_page(response: &Value, current: &str) -> Option<String> {
    let has_next = response
        .pointer("/links/pages/next")
        .and_then(|v| v.as_str())
        .is_some_and(|s| !s.is_empty());
    if !has_next {
        return None;
    }
    current.parse::<u32>().ok().map(|n| (n + 1).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_url_joins_endpoint() {
        let client = DoClient::new("t", Some("http://127.0.0.1:8080/")).unwrap();
        assert_eq!(client.url("/v2/droplets"), "http://127.0.0.1:8080/v2/droplets");

        let default = DoClient::new("t", None).unwrap();
        assert_eq!(default.url("v2/account"), "https://api.digitalocean.com/v2/account");
    }

    #[test]
    fn test_next_page() {
        let more = json!({ "links": { "pages": { "next": "https://api.digitalocean.com/v2/droplets?page=3" } } });
        assert_eq!(next_page(&more, "2").as_deref(), Some("3"));

        let last = json!({ "links": { "pages": { "prev": "x" } } });
        assert_eq!(next_page(&last, "2"), None);
        assert_eq!(next_page(&json!({}), "1"), None);
    }

    #[test]
    fn test_debug_hides_token() {
        let client = DoClient::new("dop_v1_secret", None).unwrap().for_region("nyc3");
        let rendered = format!("{:?}", client);
        assert!(!rendered.contains("dop_v1_secret"));
        assert!(rendered.contains("nyc3"));
    }
}
