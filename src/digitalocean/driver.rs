//! DigitalOcean driver

use super::auth::{resolve_token, DoCredentialInput};
use super::client::DoClient;
use super::services::{CollectContext, DoService};
use super::{DoSession, PROVIDER, SENSITIVE_FIELDS};
use crate::discovery::{resolve_plan, CacheStats, ClientCache, DiscoveryRun};
use crate::driver::{
    CommonSettings, Driver, DriverInput, DriverLogger, HealthStatus, ListOptions, ResourceStream,
};
use crate::error::DiscoveryError;
use crate::http::format_api_error;
use crate::resource::{AccountScope, Normalizer};
use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

/// `config` keys understood by the DigitalOcean driver
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DoSettings {
    #[serde(flatten)]
    pub common: CommonSettings,
}

pub struct DigitalOceanDriver {
    id: String,
    logger: DriverLogger,
    settings: DoSettings,
    credential_input: DoCredentialInput,
    session: RwLock<Option<Arc<DoSession>>>,
    clients: ClientCache<DoClient>,
}

impl DigitalOceanDriver {
    pub fn new(input: DriverInput) -> Result<Self, DiscoveryError> {
        let settings: DoSettings = input.parse_config()?;

        let credential_input = DoCredentialInput {
            token: input.credential_str("token").map(String::from),
            context: input.credential_str("context").map(String::from),
            config_file: input.credential_str("config_file").map(PathBuf::from),
        };

        let id = input.resolved_id();
        let logger = DriverLogger::new(id.clone(), PROVIDER, input.logger.clone());

        Ok(Self {
            id,
            logger,
            settings,
            credential_input,
            session: RwLock::new(None),
            clients: ClientCache::new(),
        })
    }

    pub fn settings(&self) -> &DoSettings {
        &self.settings
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.clients.stats()
    }

    async fn session(&self) -> Result<Arc<DoSession>, DiscoveryError> {
        if let Some(session) = self.session.read().await.as_ref() {
            return Ok(session.clone());
        }

        let mut slot = self.session.write().await;
        if let Some(session) = slot.as_ref() {
            return Ok(session.clone());
        }

        let resolved = resolve_token(&self.credential_input, |var| std::env::var(var).ok())?;
        let client = DoClient::new(&resolved.token, self.settings.common.endpoint.as_deref())
            .map_err(|e| DiscoveryError::configuration(format!("failed to build HTTP client: {}", e)))?;

        // The account uuid scopes every resource, so it must resolve up front
        let account = client.get("v2/account").await.map_err(|e| {
            DiscoveryError::authentication(
                format!("could not resolve the DigitalOcean account: {}", format_api_error(&e)),
                [resolved.origin.clone()],
            )
        })?;
        let account_id = account
            .pointer("/account/uuid")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                DiscoveryError::authentication("account response carries no uuid", [resolved.origin.clone()])
            })?
            .to_string();

        self.logger.info(
            "DigitalOcean session ready",
            json!({
                "accountId": account_id,
                "credentials": resolved.origin,
            }),
        );

        let normalizer = Normalizer::new(PROVIDER, Some(AccountScope::AccountId(account_id)), SENSITIVE_FIELDS);
        let session = Arc::new(DoSession { client, normalizer });
        *slot = Some(session.clone());
        Ok(session)
    }
}

#[async_trait]
impl Driver for DigitalOceanDriver {
    fn id(&self) -> &str {
        &self.id
    }

    fn provider(&self) -> &'static str {
        PROVIDER
    }

    async fn initialize(&self) -> Result<(), DiscoveryError> {
        self.session().await.map(|_| ())
    }

    fn list_resources(&self, options: ListOptions) -> ResourceStream<'_> {
        let plan: Vec<DoService> = resolve_plan(self.settings.common.services.as_deref(), &options.discovery);
        let run = DiscoveryRun::new(&self.logger, options.runtime).with_concurrency(self.settings.common.concurrency());

        Box::pin(async_stream::stream! {
            let session = match self.session().await {
                Ok(session) => session,
                Err(err) => {
                    yield Err(err);
                    return;
                },
            };

            let ctx = CollectContext {
                logger: &self.logger,
                clients: &self.clients,
                session,
                regions: &self.settings.common.regions,
            };

            let mut resources = run.execute(plan, move |service: &DoService| ctx.clone().collector(service));
            while let Some(item) = resources.next().await {
                yield item;
            }
        })
    }

    async fn health_check(&self) -> Result<HealthStatus, DiscoveryError> {
        let session = self.session().await?;

        match session.client.get("v2/account").await {
            Ok(response) => Ok(account_health(&response)),
            Err(err) => Ok(HealthStatus::unhealthy(format_api_error(&err))),
        }
    }

    async fn destroy(&self) {
        self.clients.clear().await;
        *self.session.write().await = None;
        self.logger.debug("Driver destroyed", json!({}));
    }
}

fn account_health(response: &Value) -> HealthStatus {
    let status = response
        .pointer("/account/status")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown");

    if status == "active" {
        return HealthStatus::healthy();
    }

    let detail = response
        .pointer("/account/status_message")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty());
    match detail {
        Some(detail) => HealthStatus::unhealthy(format!("account is {}: {}", status, detail)),
        None => HealthStatus::unhealthy(format!("account is {}", status)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_health() {
        assert!(account_health(&json!({ "account": { "status": "active" } })).healthy);

        let locked = account_health(&json!({
            "account": { "status": "locked", "status_message": "billing" }
        }));
        assert!(!locked.healthy);
        assert_eq!(locked.message.as_deref(), Some("account is locked: billing"));
    }

    #[test]
    fn test_credentials_are_read_from_input() {
        let input = DriverInput::new("digitalocean")
            .credential("token", "dop_v1_x")
            .credential("context", "  ")
            .config_value("regions", json!(["nyc3", "fra1"]));
        let driver = DigitalOceanDriver::new(input).unwrap();
        assert_eq!(driver.credential_input.token.as_deref(), Some("dop_v1_x"));
        assert_eq!(driver.credential_input.context, None);
        assert_eq!(driver.settings().common.regions, vec!["nyc3", "fra1"]);
    }
}
