//! GCP driver
//!
//! Identity (credentials and project) is resolved once per driver instance
//! and kept until [`Driver::destroy`]. Service clients are built lazily
//! through the driver's [`ClientCache`].

use super::auth::{get_default_project, validate_project_id, GcpCredentialInput, GcpCredentials};
use super::client::{GcpClient, GcpServiceClient};
use super::projects::get_project;
use super::services::{CollectContext, GcpService};
use super::{GcpSession, PROVIDER, SENSITIVE_FIELDS};
use crate::discovery::{resolve_plan, CacheStats, ClientCache, DiscoveryRun};
use crate::driver::{
    CommonSettings, Driver, DriverInput, DriverLogger, HealthStatus, ListOptions, ResourceStream,
};
use crate::error::{into_fatal, DiscoveryError};
use crate::http::format_api_error;
use crate::resource::{AccountScope, Normalizer};
use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

/// `config` keys understood by the GCP driver.
///
/// For `compute`, each `regions` entry is a zone (`us-central1-a`) or a
/// region (`us-central1`). A region is collected through the aggregated
/// listing, keeping only instances in that region's zones.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GcpSettings {
    #[serde(flatten)]
    pub common: CommonSettings,
    /// Falls back to the credential source, then the gcloud configuration
    #[serde(default)]
    pub project_id: Option<String>,
}

pub struct GcpDriver {
    id: String,
    logger: DriverLogger,
    settings: GcpSettings,
    credential_input: GcpCredentialInput,
    session: RwLock<Option<Arc<GcpSession>>>,
    clients: ClientCache<GcpServiceClient>,
}

impl GcpDriver {
    pub fn new(input: DriverInput) -> Result<Self, DiscoveryError> {
        let settings: GcpSettings = input.parse_config()?;
        if let Some(project) = settings.project_id.as_deref() {
            if !validate_project_id(project) {
                return Err(DiscoveryError::configuration(format!(
                    "invalid GCP project id '{}'",
                    project
                )));
            }
        }

        let credential_input = GcpCredentialInput {
            access_token: input.credential_str("access_token").map(String::from),
            key_file: input.credential_str("key_file").map(PathBuf::from),
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

    pub fn settings(&self) -> &GcpSettings {
        &self.settings
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.clients.stats()
    }

    async fn session(&self) -> Result<Arc<GcpSession>, DiscoveryError> {
        if let Some(session) = self.session.read().await.as_ref() {
            return Ok(session.clone());
        }

        let mut slot = self.session.write().await;
        if let Some(session) = slot.as_ref() {
            return Ok(session.clone());
        }

        let credentials = GcpCredentials::resolve(&self.credential_input).await?;
        let project_id = self.resolve_project(&credentials).await?;

        let client = GcpClient::new(credentials, &project_id, self.settings.common.endpoint.as_deref())
            .map_err(|e| DiscoveryError::configuration(format!("failed to build HTTP client: {}", e)))?;
        let normalizer = Normalizer::new(
            PROVIDER,
            Some(AccountScope::ProjectId(project_id.clone())),
            SENSITIVE_FIELDS,
        );

        self.logger.info(
            "GCP session ready",
            json!({
                "projectId": project_id,
                "credentials": client.credentials.origin(),
            }),
        );

        let session = Arc::new(GcpSession { client, normalizer });
        *slot = Some(session.clone());
        Ok(session)
    }

    async fn resolve_project(&self, credentials: &GcpCredentials) -> Result<String, DiscoveryError> {
        if let Some(project) = self.settings.project_id.clone() {
            return Ok(project);
        }

        if let Some(project) = credentials.project_id().await.filter(|p| validate_project_id(p)) {
            return Ok(project);
        }

        get_default_project().ok_or_else(|| {
            DiscoveryError::authentication(
                "could not determine the GCP project. Set config.project_id or run 'gcloud config set project'",
                ["config.project_id", credentials.origin(), "gcloud configuration"],
            )
        })
    }
}

#[async_trait]
impl Driver for GcpDriver {
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
        let plan: Vec<GcpService> = resolve_plan(self.settings.common.services.as_deref(), &options.discovery);
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

            let mut resources = run.execute(plan, move |service: &GcpService| ctx.clone().collector(service));
            while let Some(item) = resources.next().await {
                yield item;
            }
        })
    }

    async fn health_check(&self) -> Result<HealthStatus, DiscoveryError> {
        let session = self.session().await?;

        match get_project(&session.client).await {
            Ok(project) if project.is_active() => Ok(HealthStatus::healthy()),
            Ok(project) => Ok(HealthStatus::unhealthy(format!(
                "project {} is {}",
                project.project_id, project.lifecycle_state
            ))),
            Err(err) => match into_fatal(err) {
                Ok(fatal) => Err(fatal),
                Err(err) => Ok(HealthStatus::unhealthy(format_api_error(&err))),
            },
        }
    }

    async fn destroy(&self) {
        self.clients.clear().await;
        *self.session.write().await = None;
        self.logger.debug("Driver destroyed", json!({}));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_flatten_common_keys() {
        let input = DriverInput::new("gcp")
            .config_value("project_id", "my-project-123")
            .config_value("regions", json!(["us-central1-a"]))
            .config_value("services", json!(["compute"]));
        let driver = GcpDriver::new(input).unwrap();
        assert_eq!(driver.settings().project_id.as_deref(), Some("my-project-123"));
        assert_eq!(driver.settings().common.regions, vec!["us-central1-a"]);
        assert_eq!(driver.provider(), "gcp");
    }

    #[test]
    fn test_invalid_project_id_is_configuration_error() {
        let input = DriverInput::new("gcp").config_value("project_id", "Bad_Project");
        let err = GcpDriver::new(input).err().unwrap();
        assert!(matches!(err, DiscoveryError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_static_token_session_uses_configured_project() {
        let input = DriverInput::new("gcp")
            .with_id("gcp-test")
            .credential("access_token", "ya29.test")
            .config_value("project_id", "my-project-123");
        let driver = GcpDriver::new(input).unwrap();

        driver.initialize().await.unwrap();
        driver.initialize().await.unwrap();
        let session = driver.session().await.unwrap();
        assert_eq!(session.client.project_id, "my-project-123");
        assert_eq!(driver.id(), "gcp-test");

        driver.destroy().await;
        driver.destroy().await;
        assert!(driver.session.read().await.is_none());
    }
}
