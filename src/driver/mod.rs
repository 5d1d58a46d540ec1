//! Driver contract
//!
//! Every provider is one independent implementation of [`Driver`]. The
//! orchestrator in [`crate::discovery`] is written against this trait only.
//!
//! # Example
//!
//! ```ignore
//! use cloudscan::{create_driver, DriverInput, ListOptions};
//! use futures::StreamExt;
//!
//! async fn dump(input: DriverInput) -> anyhow::Result<()> {
//!     let driver = create_driver(input)?;
//!     driver.initialize().await?;
//!     let mut resources = driver.list_resources(ListOptions::default());
//!     while let Some(resource) = resources.next().await {
//!         println!("{}", serde_json::to_string(&resource?)?);
//!     }
//!     driver.destroy().await;
//!     Ok(())
//! }
//! ```

mod logger;
mod options;

pub use logger::{DriverLogger, LogLevel, LogSink};
pub use options::{DiscoveryFilter, ListOptions, ProgressInfo, ProgressSink, RuntimeOptions};

use crate::error::DiscoveryError;
use crate::resource::NormalizedResource;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Lazy, finite stream of normalized resources. Only fatal errors appear as
/// items, and a fatal error is always the last item.
pub type ResourceStream<'a> = BoxStream<'a, Result<NormalizedResource, DiscoveryError>>;

/// Result of a liveness probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl HealthStatus {
    pub fn healthy() -> Self {
        Self {
            healthy: true,
            message: None,
        }
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            healthy: false,
            message: Some(message.into()),
        }
    }
}

#[async_trait]
pub trait Driver: Send + Sync {
    /// Instance id (caller-supplied or generated)
    fn id(&self) -> &str;

    /// Provider tag stamped on every resource
    fn provider(&self) -> &'static str;

    /// Cheap, idempotent bootstrapping (credential and identity resolution).
    /// Safe to call any number of times; `list_resources` calls it implicitly.
    async fn initialize(&self) -> Result<(), DiscoveryError>;

    /// Start a fresh enumeration. Each call is independent of earlier ones.
    fn list_resources(&self, options: ListOptions) -> ResourceStream<'_>;

    /// Liveness probe. The default does not contact the backend.
    async fn health_check(&self) -> Result<HealthStatus, DiscoveryError> {
        Ok(HealthStatus::healthy())
    }

    /// Drop cached clients and identity. Idempotent.
    async fn destroy(&self);
}

/// Driver construction input
#[derive(Clone, Default, Deserialize)]
pub struct DriverInput {
    #[serde(default)]
    pub id: Option<String>,
    /// Provider key, e.g. `gcp` or `digitalocean`
    #[serde(default)]
    pub driver: Option<String>,
    #[serde(default)]
    pub credentials: Map<String, Value>,
    #[serde(default)]
    pub config: Map<String, Value>,
    #[serde(skip)]
    pub logger: Option<LogSink>,
}

impl fmt::Debug for DriverInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Credential values never reach logs
        let credential_keys: Vec<&String> = self.credentials.keys().collect();
        f.debug_struct("DriverInput")
            .field("id", &self.id)
            .field("driver", &self.driver)
            .field("credentials", &credential_keys)
            .field("config", &self.config)
            .field("logger", &self.logger.is_some())
            .finish()
    }
}

impl DriverInput {
    pub fn new(driver: impl Into<String>) -> Self {
        Self {
            driver: Some(driver.into()),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn credential(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.credentials.insert(key.to_string(), value.into());
        self
    }

    pub fn config_value(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.config.insert(key.to_string(), value.into());
        self
    }

    pub fn with_logger(mut self, sink: LogSink) -> Self {
        self.logger = Some(sink);
        self
    }

    /// Provider key, required at construction time
    pub fn driver_key(&self) -> Result<&str, DiscoveryError> {
        self.driver
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| DiscoveryError::configuration("driver input is missing the 'driver' key"))
    }

    /// Explicit id, or a fresh one
    pub fn resolved_id(&self) -> String {
        self.id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
    }

    /// Deserialize the `config` map into a provider settings struct
    pub fn parse_config<T: DeserializeOwned>(&self) -> Result<T, DiscoveryError> {
        serde_json::from_value(Value::Object(self.config.clone()))
            .map_err(|e| DiscoveryError::configuration(format!("invalid driver config: {}", e)))
    }

    /// Non-empty string credential
    pub fn credential_str(&self, key: &str) -> Option<&str> {
        self.credentials
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

/// Settings every driver understands
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CommonSettings {
    /// Configured services; `None` means the provider's full catalog
    pub services: Option<Vec<String>>,
    pub regions: Vec<String>,
    /// Services collected at once. 1 keeps the stream fully lazy.
    pub max_concurrency: Option<usize>,
    /// API base override
    pub endpoint: Option<String>,
}

impl CommonSettings {
    pub fn concurrency(&self) -> usize {
        self.max_concurrency.unwrap_or(1).max(1)
    }
}
