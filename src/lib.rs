//! cloudscan: multi-provider cloud resource discovery
//!
//! Each provider is a [`Driver`]. A driver enumerates live resources as a
//! lazy stream of [`NormalizedResource`] records; a failing service is
//! reported through the driver's logger and never aborts the run.
//!
//! # Module Structure
//!
//! - [`driver`] - Driver contract, construction input and call options
//! - [`discovery`] - Service plan, client cache, collectors, orchestrator
//! - [`resource`] - Normalized resource model and normalization
//! - [`registry`] - Provider key to driver constructor
//! - [`config`] - Config file loading
//! - [`gcp`], [`digitalocean`] - Provider drivers (cargo features)

pub mod config;
pub mod discovery;
pub mod driver;
pub mod error;
pub mod http;
pub mod registry;
pub mod resource;

#[cfg(feature = "digitalocean")]
pub mod digitalocean;
#[cfg(feature = "gcp")]
pub mod gcp;

pub use driver::{
    DiscoveryFilter, Driver, DriverInput, HealthStatus, ListOptions, LogLevel, LogSink, ProgressInfo,
    ProgressSink, ResourceStream, RuntimeOptions,
};
pub use error::DiscoveryError;
pub use registry::{available_providers, create_driver, ProviderKind};
pub use resource::{AccountScope, NormalizedResource, Tags};
