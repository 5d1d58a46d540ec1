//! Google Cloud Platform driver
//!
//! # Module Structure
//!
//! - [`auth`] - Credential fallback chain and gcloud project lookup
//! - [`client`] - Project-bound REST client and per-service clients
//! - [`projects`] - Project lookup for the health probe
//! - [`services`] - Service catalog and collectors
//! - [`driver`] - [`GcpDriver`], the [`crate::Driver`] implementation

pub mod auth;
pub mod client;
pub mod driver;
pub mod projects;
pub mod services;

pub use driver::{GcpDriver, GcpSettings};
pub use services::GcpService;

use crate::resource::Normalizer;
use client::GcpClient;

pub const PROVIDER: &str = "gcp";

/// Top-level fields redacted from GCP resources
pub const SENSITIVE_FIELDS: &[&str] = &[
    "masterAuth",
    "rootPassword",
    "serverCaCert",
    "metadata",
    "privateKeyData",
    "clientKey",
    "clientCertificate",
    "sharedSecret",
];

/// Identity resolved for one driver instance
pub(crate) struct GcpSession {
    pub client: GcpClient,
    pub normalizer: Normalizer,
}
