//! DigitalOcean driver
//!
//! - [`auth`] - Token fallback chain (static, doctl context, environment)
//! - [`client`] - Page-numbered REST client
//! - [`services`] - Service catalog and collectors
//! - [`driver`] - [`DigitalOceanDriver`]

pub mod auth;
pub mod client;
pub mod driver;
pub mod services;

pub use driver::{DigitalOceanDriver, DoSettings};
pub use services::DoService;

use crate::resource::Normalizer;
use client::DoClient;

pub const PROVIDER: &str = "digitalocean";

/// Top-level fields redacted from DigitalOcean resources
pub const SENSITIVE_FIELDS: &[&str] = &[
    "connection",
    "private_connection",
    "standby_connection",
    "standby_private_connection",
    "users",
    "kube_config",
];

pub(crate) struct DoSession {
    pub client: DoClient,
    pub normalizer: Normalizer,
}
