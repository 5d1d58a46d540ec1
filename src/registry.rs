//! Provider registry
//!
//! Maps a provider key to a driver constructor. Providers are compiled in
//! per cargo feature, so a build only links the SDKs it can actually use.

use crate::driver::{Driver, DriverInput};
use crate::error::DiscoveryError;
use std::fmt;

/// Providers compiled into this build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    #[cfg(feature = "gcp")]
    Gcp,
    #[cfg(feature = "digitalocean")]
    DigitalOcean,
}

impl ProviderKind {
    /// Case-insensitive key lookup, aliases included
    pub fn from_key(key: &str) -> Option<Self> {
        match key.trim().to_ascii_lowercase().as_str() {
            #[cfg(feature = "gcp")]
            "gcp" | "google" => Some(Self::Gcp),
            #[cfg(feature = "digitalocean")]
            "digitalocean" | "do" => Some(Self::DigitalOcean),
            _ => None,
        }
    }

    pub fn key(&self) -> &'static str {
        match *self {
            #[cfg(feature = "gcp")]
            Self::Gcp => crate::gcp::PROVIDER,
            #[cfg(feature = "digitalocean")]
            Self::DigitalOcean => crate::digitalocean::PROVIDER,
        }
    }

    pub fn all() -> Vec<Self> {
        vec![
            #[cfg(feature = "gcp")]
            Self::Gcp,
            #[cfg(feature = "digitalocean")]
            Self::DigitalOcean,
        ]
    }

    fn construct(self, input: DriverInput) -> Result<Box<dyn Driver>, DiscoveryError> {
        match self {
            #[cfg(feature = "gcp")]
            Self::Gcp => Ok(Box::new(crate::gcp::GcpDriver::new(input)?)),
            #[cfg(feature = "digitalocean")]
            Self::DigitalOcean => Ok(Box::new(crate::digitalocean::DigitalOceanDriver::new(input)?)),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Keys of every compiled-in provider
pub fn available_providers() -> Vec<&'static str> {
    ProviderKind::all().iter().map(ProviderKind::key).collect()
}

/// Build the driver named by `input.driver`
pub fn create_driver(input: DriverInput) -> Result<Box<dyn Driver>, DiscoveryError> {
    let key = input.driver_key()?;

    let Some(kind) = ProviderKind::from_key(key) else {
        let available = available_providers();
        let valid = if available.is_empty() {
            "none (no provider features enabled)".to_string()
        } else {
            available.join(", ")
        };
        return Err(DiscoveryError::configuration(format!(
            "unknown driver '{}'. Valid drivers: {}",
            key, valid
        )));
    };

    tracing::debug!(provider = %kind, "Creating driver");
    kind.construct(input)
}
