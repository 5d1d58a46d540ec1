//! Discovery error taxonomy
//!
//! Only [`DiscoveryError::Configuration`] and [`DiscoveryError::Authentication`]
//! ever leave a resource stream. Service and child-expansion failures are
//! reported through the driver logger and the run continues.

use thiserror::Error;

/// Errors raised by drivers and the discovery engine
#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// Statically invalid construction input. Not retriable.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No usable credentials could be resolved. Not retriable.
    #[error("Authentication failed: {message} (checked: {})", .checked.join(", "))]
    Authentication {
        message: String,
        /// Inputs that were consulted, in resolution order
        checked: Vec<String>,
    },

    /// One service's listing failed
    #[error("Collection of service '{service}' failed{}: {source:#}", region_suffix(.region))]
    ServiceCollection {
        service: String,
        region: Option<String>,
        #[source]
        source: anyhow::Error,
    },

    /// Listing children of an already emitted parent failed
    #[error("Expanding children of '{parent_id}' in service '{service}' failed: {source:#}")]
    ChildExpansion {
        service: String,
        parent_id: String,
        #[source]
        source: anyhow::Error,
    },
}

fn region_suffix(region: &Option<String>) -> String {
    region
        .as_deref()
        .map(|r| format!(" in region '{}'", r))
        .unwrap_or_default()
}

impl DiscoveryError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn authentication<I, S>(message: impl Into<String>, checked: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Authentication {
            message: message.into(),
            checked: checked.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether this error aborts the whole run
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::Authentication { .. })
    }

    /// Stable label used in failure reports
    pub fn classification(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration_error",
            Self::Authentication { .. } => "authentication_error",
            Self::ServiceCollection { .. } => "service_collection_error",
            Self::ChildExpansion { .. } => "child_expansion_error",
        }
    }
}

/// Pull a fatal [`DiscoveryError`] out of a collector error.
///
/// Returns the original error untouched when it is not fatal, so the caller
/// can report it and move on.
pub fn into_fatal(err: anyhow::Error) -> Result<DiscoveryError, anyhow::Error> {
    match err.downcast::<DiscoveryError>() {
        Ok(inner) if inner.is_fatal() => Ok(inner),
        Ok(inner) => Err(anyhow::Error::new(inner)),
        Err(other) => Err(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_configuration_and_authentication_are_fatal() {
        assert!(DiscoveryError::configuration("missing driver").is_fatal());
        assert!(DiscoveryError::authentication("no token", ["credentials.token"]).is_fatal());

        let service = DiscoveryError::ServiceCollection {
            service: "storage".into(),
            region: None,
            source: anyhow::anyhow!("boom"),
        };
        assert!(!service.is_fatal());
        assert_eq!(service.classification(), "service_collection_error");
    }

    #[test]
    fn test_authentication_message_names_checked_inputs() {
        let err = DiscoveryError::authentication(
            "no credentials found",
            ["credentials.token", "DIGITALOCEAN_TOKEN"],
        );
        let msg = err.to_string();
        assert!(msg.contains("credentials.token"));
        assert!(msg.contains("DIGITALOCEAN_TOKEN"));
    }

    #[test]
    fn test_into_fatal_separates_fatal_errors() {
        let fatal = anyhow::Error::new(DiscoveryError::authentication("expired", ["adc"]));
        assert!(into_fatal(fatal).is_ok());

        let plain = anyhow::anyhow!("API request failed: 403 Forbidden");
        let back = into_fatal(plain).unwrap_err();
        assert!(back.to_string().contains("403"));
    }

    #[test]
    fn test_service_error_mentions_region() {
        let err = DiscoveryError::ServiceCollection {
            service: "compute".into(),
            region: Some("us-east1-b".into()),
            source: anyhow::anyhow!("timeout"),
        };
        assert!(err.to_string().contains("us-east1-b"));
    }
}
