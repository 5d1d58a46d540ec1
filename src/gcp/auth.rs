//! GCP Authentication
//!
//! Resolves credentials through a fallback chain: a static access token,
//! a service-account key file, then Application Default Credentials.
//! The first source that yields a working token provider wins.

use crate::error::DiscoveryError;
use anyhow::Result;
use gcp_auth::{CustomServiceAccount, TokenProvider};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Default scopes for GCP API access
pub const DEFAULT_SCOPES: &[&str] = &["https://www.googleapis.com/auth/cloud-platform"];

/// Token expiry buffer - refresh tokens this much before they actually expire
const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// Default token TTL if we can't determine expiry (conservative: 30 minutes)
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

pub const CHECKED_ACCESS_TOKEN: &str = "credentials.access_token";
pub const CHECKED_KEY_FILE: &str = "credentials.key_file";
pub const CHECKED_ADC: &str = "application default credentials";

/// Credential inputs taken from the driver's `credentials` map
#[derive(Debug, Clone, Default)]
pub struct GcpCredentialInput {
    pub access_token: Option<String>,
    pub key_file: Option<PathBuf>,
}

#[derive(Clone)]
enum TokenSource {
    Static(String),
    Provider(Arc<dyn TokenProvider>),
}

/// GCP credentials holder with token caching
#[derive(Clone)]
pub struct GcpCredentials {
    source: TokenSource,
    /// Which input produced these credentials
    origin: &'static str,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    /// When this token expires (with buffer applied)
    expires_at: Instant,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

impl GcpCredentials {
    /// Credentials backed by a fixed access token
    pub fn from_static(token: impl Into<String>) -> Self {
        Self::with_source(TokenSource::Static(token.into()), CHECKED_ACCESS_TOKEN)
    }

    fn with_source(source: TokenSource, origin: &'static str) -> Self {
        Self {
            source,
            origin,
            token_cache: Arc::new(RwLock::new(None)),
        }
    }

    /// Walk the fallback chain. Fails with an authentication error naming
    /// every input that was checked.
    pub async fn resolve(input: &GcpCredentialInput) -> Result<Self, DiscoveryError> {
        let mut checked: Vec<String> = Vec::new();

        if let Some(token) = input.access_token.as_deref() {
            return Ok(Self::from_static(token));
        }
        checked.push(CHECKED_ACCESS_TOKEN.to_string());

        if let Some(path) = input.key_file.as_ref() {
            match CustomServiceAccount::from_file(path) {
                Ok(account) => {
                    let provider: Arc<dyn TokenProvider> = Arc::new(account);
                    return Ok(Self::with_source(TokenSource::Provider(provider), CHECKED_KEY_FILE));
                },
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Unusable service account key file");
                    checked.push(format!("{} ({})", CHECKED_KEY_FILE, path.display()));
                },
            }
        } else {
            checked.push(CHECKED_KEY_FILE.to_string());
        }

        match gcp_auth::provider().await {
            Ok(provider) => Ok(Self::with_source(TokenSource::Provider(provider), CHECKED_ADC)),
            Err(e) => {
                tracing::debug!(error = %e, "Application default credentials unavailable");
                checked.push(CHECKED_ADC.to_string());
                Err(DiscoveryError::authentication(
                    "no GCP credentials found. Set credentials.access_token or credentials.key_file, or run 'gcloud auth application-default login'",
                    checked,
                ))
            },
        }
    }

    pub fn origin(&self) -> &'static str {
        self.origin
    }

    /// Project id known to the credential source, if any
    pub async fn project_id(&self) -> Option<String> {
        match &self.source {
            TokenSource::Static(_) => None,
            TokenSource::Provider(provider) => provider.project_id().await.ok().map(|p| p.to_string()),
        }
    }

    /// Get an access token for API calls.
    ///
    /// Failure is an authentication error and aborts the run.
    pub async fn get_token(&self) -> Result<String> {
        let provider = match &self.source {
            TokenSource::Static(token) => return Ok(token.clone()),
            TokenSource::Provider(provider) => provider,
        };

        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_valid() {
                    return Ok(cached.token.clone());
                }
                tracing::debug!("Cached token expired, fetching new token");
            }
        }

        let token = provider.token(DEFAULT_SCOPES).await.map_err(|e| {
            DiscoveryError::authentication(format!("failed to obtain access token: {}", e), [self.origin])
        })?;
        let token_str = token.as_str().to_string();

        let expires_at = Instant::now() + DEFAULT_TOKEN_TTL - TOKEN_EXPIRY_BUFFER;
        {
            let mut cache = self.token_cache.write().await;
            *cache = Some(CachedToken {
                token: token_str.clone(),
                expires_at,
            });
        }

        tracing::debug!(
            "New token cached, expires in ~{} minutes",
            (DEFAULT_TOKEN_TTL - TOKEN_EXPIRY_BUFFER).as_secs() / 60
        );

        Ok(token_str)
    }
}

/// Get the gcloud configuration directory
pub fn get_gcloud_config_dir() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("CLOUDSDK_CONFIG") {
        return Some(PathBuf::from(path));
    }

    // Default to ~/.config/gcloud on Linux/macOS
    dirs::config_dir().map(|p| p.join("gcloud"))
}

/// Validate a GCP project ID format
/// Project IDs must be 6-30 characters, lowercase letters, digits, and hyphens
/// Must start with a letter and cannot end with a hyphen
pub fn validate_project_id(project: &str) -> bool {
    if project.len() < 6 || project.len() > 30 {
        return false;
    }

    match project.chars().next() {
        Some(c) if c.is_ascii_lowercase() => {},
        _ => return false,
    }

    if project.ends_with('-') {
        return false;
    }

    project
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Read `key` from an INI-style gcloud file, optionally inside `[section]`
fn read_gcloud_property(content: &str, section: Option<&str>, key: &str) -> Option<String> {
    let mut in_section = section.is_none();
    for line in content.lines() {
        let line = line.trim();
        // Security: Skip comments and empty lines
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if line.starts_with('[') {
            in_section = section.map(|s| line == format!("[{}]", s)).unwrap_or(true);
            continue;
        }
        if !in_section {
            continue;
        }
        if let Some((k, v)) = line.split_once('=') {
            if k.trim() == key {
                return Some(v.trim().to_string());
            }
        }
    }
    None
}

/// Read the default project from the environment or gcloud configuration
/// Security: Validates project ID format before returning
pub fn get_default_project() -> Option<String> {
    for var in ["CLOUDSDK_CORE_PROJECT", "GOOGLE_CLOUD_PROJECT", "GCLOUD_PROJECT"] {
        if let Ok(project) = std::env::var(var) {
            if validate_project_id(&project) {
                return Some(project);
            }
            tracing::warn!("Invalid project ID format in {}", var);
        }
    }

    let config_dir = get_gcloud_config_dir()?;

    if let Ok(content) = std::fs::read_to_string(config_dir.join("properties")) {
        if let Some(project) = read_gcloud_property(&content, None, "project") {
            if validate_project_id(&project) {
                return Some(project);
            }
        }
    }

    let active_config = std::fs::read_to_string(config_dir.join("active_config")).ok()?;
    let config_name = active_config.trim();

    // Security: Validate config name to prevent path traversal
    if !config_name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        tracing::warn!("Invalid characters in active_config name");
        return None;
    }

    let config_path = config_dir
        .join("configurations")
        .join(format!("config_{}", config_name));
    let content = std::fs::read_to_string(config_path).ok()?;

    read_gcloud_property(&content, Some("core"), "project").filter(|p| validate_project_id(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_project_id() {
        assert!(validate_project_id("my-project-123"));
        assert!(!validate_project_id("short"));
        assert!(!validate_project_id("1starts-with-digit"));
        assert!(!validate_project_id("ends-with-hyphen-"));
        assert!(!validate_project_id("Has-Upper-Case"));
    }

    #[test]
    fn test_read_gcloud_property_respects_sections() {
        let content = "\
# comment
[compute]
zone = us-central1-a
project = wrong-section

[core]
account = me@example.com
project = right-project
";
        assert_eq!(
            read_gcloud_property(content, Some("core"), "project").as_deref(),
            Some("right-project")
        );
        assert_eq!(
            read_gcloud_property(content, Some("compute"), "zone").as_deref(),
            Some("us-central1-a")
        );
        assert_eq!(read_gcloud_property(content, Some("core"), "zone"), None);
    }

    #[tokio::test]
    async fn test_static_token_wins_first() {
        let input = GcpCredentialInput {
            access_token: Some("ya29.static".to_string()),
            key_file: Some(PathBuf::from("/does/not/exist.json")),
        };
        let credentials = GcpCredentials::resolve(&input).await.unwrap();
        assert_eq!(credentials.origin(), CHECKED_ACCESS_TOKEN);
        assert_eq!(credentials.get_token().await.unwrap(), "ya29.static");
        assert_eq!(credentials.project_id().await, None);
    }
}
