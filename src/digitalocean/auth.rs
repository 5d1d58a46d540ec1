//! DigitalOcean token resolution
//!
//! Fallback chain: a static `token`, a named doctl auth `context`, then the
//! `DIGITALOCEAN_TOKEN` / `DIGITALOCEAN_ACCESS_TOKEN` environment variables.

use crate::error::DiscoveryError;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

pub const CHECKED_TOKEN: &str = "credentials.token";
pub const CHECKED_CONTEXT: &str = "credentials.context";
pub const ENV_VARS: &[&str] = &["DIGITALOCEAN_TOKEN", "DIGITALOCEAN_ACCESS_TOKEN"];

/// Credential inputs taken from the driver's `credentials` map
#[derive(Debug, Clone, Default)]
pub struct DoCredentialInput {
    pub token: Option<String>,
    pub context: Option<String>,
    /// doctl config override, defaults to [`doctl_config_path`]
    pub config_file: Option<PathBuf>,
}

/// An API token plus where it came from
#[derive(Clone)]
pub struct ResolvedToken {
    pub token: String,
    pub origin: String,
}

impl fmt::Debug for ResolvedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedToken")
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

/// Subset of doctl's `config.yaml`
#[derive(Debug, Default, Deserialize)]
struct DoctlConfig {
    #[serde(default, rename = "access-token")]
    access_token: Option<String>,
    #[serde(default, rename = "auth-contexts")]
    auth_contexts: HashMap<String, String>,
}

/// Default doctl configuration file
pub fn doctl_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("doctl").join("config.yaml"))
}

/// Token stored for `context` in a doctl config. `default` maps to the
/// top-level `access-token`.
fn read_context_token(content: &str, context: &str) -> Result<Option<String>> {
    let config: DoctlConfig = serde_yaml::from_str(content).context("Failed to parse doctl config")?;

    let token = if context == "default" {
        config.access_token
    } else {
        config.auth_contexts.get(context).cloned()
    };
    Ok(token.filter(|t| !t.trim().is_empty()))
}

fn context_token(path: &Path, context: &str) -> Result<Option<String>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    read_context_token(&content, context)
}

/// Walk the fallback chain. `env` looks up environment variables.
pub fn resolve_token<F>(input: &DoCredentialInput, env: F) -> Result<ResolvedToken, DiscoveryError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut checked: Vec<String> = Vec::new();

    if let Some(token) = input.token.as_deref() {
        return Ok(ResolvedToken {
            token: token.to_string(),
            origin: CHECKED_TOKEN.to_string(),
        });
    }
    checked.push(CHECKED_TOKEN.to_string());

    match input.context.as_deref() {
        Some(context) => {
            let path = input.config_file.clone().or_else(doctl_config_path);
            let label = format!("{} ({})", CHECKED_CONTEXT, context);

            match path.as_deref().map(|p| context_token(p, context)) {
                Some(Ok(Some(token))) => {
                    return Ok(ResolvedToken { token, origin: label });
                },
                Some(Ok(None)) => {
                    tracing::warn!(context, "doctl context has no token");
                },
                Some(Err(e)) => {
                    tracing::warn!(context, error = %e, "Unusable doctl config");
                },
                None => {
                    tracing::warn!("Could not determine the doctl config directory");
                },
            }
            checked.push(label);
        },
        None => checked.push(CHECKED_CONTEXT.to_string()),
    }

    for var in ENV_VARS {
        if let Some(token) = env(var).filter(|t| !t.trim().is_empty()) {
            return Ok(ResolvedToken {
                token,
                origin: (*var).to_string(),
            });
        }
        checked.push((*var).to_string());
    }

    Err(DiscoveryError::authentication(
        "no DigitalOcean token found. Set credentials.token, credentials.context or DIGITALOCEAN_TOKEN",
        checked,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const DOCTL_CONFIG: &str = "\
access-token: dop_v1_default
auth-contexts:
  staging: dop_v1_staging
  empty: \"\"
context: default
";

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_static_token_wins() {
        let input = DoCredentialInput {
            token: Some("dop_v1_static".into()),
            context: Some("staging".into()),
            config_file: None,
        };
        let resolved = resolve_token(&input, |_| Some("env".into())).unwrap();
        assert_eq!(resolved.token, "dop_v1_static");
        assert_eq!(resolved.origin, CHECKED_TOKEN);
    }

    #[test]
    fn test_context_lookup() {
        assert_eq!(
            read_context_token(DOCTL_CONFIG, "staging").unwrap().as_deref(),
            Some("dop_v1_staging")
        );
        assert_eq!(
            read_context_token(DOCTL_CONFIG, "default").unwrap().as_deref(),
            Some("dop_v1_default")
        );
        assert_eq!(read_context_token(DOCTL_CONFIG, "empty").unwrap(), None);
        assert_eq!(read_context_token(DOCTL_CONFIG, "missing").unwrap(), None);
    }

    #[test]
    fn test_context_from_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(DOCTL_CONFIG.as_bytes()).unwrap();

        let input = DoCredentialInput {
            token: None,
            context: Some("staging".into()),
            config_file: Some(file.path().to_path_buf()),
        };
        let resolved = resolve_token(&input, no_env).unwrap();
        assert_eq!(resolved.token, "dop_v1_staging");
        assert!(resolved.origin.contains("staging"));
    }

    #[test]
    fn test_missing_context_falls_through_to_env() {
        let input = DoCredentialInput {
            token: None,
            context: Some("prod".into()),
            config_file: Some(PathBuf::from("/does/not/exist/config.yaml")),
        };
        let resolved = resolve_token(&input, |var| {
            (var == "DIGITALOCEAN_ACCESS_TOKEN").then(|| "dop_v1_env".to_string())
        })
        .unwrap();
        assert_eq!(resolved.token, "dop_v1_env");
        assert_eq!(resolved.origin, "DIGITALOCEAN_ACCESS_TOKEN");
    }

    #[test]
    fn test_nothing_found_names_every_input() {
        let err = resolve_token(&DoCredentialInput::default(), no_env).unwrap_err();
        match err {
            DiscoveryError::Authentication { checked, .. } => {
                assert_eq!(
                    checked,
                    vec![
                        CHECKED_TOKEN,
                        CHECKED_CONTEXT,
                        "DIGITALOCEAN_TOKEN",
                        "DIGITALOCEAN_ACCESS_TOKEN"
                    ]
                );
            },
            other => panic!("unexpected error: {other}"),
        }
    }
}
