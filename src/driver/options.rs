//! Per-call options for `list_resources`

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::sync::Arc;

/// Call-time service filter. Never mutates the driver's stored configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryFilter {
    /// Accepts a single string or a list of strings
    #[serde(default, deserialize_with = "one_or_many")]
    pub include: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub exclude: Vec<String>,
}

impl DiscoveryFilter {
    pub fn include<I, S>(mut self, services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include.extend(services.into_iter().map(Into::into));
        self
    }

    pub fn exclude<I, S>(mut self, services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude.extend(services.into_iter().map(Into::into));
        self
    }

    /// Exclude always wins over include
    pub fn allows(&self, service: &str) -> bool {
        if self.exclude.iter().any(|s| s == service) {
            return false;
        }
        self.include.is_empty() || self.include.iter().any(|s| s == service)
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(s)) => vec![s],
        Some(OneOrMany::Many(v)) => v,
    })
}

/// Progress record emitted once per yielded resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressInfo {
    pub service: String,
    pub resource_id: String,
    pub resource_type: String,
}

pub type ProgressSink = Arc<dyn Fn(&ProgressInfo) + Send + Sync>;

/// Runtime side channels for one run
#[derive(Clone, Default)]
pub struct RuntimeOptions {
    pub emit_progress: Option<ProgressSink>,
}

impl fmt::Debug for RuntimeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeOptions")
            .field("emit_progress", &self.emit_progress.is_some())
            .finish()
    }
}

/// Input to [`Driver::list_resources`](super::Driver::list_resources)
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub discovery: DiscoveryFilter,
    pub runtime: RuntimeOptions,
}

impl ListOptions {
    pub fn with_filter(mut self, discovery: DiscoveryFilter) -> Self {
        self.discovery = discovery;
        self
    }

    pub fn with_progress(mut self, sink: ProgressSink) -> Self {
        self.runtime.emit_progress = Some(sink);
        self
    }
}
