//! Discovery engine
//!
//! # Architecture
//!
//! - [`plan`] - Service catalog trait and include/exclude resolution
//! - [`cache`] - Lazy per-driver client cache keyed by region and service
//! - [`collector`] - Pagination, per-region isolation and child expansion
//! - [`orchestrator`] - Runs a plan with per-service fault isolation

pub mod cache;
pub mod collector;
pub mod orchestrator;
pub mod plan;

pub use cache::{CacheStats, ClientCache, ClientKey, ClientScope};
pub use collector::{expand_children, expand_each, paginate, per_region, CollectorStream, PaginatedResult};
pub use orchestrator::DiscoveryRun;
pub use plan::{resolve_plan, ServiceKind};

use crate::driver::DriverLogger;
use crate::error::DiscoveryError;
use crate::http::format_api_error;
use serde_json::{json, Value};

/// Report a non-fatal failure with enough context to diagnose it
pub(crate) fn report(logger: &DriverLogger, err: &DiscoveryError) {
    let mut meta = json!({
        "classification": err.classification(),
        "message": err.to_string(),
    });

    match err {
        DiscoveryError::ServiceCollection {
            service,
            region,
            source,
        } => {
            meta["service"] = Value::from(service.as_str());
            meta["region"] = region.clone().map(Value::from).unwrap_or(Value::Null);
            meta["hint"] = Value::from(format_api_error(source));
            meta["trace"] = Value::from(format!("{:?}", source));
        },
        DiscoveryError::ChildExpansion {
            service,
            parent_id,
            source,
        } => {
            meta["service"] = Value::from(service.as_str());
            meta["parentId"] = Value::from(parent_id.as_str());
            meta["hint"] = Value::from(format_api_error(source));
            meta["trace"] = Value::from(format!("{:?}", source));
        },
        _ => {},
    }

    logger.warn(&err.to_string(), meta);
}
