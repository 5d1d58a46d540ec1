//! Service collector building blocks
//!
//! Collectors are lazy streams of normalized resources. The helpers here
//! carry the two nested isolation rules: a failing region does not stop the
//! other regions, and a failing child listing does not retract its parent.

use super::report;
use crate::driver::DriverLogger;
use crate::error::{into_fatal, DiscoveryError};
use crate::resource::NormalizedResource;
use anyhow::{anyhow, Result};
use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::Value;
use std::future::Future;

/// Stream produced by one service collector
pub type CollectorStream<'a> = BoxStream<'a, Result<NormalizedResource>>;

/// One page of a listing call
#[derive(Debug, Clone, Default)]
pub struct PaginatedResult {
    pub items: Vec<Value>,
    pub next_token: Option<String>,
}

/// Lazily walk every page of a listing. `fetch_page` receives the token of
/// the page to fetch (`None` for the first one).
pub fn paginate<'a, F, Fut>(mut fetch_page: F) -> BoxStream<'a, Result<Value>>
where
    F: FnMut(Option<String>) -> Fut + Send + 'a,
    Fut: Future<Output = Result<PaginatedResult>> + Send + 'a,
{
    Box::pin(async_stream::try_stream! {
        let mut page_token: Option<String> = None;

        loop {
            let result = fetch_page(page_token.clone()).await?;
            for item in result.items {
                yield item;
            }

            match result.next_token {
                Some(next) if !next.is_empty() => {
                    if page_token.as_deref() == Some(next.as_str()) {
                        Err::<(), _>(anyhow!("pagination token '{}' repeated", next))?;
                    }
                    page_token = Some(next);
                },
                _ => break,
            }
        }
    })
}

/// Collect `regions` one after another. A non-fatal failure in one region is
/// reported and the next region is collected; fatal errors end the stream.
pub fn per_region<'a, F>(
    logger: &'a DriverLogger,
    service: &'a str,
    regions: Vec<String>,
    mut collect: F,
) -> CollectorStream<'a>
where
    F: FnMut(String) -> CollectorStream<'a> + Send + 'a,
{
    Box::pin(async_stream::stream! {
        for region in regions {
            let mut items = collect(region.clone());

            while let Some(item) = items.next().await {
                match item {
                    Ok(resource) => {
                        yield Ok(resource);
                    },
                    Err(err) => {
                        match into_fatal(err) {
                            Ok(fatal) => {
                                yield Err(fatal.into());
                                return;
                            },
                            Err(source) => {
                                report(logger, &DiscoveryError::ServiceCollection {
                                    service: service.to_string(),
                                    region: Some(region.clone()),
                                    source,
                                });
                                break;
                            },
                        }
                    },
                }
            }
        }
    })
}

/// Drain the children of an already yielded parent. A non-fatal failure is
/// reported as a child expansion error and ends only this child listing.
pub fn expand_children<'a>(
    logger: &'a DriverLogger,
    service: &'a str,
    parent_id: String,
    children: CollectorStream<'a>,
) -> CollectorStream<'a> {
    Box::pin(async_stream::stream! {
        let mut children = children;

        while let Some(item) = children.next().await {
            match item {
                Ok(child) => {
                    yield Ok(child);
                },
                Err(err) => {
                    match into_fatal(err) {
                        Ok(fatal) => {
                            yield Err(fatal.into());
                        },
                        Err(source) => {
                            report(logger, &DiscoveryError::ChildExpansion {
                                service: service.to_string(),
                                parent_id: parent_id.clone(),
                                source,
                            });
                        },
                    }
                    break;
                },
            }
        }
    })
}

/// Fetch each child of an already yielded parent on its own. Every
/// non-fatal failure is reported as a child expansion error and the
/// remaining children are still fetched.
pub fn expand_each<'a, T, F, Fut>(
    logger: &'a DriverLogger,
    service: &'a str,
    parent_id: String,
    children: Vec<T>,
    mut fetch: F,
) -> CollectorStream<'a>
where
    T: Send + 'a,
    F: FnMut(T) -> Fut + Send + 'a,
    Fut: Future<Output = Result<NormalizedResource>> + Send + 'a,
{
    Box::pin(async_stream::stream! {
        for child in children {
            match fetch(child).await {
                Ok(resource) => {
                    yield Ok(resource);
                },
                Err(err) => match into_fatal(err) {
                    Ok(fatal) => {
                        yield Err(fatal.into());
                        return;
                    },
                    Err(source) => {
                        report(logger, &DiscoveryError::ChildExpansion {
                            service: service.to_string(),
                            parent_id: parent_id.clone(),
                            source,
                        });
                    },
                },
            }
        }
    })
}
