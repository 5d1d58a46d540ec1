//! Discovery orchestrator
//!
//! Walks a run's service plan, isolates each service's failure, and
//! concatenates every collector's output into one stream. Services are
//! visited in plan order; within a service the collector decides the order.

use super::collector::CollectorStream;
use super::plan::ServiceKind;
use super::report;
use crate::driver::{DriverLogger, ProgressInfo, ResourceStream, RuntimeOptions};
use crate::error::{into_fatal, DiscoveryError};
use crate::resource::NormalizedResource;
use futures::StreamExt;
use serde_json::json;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// State of one `list_resources` call. Created per call, dropped with the
/// stream.
pub struct DiscoveryRun<'a> {
    logger: &'a DriverLogger,
    runtime: RuntimeOptions,
    concurrency: usize,
}

#[derive(Debug, Default)]
struct RunStats {
    services: usize,
    failed: usize,
    skipped: usize,
    resources: usize,
}

/// Everything one service produced before it finished or failed
struct ServiceBatch {
    resources: Vec<NormalizedResource>,
    error: Option<anyhow::Error>,
}

async fn drain(mut items: CollectorStream<'_>) -> ServiceBatch {
    let mut resources = Vec::new();
    while let Some(item) = items.next().await {
        match item {
            Ok(resource) => resources.push(resource),
            Err(err) => {
                return ServiceBatch {
                    resources,
                    error: Some(err),
                }
            },
        }
    }
    ServiceBatch {
        resources,
        error: None,
    }
}

impl<'a> DiscoveryRun<'a> {
    pub fn new(logger: &'a DriverLogger, runtime: RuntimeOptions) -> Self {
        Self {
            logger,
            runtime,
            concurrency: 1,
        }
    }

    /// Collect up to `n` services at once. Output stays in plan order.
    pub fn with_concurrency(mut self, n: usize) -> Self {
        self.concurrency = n.max(1);
        self
    }

    /// Run `collect` for every service in `plan`. `collect` returns `None`
    /// for services without a collector; those are skipped with a warning.
    pub fn execute<S, F>(self, plan: Vec<S>, collect: F) -> ResourceStream<'a>
    where
        S: ServiceKind,
        F: Fn(&S) -> Option<CollectorStream<'a>> + Send + Sync + 'a,
    {
        if self.concurrency > 1 {
            return self.execute_buffered(plan, collect);
        }

        Box::pin(async_stream::stream! {
            let mut stats = RunStats::default();

            for service in plan {
                let Some(mut items) = collect(&service) else {
                    self.skip_unknown(service.name(), &mut stats);
                    continue;
                };

                self.logger.debug("Collecting service", json!({ "service": service.name() }));
                stats.services += 1;

                while let Some(item) = items.next().await {
                    match item {
                        Ok(resource) => {
                            self.emit_progress(service.name(), &resource);
                            stats.resources += 1;
                            yield Ok(resource);
                        },
                        Err(err) => {
                            if let Some(fatal) = self.absorb(service.name(), err, &mut stats) {
                                yield Err(fatal);
                                return;
                            }
                            break;
                        },
                    }
                }
            }

            self.finish(&stats);
        })
    }

    fn execute_buffered<S, F>(self, plan: Vec<S>, collect: F) -> ResourceStream<'a>
    where
        S: ServiceKind,
        F: Fn(&S) -> Option<CollectorStream<'a>> + Send + Sync + 'a,
    {
        Box::pin(async_stream::stream! {
            let mut stats = RunStats::default();
            let collect = &collect;

            let mut batches = futures::stream::iter(plan)
                .map(move |service| {
                    let items = collect(&service);
                    async move {
                        let batch = match items {
                            Some(items) => Some(drain(items).await),
                            None => None,
                        };
                        (service, batch)
                    }
                })
                .buffered(self.concurrency);

            while let Some((service, batch)) = batches.next().await {
                let Some(batch) = batch else {
                    self.skip_unknown(service.name(), &mut stats);
                    continue;
                };
                stats.services += 1;

                for resource in batch.resources {
                    self.emit_progress(service.name(), &resource);
                    stats.resources += 1;
                    yield Ok(resource);
                }

                if let Some(err) = batch.error {
                    if let Some(fatal) = self.absorb(service.name(), err, &mut stats) {
                        yield Err(fatal);
                        return;
                    }
                }
            }

            self.finish(&stats);
        })
    }

    /// Fatal errors are handed back for propagation; anything else is
    /// reported and swallowed.
    fn absorb(&self, service: &str, err: anyhow::Error, stats: &mut RunStats) -> Option<DiscoveryError> {
        match into_fatal(err) {
            Ok(fatal) => {
                self.logger.error(
                    "Discovery aborted",
                    json!({
                        "service": service,
                        "classification": fatal.classification(),
                        "message": fatal.to_string(),
                    }),
                );
                Some(fatal)
            },
            Err(source) => {
                stats.failed += 1;
                report(
                    self.logger,
                    &DiscoveryError::ServiceCollection {
                        service: service.to_string(),
                        region: None,
                        source,
                    },
                );
                None
            },
        }
    }

    fn skip_unknown(&self, service: &str, stats: &mut RunStats) {
        stats.skipped += 1;
        self.logger.warn(
            &format!("No collector for service '{}', skipping", service),
            json!({ "service": service }),
        );
    }

    fn emit_progress(&self, service: &str, resource: &NormalizedResource) {
        let Some(sink) = self.runtime.emit_progress.as_ref() else {
            return;
        };

        let info = ProgressInfo {
            service: service.to_string(),
            resource_id: resource.resource_id.clone(),
            resource_type: resource.resource_type.clone(),
        };
        if catch_unwind(AssertUnwindSafe(|| sink(&info))).is_err() {
            tracing::warn!(service, "Progress sink panicked");
        }
    }

    fn finish(&self, stats: &RunStats) {
        self.logger.info(
            "Discovery finished",
            json!({
                "services": stats.services,
                "failed": stats.failed,
                "skipped": stats.skipped,
                "resources": stats.resources,
            }),
        );
    }
}
