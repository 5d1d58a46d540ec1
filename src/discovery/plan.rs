//! Service catalog and per-run service plan

use crate::driver::DiscoveryFilter;

/// Tagged set of services a driver knows how to collect.
///
/// Parsing never fails: names without a collector map to a catch-all
/// variant that the driver answers with "no collector", and the
/// orchestrator skips it with a warning.
pub trait ServiceKind: Clone + Send + Sync + 'static {
    fn parse(name: &str) -> Self;

    fn name(&self) -> &str;

    /// Every implemented service, in default collection order
    fn catalog() -> Vec<Self>;
}

/// Effective, ordered service list for one run.
///
/// `configured` is the driver's stored list (`None` = full catalog). The
/// call-time filter is applied on top; exclude always wins. Filter entries
/// are parsed like configured names, so aliases and case variants match.
pub fn resolve_plan<S: ServiceKind>(configured: Option<&[String]>, filter: &DiscoveryFilter) -> Vec<S> {
    let candidates: Vec<S> = match configured {
        Some(names) => names.iter().map(|n| S::parse(n.trim())).collect(),
        None => S::catalog(),
    };
    let filter = canonical_filter::<S>(filter);

    let mut seen: Vec<String> = Vec::new();
    candidates
        .into_iter()
        .filter(|s| {
            if seen.iter().any(|n| n == s.name()) {
                return false;
            }
            seen.push(s.name().to_string());
            filter.allows(s.name())
        })
        .collect()
}

fn canonical_filter<S: ServiceKind>(filter: &DiscoveryFilter) -> DiscoveryFilter {
    let canonical = |names: &[String]| -> Vec<String> {
        names
            .iter()
            .map(|n| S::parse(n.trim()).name().to_string())
            .collect()
    };
    DiscoveryFilter {
        include: canonical(&filter.include),
        exclude: canonical(&filter.exclude),
    }
}
