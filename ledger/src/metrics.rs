//! Metrics for [crate::Ledger].

use prometheus_client::{
    metrics::{counter::Counter, gauge::Gauge},
    registry::Registry,
};

/// Metrics for [crate::Ledger].
#[derive(Default)]
pub struct Metrics {
    /// Blocks confirmed.
    pub confirmed: Counter,
    /// Confirmations that returned an error.
    pub confirm_failures: Counter,
    /// Confirmations that switched the trunk to another branch.
    pub trunk_switches: Counter,
    /// Blocks confirmed onto a branch that is not the trunk.
    pub orphans: Counter,
    /// Truncations performed.
    pub truncations: Counter,
    /// Height of the trunk tip.
    pub trunk_height: Gauge,
    /// Full-block cache hits.
    pub cache_hits: Counter,
    /// Full-block cache misses.
    pub cache_misses: Counter,
}

impl Metrics {
    /// Create and register metrics with the given registry.
    pub fn init(registry: &mut Registry) -> Self {
        let metrics = Self::default();
        registry.register("confirmed", "Blocks confirmed", metrics.confirmed.clone());
        registry.register(
            "confirm_failures",
            "Confirmations that returned an error",
            metrics.confirm_failures.clone(),
        );
        registry.register(
            "trunk_switches",
            "Confirmations that switched the trunk",
            metrics.trunk_switches.clone(),
        );
        registry.register(
            "orphans",
            "Blocks confirmed off the trunk",
            metrics.orphans.clone(),
        );
        registry.register(
            "truncations",
            "Truncations performed",
            metrics.truncations.clone(),
        );
        registry.register(
            "trunk_height",
            "Height of the trunk tip",
            metrics.trunk_height.clone(),
        );
        registry.register(
            "cache_hits",
            "Full-block cache hits",
            metrics.cache_hits.clone(),
        );
        registry.register(
            "cache_misses",
            "Full-block cache misses",
            metrics.cache_misses.clone(),
        );
        metrics
    }
}
