// Copyright (c) Meridian Contributors
// SPDX-License-Identifier: Apache-2.0

//! Prometheus metrics for the bootstrap pipeline.

use prometheus::{Histogram, HistogramOpts, IntCounter, Opts, Registry};

/// The namespace under which all bootstrap metrics are exported.
pub const METRICS_NAMESPACE: &str = "meridian";

/// Metrics exported by the bootstrap pipeline.
#[derive(Debug, Clone)]
pub struct BootstrapMetricSet {
    /// The total number of shard time ranges requested across attempts.
    pub ranges_requested_total: IntCounter,
    /// The total number of shard time ranges left unfulfilled after exhausting
    /// the chain.
    pub ranges_unfulfilled_total: IntCounter,
    /// The total number of failed peer fetch units.
    pub peer_fetch_errors_total: IntCounter,
    /// The total number of failed incremental flushes. Flush failures are not
    /// propagated as errors, so this counter is their only surfacing.
    pub flush_errors_total: IntCounter,
    /// The total number of filesets that failed validation at read time.
    pub fileset_validation_errors_total: IntCounter,
    /// Time (in seconds) spent per bootstrap attempt.
    pub bootstrap_duration_seconds: Histogram,
}

impl BootstrapMetricSet {
    /// Creates the metric set and registers every metric on `registry`.
    ///
    /// # Panics
    ///
    /// Panics if a metric with the same name is already registered.
    pub fn new(registry: &Registry) -> Self {
        let metrics = Self {
            ranges_requested_total: int_counter(
                "bootstrap_ranges_requested_total",
                "The total number of shard time ranges requested across bootstrap attempts",
            ),
            ranges_unfulfilled_total: int_counter(
                "bootstrap_ranges_unfulfilled_total",
                "The total number of shard time ranges left unfulfilled after the full chain",
            ),
            peer_fetch_errors_total: int_counter(
                "bootstrap_peer_fetch_errors_total",
                "The total number of failed peer fetch units",
            ),
            flush_errors_total: int_counter(
                "bootstrap_flush_errors_total",
                "The total number of failed incremental flushes",
            ),
            fileset_validation_errors_total: int_counter(
                "bootstrap_fileset_validation_errors_total",
                "The total number of filesets that failed validation at read time",
            ),
            bootstrap_duration_seconds: Histogram::with_opts(
                HistogramOpts::new(
                    "bootstrap_duration_seconds",
                    "Time in seconds spent per bootstrap attempt",
                )
                .namespace(METRICS_NAMESPACE)
                .buckets(duration_buckets()),
            )
            .expect("histogram options are valid"),
        };

        for collector in [
            Box::new(metrics.ranges_requested_total.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(metrics.ranges_unfulfilled_total.clone()),
            Box::new(metrics.peer_fetch_errors_total.clone()),
            Box::new(metrics.flush_errors_total.clone()),
            Box::new(metrics.fileset_validation_errors_total.clone()),
            Box::new(metrics.bootstrap_duration_seconds.clone()),
        ] {
            registry
                .register(collector)
                .expect("bootstrap metrics are not yet registered");
        }
        metrics
    }

    /// Creates a metric set on a private registry, for contexts that do not
    /// export metrics (tests, tools).
    pub fn new_unregistered() -> Self {
        Self::new(&Registry::new())
    }
}

fn int_counter(name: &str, help: &str) -> IntCounter {
    IntCounter::with_opts(Opts::new(name, help).namespace(METRICS_NAMESPACE))
        .expect("counter options are valid")
}

/// Buckets from ~250 ms to ~17 minutes; bootstrap attempts are slow
/// operations.
fn duration_buckets() -> Vec<f64> {
    prometheus::exponential_buckets(0.25, 2.0, 12).expect("bucket configuration is valid")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_register_once() {
        let registry = Registry::new();
        let metrics = BootstrapMetricSet::new(&registry);
        metrics.ranges_requested_total.inc_by(3);
        assert_eq!(metrics.ranges_requested_total.get(), 3);
        assert!(!registry.gather().is_empty());
    }
}
