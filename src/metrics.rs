//! Metrics collection and export module

use once_cell::sync::Lazy;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry};

/// Global metrics registry
pub struct Metrics {
    registry: Registry,

    // Counters
    pub operations_submitted: IntCounter,
    pub operations_confirmed: IntCounter,
    pub operations_failed: IntCounter,
    pub operations_timed_out: IntCounter,
    pub simulations_failed: IntCounter,
    pub injection_retries: IntCounter,
    pub rpc_requests_total: IntCounter,
    pub rpc_failures_total: IntCounter,
    pub endpoint_health_transitions: IntCounter,

    // Gauges
    pub inflight_operations: IntGauge,

    // Histograms
    pub build_latency: Histogram,
    pub inject_latency: Histogram,
    pub confirm_latency: Histogram,
}

impl Metrics {
    /// Create new metrics instance
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let operations_submitted = IntCounter::with_opts(Opts::new(
            "operations_submitted_total",
            "Operations entering the orchestrator",
        ))?;

        let operations_confirmed = IntCounter::with_opts(Opts::new(
            "operations_confirmed_total",
            "Operations observed included in a block",
        ))?;

        let operations_failed = IntCounter::with_opts(Opts::new(
            "operations_failed_total",
            "Operations reaching the Failed terminal state",
        ))?;

        let operations_timed_out = IntCounter::with_opts(Opts::new(
            "operations_timed_out_total",
            "Operations whose inclusion was not observed before the deadline",
        ))?;

        let simulations_failed = IntCounter::with_opts(Opts::new(
            "simulations_failed_total",
            "Dry runs rejected by the node",
        ))?;

        let injection_retries = IntCounter::with_opts(Opts::new(
            "injection_retries_total",
            "Injection attempts beyond the first",
        ))?;

        let rpc_requests_total = IntCounter::with_opts(Opts::new(
            "rpc_requests_total",
            "HTTP requests issued to node and indexer endpoints",
        ))?;

        let rpc_failures_total = IntCounter::with_opts(Opts::new(
            "rpc_failures_total",
            "HTTP requests that failed at the transport layer",
        ))?;

        let endpoint_health_transitions = IntCounter::with_opts(Opts::new(
            "endpoint_health_transitions_total",
            "Endpoint health state changes in the registry",
        ))?;

        let inflight_operations = IntGauge::with_opts(Opts::new(
            "inflight_operations",
            "Operations currently between submission and a terminal state",
        ))?;

        let build_latency = Histogram::with_opts(HistogramOpts::new(
            "build_latency_seconds",
            "Time to build, simulate and forge an operation",
        ))?;

        let inject_latency = Histogram::with_opts(HistogramOpts::new(
            "inject_latency_seconds",
            "Time from first injection attempt to an accepted hash",
        ))?;

        let confirm_latency = Histogram::with_opts(HistogramOpts::new(
            "confirm_latency_seconds",
            "Time from injection to observed inclusion",
        ))?;

        registry.register(Box::new(operations_submitted.clone()))?;
        registry.register(Box::new(operations_confirmed.clone()))?;
        registry.register(Box::new(operations_failed.clone()))?;
        registry.register(Box::new(operations_timed_out.clone()))?;
        registry.register(Box::new(simulations_failed.clone()))?;
        registry.register(Box::new(injection_retries.clone()))?;
        registry.register(Box::new(rpc_requests_total.clone()))?;
        registry.register(Box::new(rpc_failures_total.clone()))?;
        registry.register(Box::new(endpoint_health_transitions.clone()))?;
        registry.register(Box::new(inflight_operations.clone()))?;
        registry.register(Box::new(build_latency.clone()))?;
        registry.register(Box::new(inject_latency.clone()))?;
        registry.register(Box::new(confirm_latency.clone()))?;

        Ok(Self {
            registry,
            operations_submitted,
            operations_confirmed,
            operations_failed,
            operations_timed_out,
            simulations_failed,
            injection_retries,
            rpc_requests_total,
            rpc_failures_total,
            endpoint_health_transitions,
            inflight_operations,
            build_latency,
            inject_latency,
            confirm_latency,
        })
    }

    /// Prometheus registry for text exposition
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

static METRICS: Lazy<Metrics> =
    Lazy::new(|| Metrics::new().expect("metrics registry construction"));

/// Process-wide metrics accessor
pub fn metrics() -> &'static Metrics {
    &METRICS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_register_without_collision() {
        let m = Metrics::new().unwrap();
        m.operations_submitted.inc();
        m.inflight_operations.set(2);
        m.build_latency.observe(0.05);
        assert_eq!(m.operations_submitted.get(), 1);
        assert_eq!(m.inflight_operations.get(), 2);
    }

    #[test]
    fn global_accessor_is_stable() {
        let a = metrics() as *const Metrics;
        let b = metrics() as *const Metrics;
        assert_eq!(a, b);
    }

    #[test]
    fn registry_gathers_families() {
        let m = Metrics::new().unwrap();
        m.rpc_requests_total.inc();
        let families = m.registry().gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "rpc_requests_total"));
    }
}
