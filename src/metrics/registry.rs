use std::fmt;

use prometheus::proto::MetricFamily;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder, exponential_buckets};

use super::{MetricsSink, Phase, ProbeLabels};
use crate::probe::error::ErrorCategory;

const BUCKET_START: f64 = 0.00025;
const BUCKET_FACTOR: f64 = 2.0;
const BUCKET_COUNT: usize = 16;

const LATENCY_LABELS: [&str; 3] = ["domain", "tag", "proberType"];
const REQUEST_LABELS: [&str; 4] = ["domain", "tag", "status_code", "proberType"];
const ERROR_LABELS: [&str; 4] = ["domain", "tag", "error", "proberType"];

fn histogram_name(phase: Phase) -> &'static str {
    match phase {
        Phase::Dns => "netsonde_dns_latency_seconds",
        Phase::Connect => "netsonde_conn_latency_seconds",
        Phase::Tls => "netsonde_tls_latency_seconds",
        Phase::GotConn => "netsonde_gotconn_latency_seconds",
        Phase::FirstByte => "netsonde_firstbyte_latency_seconds",
        Phase::Total => "netsonde_total_latency_seconds",
    }
}

fn histogram_help(phase: Phase) -> &'static str {
    match phase {
        Phase::Dns => "DNS lookup latency in seconds",
        Phase::Connect => "TCP connect latency in seconds",
        Phase::Tls => "TLS handshake latency in seconds",
        Phase::GotConn => "Time until a connection was obtained, in seconds",
        Phase::FirstByte => "Time until the first response byte, in seconds",
        Phase::Total => "Total request latency in seconds",
    }
}

/// Process-wide store of probe measurements.
///
/// Created once at startup and shared by every prober through
/// [`MetricsSink`]; read by the `/metrics` endpoint and the one-off flush.
pub struct MetricsRegistry {
    registry: Registry,
    /// One histogram per [`Phase`], in [`Phase::ALL`] order.
    latencies: Vec<HistogramVec>,
    requests: IntCounterVec,
    errors: IntCounterVec,
}

impl fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsRegistry").finish_non_exhaustive()
    }
}

impl MetricsRegistry {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();
        // 0.25ms doubling up to ~8s
        let buckets = exponential_buckets(BUCKET_START, BUCKET_FACTOR, BUCKET_COUNT)?;

        let mut latencies = Vec::with_capacity(Phase::ALL.len());
        for phase in Phase::ALL {
            let opts = HistogramOpts::new(histogram_name(phase), histogram_help(phase)).buckets(buckets.clone());
            let histogram = HistogramVec::new(opts, &LATENCY_LABELS)?;
            registry.register(Box::new(histogram.clone()))?;
            latencies.push(histogram);
        }

        let requests = IntCounterVec::new(
            Opts::new("netsonde_requests_total", "Number of probes run"),
            &REQUEST_LABELS,
        )?;
        registry.register(Box::new(requests.clone()))?;

        let errors = IntCounterVec::new(
            Opts::new("netsonde_errors_total", "Number of probes that failed, by error category"),
            &ERROR_LABELS,
        )?;
        registry.register(Box::new(errors.clone()))?;

        Ok(MetricsRegistry {
            registry,
            latencies,
            requests,
            errors,
        })
    }

    fn latency(&self, phase: Phase) -> &HistogramVec {
        &self.latencies[phase as usize]
    }

    /// Snapshot of every metric that has at least one series.
    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    /// Prometheus text exposition format.
    pub fn render(&self) -> prometheus::Result<String> {
        let mut out = String::new();
        TextEncoder::new().encode_utf8(&self.gather(), &mut out)?;
        Ok(out)
    }
}

impl MetricsSink for MetricsRegistry {
    fn observe_latency(&self, phase: Phase, labels: &ProbeLabels<'_>, seconds: f64) {
        self.latency(phase)
            .with_label_values(&[labels.domain, labels.tag, labels.prober.label()])
            .observe(seconds);
    }

    fn inc_requests(&self, labels: &ProbeLabels<'_>, status_code: &str) {
        self.requests
            .with_label_values(&[labels.domain, labels.tag, status_code, labels.prober.label()])
            .inc();
    }

    fn inc_errors(&self, labels: &ProbeLabels<'_>, category: ErrorCategory) {
        self.errors
            .with_label_values(&[labels.domain, labels.tag, category.as_str(), labels.prober.label()])
            .inc();
    }
}
