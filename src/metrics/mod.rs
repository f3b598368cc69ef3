pub mod registry;

pub use registry::MetricsRegistry;

use std::fmt;

use crate::probe::ProberKind;
use crate::probe::error::ErrorCategory;

/// Request phases with their own latency histogram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    Dns,
    Connect,
    Tls,
    GotConn,
    FirstByte,
    Total,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::Dns,
        Phase::Connect,
        Phase::Tls,
        Phase::GotConn,
        Phase::FirstByte,
        Phase::Total,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Dns => "dns",
            Phase::Connect => "connect",
            Phase::Tls => "tls",
            Phase::GotConn => "got_conn",
            Phase::FirstByte => "first_byte",
            Phase::Total => "total",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of the destination a measurement belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeLabels<'a> {
    pub domain: &'a str,
    pub tag: &'a str,
    pub prober: ProberKind,
}

/// Receiver for probe measurements. Implementations are shared by every
/// prober task and must accept concurrent calls.
pub trait MetricsSink: Send + Sync {
    fn observe_latency(&self, phase: Phase, labels: &ProbeLabels<'_>, seconds: f64);

    /// `status_code` is empty when no status is available (TCP, failed probes).
    fn inc_requests(&self, labels: &ProbeLabels<'_>, status_code: &str);

    fn inc_errors(&self, labels: &ProbeLabels<'_>, category: ErrorCategory);
}
