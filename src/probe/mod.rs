pub mod error;
pub mod retry;
pub mod schedule;
pub mod tcp;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::info;
use tokio_util::sync::CancellationToken;
use tokio_util::task::task_tracker::TaskTrackerToken;

use crate::config::model::Endpoint;
use crate::metrics::{MetricsSink, ProbeLabels};
use schedule::{Schedule, run_loop};

/// The kinds of check a prober can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProberKind {
    Tcp,
    HttpTrace,
}

impl ProberKind {
    /// Name used in configuration files.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProberKind::Tcp => "tcp",
            ProberKind::HttpTrace => "httpTrace",
        }
    }

    /// Value of the `proberType` metric label.
    pub fn label(&self) -> &'static str {
        match self {
            ProberKind::Tcp => "tcp",
            ProberKind::HttpTrace => "httptrace",
        }
    }
}

impl fmt::Display for ProberKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown prober type {0:?}, expected one of ['tcp', 'httpTrace']")]
pub struct UnknownProberKind(pub String);

impl FromStr for ProberKind {
    type Err = UnknownProberKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(ProberKind::Tcp),
            "httpTrace" => Ok(ProberKind::HttpTrace),
            other => Err(UnknownProberKind(other.to_string())),
        }
    }
}

/// Settings and collaborators shared by every prober variant.
///
/// Holds a completion token of the owning agent: the agent's wait returns once
/// every config (and so every prober) has been dropped.
pub struct ProberConfig {
    pub endpoint: String,
    pub tag: String,
    pub retries: u32,
    pub interval: Duration,
    pub one_off: bool,
    pub reuse_connection: bool,
    pub skip_tls_verify: bool,
    pub tcp_timeout: Duration,
    pub metrics: Arc<dyn MetricsSink>,
    _completion: TaskTrackerToken,
}

impl ProberConfig {
    pub fn new(endpoint: &Endpoint, metrics: Arc<dyn MetricsSink>, completion: TaskTrackerToken) -> Self {
        ProberConfig {
            endpoint: endpoint.uri.clone(),
            tag: endpoint.tag.clone(),
            retries: endpoint.retries,
            interval: endpoint.interval,
            one_off: endpoint.one_off,
            reuse_connection: endpoint.reuse_connection,
            skip_tls_verify: endpoint.skip_tls_verify,
            tcp_timeout: endpoint.tcp_timeout,
            metrics,
            _completion: completion,
        }
    }

    pub fn schedule(&self) -> Schedule {
        Schedule {
            interval: self.interval,
            one_off: self.one_off,
        }
    }

    pub fn labels(&self, prober: ProberKind) -> ProbeLabels<'_> {
        ProbeLabels {
            domain: &self.endpoint,
            tag: &self.tag,
            prober,
        }
    }

    pub(crate) fn describe(&self, f: &mut fmt::Formatter<'_>, kind: &str) -> fmt::Result {
        write!(
            f,
            "{} prober endpoint: {} - interval: {:?} - tag: {} - retries: {}",
            kind, self.endpoint, self.interval, self.tag, self.retries
        )
    }
}

impl fmt::Debug for ProberConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProberConfig")
            .field("endpoint", &self.endpoint)
            .field("tag", &self.tag)
            .field("retries", &self.retries)
            .field("interval", &self.interval)
            .field("one_off", &self.one_off)
            .field("reuse_connection", &self.reuse_connection)
            .field("skip_tls_verify", &self.skip_tls_verify)
            .field("tcp_timeout", &self.tcp_timeout)
            .finish_non_exhaustive()
    }
}

/// A repeating network check against a single destination.
#[async_trait]
pub trait Prober: fmt::Display + Send + Sync {
    fn kind(&self) -> ProberKind;

    fn config(&self) -> &ProberConfig;

    /// One probe: the check with its retries, followed by metric reporting.
    async fn probe(&self, cancel: &CancellationToken);
}

/// Runs a prober until its schedule completes or `cancel` fires, then drops it,
/// which signals completion to the owning agent.
pub async fn run(prober: Box<dyn Prober>, cancel: CancellationToken) {
    let name = prober.to_string();
    let schedule = prober.config().schedule();
    let probe_ref: &dyn Prober = prober.as_ref();
    let cancel_ref = &cancel;

    run_loop(&name, schedule, cancel_ref, move || probe_ref.probe(cancel_ref)).await;

    drop(prober);
    info!("{}: stopped", name);
}
