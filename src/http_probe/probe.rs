use std::fmt;

use async_trait::async_trait;
use log::error;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::client::TraceClient;
use super::resolver::Resolver;
use super::trace::TracePoint;
use crate::probe::error::{ProbeError, categorize, report};
use crate::probe::retry::retry_with_backoff;
use crate::probe::{Prober, ProberConfig, ProberKind};

/// Issues a GET against the endpoint and measures every phase of the request.
pub struct HttpTraceProber {
    config: ProberConfig,
    resolver: Resolver,
    /// Long-lived client, only when connections are reused.
    client: Option<TraceClient>,
}

impl HttpTraceProber {
    pub fn new(config: ProberConfig, resolver: Resolver) -> Result<Self, ProbeError> {
        let client = if config.reuse_connection {
            Some(Self::build_client(&config, &resolver)?)
        } else {
            None
        };

        Ok(HttpTraceProber {
            config,
            resolver,
            client,
        })
    }

    fn build_client(config: &ProberConfig, resolver: &Resolver) -> Result<TraceClient, ProbeError> {
        TraceClient::new(
            resolver.clone(),
            config.reuse_connection,
            config.skip_tls_verify,
            config.tcp_timeout,
        )
    }

    /// One traced request. Without connection reuse every call gets its own client.
    async fn trace(&self) -> Result<TracePoint, ProbeError> {
        let url = Url::parse(&self.config.endpoint)
            .map_err(|e| ProbeError::invalid_target(self.config.endpoint.as_str(), e))?;

        let fresh;
        let client = match &self.client {
            Some(client) => client,
            None => {
                fresh = Self::build_client(&self.config, &self.resolver)?;
                &fresh
            }
        };

        let mut trace = TracePoint::new();
        let status = client.get(&url, &mut trace).await;
        trace.total_done();

        let status = status?;
        trace.set_status_code(status.as_u16());
        if let Some(err) = trace.take_error() {
            return Err(err);
        }

        trace.compute_durations();
        Ok(trace)
    }
}

impl fmt::Display for HttpTraceProber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.config.describe(f, "httpTrace")
    }
}

#[async_trait]
impl Prober for HttpTraceProber {
    fn kind(&self) -> ProberKind {
        ProberKind::HttpTrace
    }

    fn config(&self) -> &ProberConfig {
        &self.config
    }

    async fn probe(&self, cancel: &CancellationToken) {
        let result = retry_with_backoff(self.config.retries, cancel, &self.config.endpoint, move || self.trace()).await;

        let labels = self.config.labels(ProberKind::HttpTrace);
        let metrics = &self.config.metrics;

        match result {
            Ok(trace) => {
                for (phase, seconds) in trace.observations() {
                    metrics.observe_latency(phase, &labels, seconds);
                }
                let status = trace.status_code().map(|code| code.to_string()).unwrap_or_default();
                metrics.inc_requests(&labels, &status);
            }
            Err(err) => {
                error!("{} failed after {} attempts: {}", self, self.config.retries, report(&err));
                metrics.inc_requests(&labels, "");
                metrics.inc_errors(&labels, categorize(Some(&err)));
            }
        }
    }
}
