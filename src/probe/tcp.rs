use std::fmt;

use async_trait::async_trait;
use log::error;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use super::error::{ProbeError, categorize, report};
use super::retry::retry_with_backoff;
use super::{Prober, ProberConfig, ProberKind};

/// Checks that a TCP connection to `host:port` can be established.
#[derive(Debug)]
pub struct TcpProber {
    config: ProberConfig,
}

impl TcpProber {
    pub fn new(config: ProberConfig) -> Self {
        TcpProber { config }
    }

    /// Dials the endpoint once and closes the connection straight away.
    async fn dial(&self) -> Result<(), ProbeError> {
        let timeout = self.config.tcp_timeout;
        let stream = tokio::time::timeout(timeout, TcpStream::connect(self.config.endpoint.as_str()))
            .await
            .map_err(|_| ProbeError::Timeout(timeout))?
            .map_err(|e| ProbeError::connect(&self.config.endpoint, e))?;
        drop(stream);
        Ok(())
    }
}

impl fmt::Display for TcpProber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.config.describe(f, "TCP")
    }
}

#[async_trait]
impl Prober for TcpProber {
    fn kind(&self) -> ProberKind {
        ProberKind::Tcp
    }

    fn config(&self) -> &ProberConfig {
        &self.config
    }

    async fn probe(&self, cancel: &CancellationToken) {
        let result = retry_with_backoff(self.config.retries, cancel, &self.config.endpoint, move || self.dial()).await;

        let labels = self.config.labels(ProberKind::Tcp);
        self.config.metrics.inc_requests(&labels, "");

        if let Err(err) = result {
            error!("{} failed after {} attempts: {}", self, self.config.retries, report(&err));
            self.config.metrics.inc_errors(&labels, categorize(Some(&err)));
        }
    }
}
