use std::sync::Arc;

use log::{debug, error};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::model::Endpoint;
use crate::http_probe::HttpTraceProber;
use crate::http_probe::resolver::Resolver;
use crate::metrics::MetricsSink;
use crate::probe::tcp::TcpProber;
use crate::probe::{Prober, ProberConfig, ProberKind, run};

/// Owns one prober per configured endpoint and their shared lifetime.
///
/// Every prober holds a token of the agent's tracker; [`Agent::wait`] returns
/// once all of them have been dropped.
pub struct Agent {
    probers: Vec<Box<dyn Prober>>,
    tracker: TaskTracker,
}

impl Agent {
    /// Endpoints with an unknown prober type, or whose prober cannot be built,
    /// are logged and skipped.
    pub fn new(endpoints: &[Endpoint], metrics: Arc<dyn MetricsSink>, resolver: &Resolver) -> Self {
        let tracker = TaskTracker::new();
        let mut probers: Vec<Box<dyn Prober>> = Vec::with_capacity(endpoints.len());

        for endpoint in endpoints {
            let kind: ProberKind = match endpoint.prober_type.parse() {
                Ok(kind) => kind,
                Err(err) => {
                    error!("Skipping endpoint {}: {}", endpoint.uri, err);
                    continue;
                }
            };

            let config = ProberConfig::new(endpoint, metrics.clone(), tracker.token());
            match kind {
                ProberKind::Tcp => probers.push(Box::new(TcpProber::new(config))),
                ProberKind::HttpTrace => match HttpTraceProber::new(config, resolver.clone()) {
                    Ok(prober) => probers.push(Box::new(prober)),
                    Err(err) => error!("Skipping endpoint {}: {}", endpoint.uri, err),
                },
            }
        }

        Agent { probers, tracker }
    }

    /// Number of probers that have not finished yet.
    pub fn len(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracker.is_empty()
    }

    /// Spawns every prober on the runtime. All of them stop once `cancel` fires.
    pub fn start(&mut self, cancel: &CancellationToken) {
        for prober in self.probers.drain(..) {
            debug!("Spawning {}", prober);
            tokio::spawn(run(prober, cancel.clone()));
        }
    }

    /// Waits for every started prober to finish. Probers that were never
    /// started are dropped.
    pub async fn wait(&mut self) {
        self.probers.clear();
        self.tracker.close();
        self.tracker.wait().await;
    }
}
