use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use log::{error, info};
use tokio::net::TcpListener;
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;

use crate::agent::Agent;
use crate::config::app_config::{AppConfig, setup_resolver};
use crate::metrics::MetricsRegistry;
use crate::mimir::{client::send_to_mimir, create_registry_metrics};
use crate::probe::error::report;
use crate::server::{self, ServerState};

pub struct App {
    config: AppConfig,
    registry: Arc<MetricsRegistry>,
    agent: Agent,
}

impl App {
    pub fn new(config: AppConfig) -> Result<Self> {
        let resolver = setup_resolver(&config.dns_hosts).context("Failed to set up the DNS resolver")?;
        let registry = Arc::new(MetricsRegistry::new().context("Failed to create the metrics registry")?);
        let agent = Agent::new(&config.endpoints, registry.clone(), &resolver);

        if agent.is_empty() {
            bail!("No prober could be created from the configured endpoints");
        }
        info!("Created {} probers", agent.len());

        Ok(App {
            config,
            registry,
            agent,
        })
    }

    pub async fn start(self) -> Result<()> {
        if self.config.one_off {
            self.start_one_off().await;
            Ok(())
        } else {
            self.start_server().await
        }
    }

    /// Probes until SIGINT or SIGTERM, serving metrics meanwhile.
    async fn start_server(mut self) -> Result<()> {
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.config.app_port));
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind HTTP server to {addr}"))?;

        let cancel = CancellationToken::new();
        self.agent.start(&cancel);

        let state = Arc::new(ServerState {
            registry: self.registry.clone(),
            endpoints: self.config.endpoints.clone(),
            max_payload_size: self.config.max_payload_size,
        });
        let server_shutdown = CancellationToken::new();
        info!("Starting HTTP server on {}", addr);
        let server = tokio::spawn(server::serve(listener, state, server_shutdown.clone()));

        wait_for_shutdown_signal().await?;
        info!("Shutdown signal received");

        cancel.cancel();
        self.agent.wait().await;
        info!("All probers stopped");

        server_shutdown.cancel();
        server.await.context("HTTP server task failed")?;
        Ok(())
    }

    /// Runs every prober once, then pushes the collected metrics.
    async fn start_one_off(mut self) {
        self.agent.start(&CancellationToken::new());
        self.agent.wait().await;
        info!("All probers finished");

        let metrics = create_registry_metrics(&self.registry);
        match send_to_mimir(
            &self.config.mimir_endpoint,
            self.config.mimir_org_id.as_deref(),
            metrics,
        )
        .await
        {
            Ok(()) => info!("Pushed metrics to {}", self.config.mimir_endpoint),
            Err(err) => error!(
                "Failed to push metrics to {}: {}",
                self.config.mimir_endpoint,
                report(&err)
            ),
        }
    }
}

async fn wait_for_shutdown_signal() -> Result<()> {
    let mut sigterm = signal(SignalKind::terminate()).context("Failed to set up SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to set up SIGINT handler")?;

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM"),
        _ = sigint.recv() => info!("Received SIGINT"),
    }
    Ok(())
}
