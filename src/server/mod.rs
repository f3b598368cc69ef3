pub mod handlers;

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use hyper::Request;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use hyper_util::server::graceful::GracefulShutdown;
use log::{debug, info, warn};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::model::Endpoint;
use crate::metrics::MetricsRegistry;

/// Time in-flight requests get to finish once shutdown starts.
pub const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Everything the endpoints read from.
#[derive(Debug)]
pub struct ServerState {
    pub registry: Arc<MetricsRegistry>,
    pub endpoints: Vec<Endpoint>,
    pub max_payload_size: usize,
}

/// Serves `/metrics`, `/live`, `/ready`, `/latency` and `/status` until
/// `shutdown` fires, then drains open connections for at most
/// [`SHUTDOWN_GRACE_PERIOD`].
pub async fn serve(listener: TcpListener, state: Arc<ServerState>, shutdown: CancellationToken) {
    let graceful = GracefulShutdown::new();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        warn!("Failed to accept connection: {}", err);
                        continue;
                    }
                };

                let state = state.clone();
                let service = service_fn(move |req: Request<Incoming>| {
                    let response = handlers::route(&state, &req);
                    async move { Ok::<_, Infallible>(response) }
                });

                let conn = graceful.watch(http1::Builder::new().serve_connection(TokioIo::new(stream), service));
                tokio::spawn(async move {
                    if let Err(err) = conn.await {
                        debug!("Connection from {} closed with error: {}", peer, err);
                    }
                });
            }
        }
    }

    drop(listener);
    info!("HTTP server stopped accepting connections");

    tokio::select! {
        _ = graceful.shutdown() => info!("HTTP server stopped"),
        _ = tokio::time::sleep(SHUTDOWN_GRACE_PERIOD) => {
            warn!("HTTP server shutdown timed out after {:?}", SHUTDOWN_GRACE_PERIOD)
        }
    }
}
