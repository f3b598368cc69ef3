use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use hyper::client::conn::http1::{self, SendRequest};
use hyper::header::{HOST, USER_AGENT};
use hyper::{Method, Request, StatusCode};
use hyper_util::rt::TokioIo;
use log::debug;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_native_tls::TlsConnector;
use url::{Host, Position, Url};

use super::resolver::Resolver;
use super::trace::TracePoint;
use crate::probe::error::ProbeError;

const USER_AGENT_VALUE: &str = concat!("netsonde/", env!("CARGO_PKG_VERSION"));

trait Io: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Io for T {}

#[derive(Debug, Default)]
struct FirstByteState {
    armed: bool,
    at: Option<Instant>,
}

/// Remembers when the first response byte of the current request arrived.
#[derive(Debug, Default)]
struct FirstByte {
    state: Mutex<FirstByteState>,
}

impl FirstByte {
    fn lock(&self) -> std::sync::MutexGuard<'_, FirstByteState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn arm(&self) {
        let mut state = self.lock();
        state.armed = true;
        state.at = None;
    }

    fn mark(&self) {
        let mut state = self.lock();
        if state.armed {
            state.armed = false;
            state.at = Some(Instant::now());
        }
    }

    fn take(&self) -> Option<Instant> {
        let mut state = self.lock();
        state.armed = false;
        state.at.take()
    }
}

/// Transport wrapper that timestamps the first bytes read after [`FirstByte::arm`].
struct TracedIo {
    inner: Box<dyn Io>,
    first_byte: Arc<FirstByte>,
}

impl AsyncRead for TracedIo {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let poll = Pin::new(&mut this.inner).poll_read(cx, buf);
        if matches!(poll, Poll::Ready(Ok(()))) && buf.filled().len() > before {
            this.first_byte.mark();
        }
        poll
    }
}

impl AsyncWrite for TracedIo {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

struct Connection {
    sender: SendRequest<Empty<Bytes>>,
    first_byte: Arc<FirstByte>,
}

/// HTTP/1.1 client that reports every step of a request to a [`TracePoint`].
///
/// With `reuse_connection` the client keeps one idle keep-alive connection
/// between requests. Without it every request dials a new connection that is
/// closed once the response has been read.
pub struct TraceClient {
    resolver: Resolver,
    tls: TlsConnector,
    /// Bounds each dial and the TLS handshake.
    dial_timeout: Duration,
    reuse_connection: bool,
    idle: Mutex<Option<Connection>>,
}

impl TraceClient {
    pub fn new(
        resolver: Resolver,
        reuse_connection: bool,
        skip_tls_verify: bool,
        dial_timeout: Duration,
    ) -> Result<Self, ProbeError> {
        let mut builder = native_tls::TlsConnector::builder();
        if skip_tls_verify {
            builder.danger_accept_invalid_certs(true);
            builder.danger_accept_invalid_hostnames(true);
        }
        let tls = builder.build().map_err(|e| ProbeError::Tls(Arc::new(e)))?;

        Ok(TraceClient {
            resolver,
            tls: TlsConnector::from(tls),
            dial_timeout,
            reuse_connection,
            idle: Mutex::new(None),
        })
    }

    /// Issues a GET for `url`, reads the whole body and returns the status.
    pub async fn get(&self, url: &Url, trace: &mut TracePoint) -> Result<StatusCode, ProbeError> {
        let request = build_request(url)?;

        trace.request_start();
        let mut conn = match self.idle_connection().await {
            Some(conn) => conn,
            None => self.connect(url, trace).await?,
        };
        trace.got_conn();

        conn.first_byte.arm();
        let response = conn
            .sender
            .send_request(request)
            .await
            .map_err(|e| ProbeError::Request(Arc::new(e)))?;
        trace.first_byte(conn.first_byte.take().unwrap_or_else(Instant::now));

        let status = response.status();
        response
            .into_body()
            .collect()
            .await
            .map_err(|e| ProbeError::Body(Arc::new(e)))?;

        self.release(conn);
        Ok(status)
    }

    async fn idle_connection(&self) -> Option<Connection> {
        if !self.reuse_connection {
            return None;
        }

        let mut conn = self.idle.lock().unwrap_or_else(PoisonError::into_inner).take()?;
        if conn.sender.is_closed() {
            return None;
        }
        conn.sender.ready().await.ok()?;
        Some(conn)
    }

    fn release(&self, conn: Connection) {
        if self.reuse_connection && !conn.sender.is_closed() {
            *self.idle.lock().unwrap_or_else(PoisonError::into_inner) = Some(conn);
        }
    }

    async fn connect(&self, url: &Url, trace: &mut TracePoint) -> Result<Connection, ProbeError> {
        let host = url
            .host()
            .ok_or_else(|| ProbeError::invalid_target(url.as_str(), "missing host"))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| ProbeError::invalid_target(url.as_str(), "missing port"))?;

        let addrs = match host {
            Host::Ipv4(ip) => vec![SocketAddr::new(ip.into(), port)],
            Host::Ipv6(ip) => vec![SocketAddr::new(ip.into(), port)],
            Host::Domain(domain) => {
                trace.dns_start();
                let resolved = self.resolver.resolve(domain, port).await;
                trace.dns_done(resolved.as_ref().err());
                resolved?
            }
        };

        let stream = self.dial(&addrs, trace).await?;

        let io: Box<dyn Io> = if url.scheme() == "https" {
            let server_name = match host {
                Host::Domain(domain) => domain.to_string(),
                Host::Ipv4(ip) => ip.to_string(),
                Host::Ipv6(ip) => ip.to_string(),
            };
            trace.tls_start();
            let tls = match tokio::time::timeout(self.dial_timeout, self.tls.connect(&server_name, stream)).await {
                Ok(Ok(tls)) => Ok(tls),
                Ok(Err(e)) => Err(ProbeError::Tls(Arc::new(e))),
                Err(_) => Err(ProbeError::Timeout(self.dial_timeout)),
            };
            trace.tls_done(tls.as_ref().err());
            Box::new(tls?)
        } else {
            Box::new(stream)
        };

        let first_byte = Arc::new(FirstByte::default());
        let io = TracedIo {
            inner: io,
            first_byte: first_byte.clone(),
        };

        let (sender, connection) = http1::handshake::<_, Empty<Bytes>>(TokioIo::new(io))
            .await
            .map_err(|e| ProbeError::Request(Arc::new(e)))?;
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                debug!("Connection closed with error: {}", err);
            }
        });

        Ok(Connection { sender, first_byte })
    }

    /// Tries every address in order; each try is traced as its own connect.
    async fn dial(&self, addrs: &[SocketAddr], trace: &mut TracePoint) -> Result<TcpStream, ProbeError> {
        let mut last_err = None;

        for &addr in addrs {
            trace.connect_start();
            let result = match tokio::time::timeout(self.dial_timeout, TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => Ok(stream),
                Ok(Err(e)) => Err(ProbeError::connect(addr, e)),
                Err(_) => Err(ProbeError::Timeout(self.dial_timeout)),
            };
            trace.connect_done(result.as_ref().err());

            match result {
                Ok(stream) => {
                    if let Err(err) = stream.set_nodelay(true) {
                        debug!("Failed to set TCP_NODELAY on {}: {}", addr, err);
                    }
                    return Ok(stream);
                }
                Err(err) => {
                    debug!("Dial {} failed: {}", addr, err);
                    last_err = Some(err);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| ProbeError::invalid_target(format!("{addrs:?}"), "no addresses to dial")))
    }
}

fn build_request(url: &Url) -> Result<Request<Empty<Bytes>>, ProbeError> {
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(ProbeError::invalid_target(
                url.as_str(),
                format!("unsupported scheme {other:?}"),
            ));
        }
    }

    let host = url
        .host_str()
        .ok_or_else(|| ProbeError::invalid_target(url.as_str(), "missing host"))?;
    let authority = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };

    Request::builder()
        .method(Method::GET)
        .uri(&url[Position::BeforePath..Position::AfterQuery])
        .header(HOST, authority)
        .header(USER_AGENT, USER_AGENT_VALUE)
        .body(Empty::new())
        .map_err(|e| ProbeError::invalid_target(url.as_str(), e))
}
