use std::error::Error;
use std::fmt::{self, Write};
use std::io;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Failure of a single probe attempt.
///
/// Sources are kept behind `Arc` so a trace can hold on to the first error it
/// saw while the same error is also returned to the caller.
#[derive(Debug, Clone, Error)]
pub enum ProbeError {
    #[error("probe canceled")]
    Canceled,

    #[error("deadline exceeded after {0:?}")]
    Timeout(Duration),

    #[error("invalid target {target}: {reason}")]
    InvalidTarget { target: String, reason: String },

    #[error("DNS resolution failed for {host}")]
    Dns {
        host: String,
        #[source]
        source: Arc<dyn Error + Send + Sync>,
    },

    #[error("TCP connection to {addr} failed")]
    Connect {
        addr: String,
        #[source]
        source: Arc<io::Error>,
    },

    #[error("TLS handshake failed")]
    Tls(#[source] Arc<native_tls::Error>),

    #[error("request failed")]
    Request(#[source] Arc<hyper::Error>),

    #[error("reading response body failed")]
    Body(#[source] Arc<hyper::Error>),
}

impl ProbeError {
    pub fn invalid_target(target: impl Into<String>, reason: impl fmt::Display) -> Self {
        ProbeError::InvalidTarget {
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    pub fn dns(host: impl Into<String>, source: impl Error + Send + Sync + 'static) -> Self {
        ProbeError::Dns {
            host: host.into(),
            source: Arc::new(source),
        }
    }

    pub fn connect(addr: impl fmt::Display, source: io::Error) -> Self {
        ProbeError::Connect {
            addr: addr.to_string(),
            source: Arc::new(source),
        }
    }
}

/// Bounded set of labels used for the errors counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorCategory {
    Timeout,
    Canceled,
    DnsError,
    ConnectionRefused,
    ConnectionReset,
    TlsError,
    Eof,
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Canceled => "canceled",
            ErrorCategory::DnsError => "dns_error",
            ErrorCategory::ConnectionRefused => "connection_refused",
            ErrorCategory::ConnectionReset => "connection_reset",
            ErrorCategory::TlsError => "tls_error",
            ErrorCategory::Eof => "eof",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Renders an error together with its whole `source()` chain.
pub fn report(mut err: &(dyn Error + 'static)) -> String {
    let mut s = format!("{}", err);
    while let Some(src) = err.source() {
        let _ = write!(s, ": {}", src);
        err = src;
    }
    s
}

fn chain<'a>(err: &'a (dyn Error + 'static)) -> impl Iterator<Item = &'a (dyn Error + 'static)> {
    std::iter::successors(Some(err), |e: &&'a (dyn Error + 'static)| (*e).source())
}

/// Kind of an I/O error, whether it sits in the chain bare or behind the
/// `Arc` that [`ProbeError`] stores it in.
fn io_kind(err: &(dyn Error + 'static)) -> Option<io::ErrorKind> {
    err.downcast_ref::<io::Error>()
        .or_else(|| err.downcast_ref::<Arc<io::Error>>().map(|io| &**io))
        .map(io::Error::kind)
}

fn is_deadline_exceeded(err: &(dyn Error + 'static)) -> bool {
    chain(err).any(|e| {
        matches!(e.downcast_ref::<ProbeError>(), Some(ProbeError::Timeout(_)))
            || io_kind(e) == Some(io::ErrorKind::TimedOut)
            || e.is::<tokio::time::error::Elapsed>()
    })
}

fn is_canceled(err: &(dyn Error + 'static)) -> bool {
    chain(err).any(|e| matches!(e.downcast_ref::<ProbeError>(), Some(ProbeError::Canceled)))
}

/// Maps a failure onto an [`ErrorCategory`]. Typed conditions win over the
/// message, which is matched in a fixed priority order.
pub fn categorize(err: Option<&(dyn Error + 'static)>) -> ErrorCategory {
    let Some(err) = err else {
        return ErrorCategory::Unknown;
    };

    if is_deadline_exceeded(err) {
        return ErrorCategory::Timeout;
    }
    if is_canceled(err) {
        return ErrorCategory::Canceled;
    }

    let msg = report(err).to_lowercase();
    let has = |needle: &str| msg.contains(needle);

    if has("no such host") || has("dns") {
        ErrorCategory::DnsError
    } else if has("connection refused") {
        ErrorCategory::ConnectionRefused
    } else if has("connection reset") {
        ErrorCategory::ConnectionReset
    } else if has("timeout") {
        ErrorCategory::Timeout
    } else if has("tls") || has("x509") || has("certificate") {
        ErrorCategory::TlsError
    } else if has("eof") {
        ErrorCategory::Eof
    } else {
        ErrorCategory::Unknown
    }
}
