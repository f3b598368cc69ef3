use std::time::{Duration, Instant};

use log::debug;

use crate::metrics::Phase;
use crate::probe::error::ProbeError;

/// Timestamps of the phases of one HTTP request, and the durations derived
/// from them.
///
/// The client calls the `*_start` / `*_done` handlers as the request moves
/// through its lifecycle. A handler that is given an error keeps the first
/// one; the caller must then skip [`TracePoint::compute_durations`].
#[derive(Debug, Default)]
pub struct TracePoint {
    dns_start: Option<Instant>,
    dns_done: Option<Instant>,

    connect_start: Option<Instant>,
    connect_done: Option<Instant>,

    tls_start: Option<Instant>,
    tls_done: Option<Instant>,

    /// Reference point of got-conn, first-byte and total.
    request_start: Option<Instant>,
    got_conn: Option<Instant>,
    first_byte: Option<Instant>,
    total_done: Option<Instant>,

    pub dns: Duration,
    pub connect: Duration,
    pub tls: Duration,
    pub got_conn_duration: Duration,
    pub first_byte_duration: Duration,
    pub total: Duration,

    status_code: Option<u16>,
    err: Option<ProbeError>,
}

fn between(start: Option<Instant>, done: Option<Instant>) -> Duration {
    match (start, done) {
        (Some(start), Some(done)) => done.saturating_duration_since(start),
        _ => Duration::ZERO,
    }
}

impl TracePoint {
    pub fn new() -> Self {
        Self::default()
    }

    fn fail(&mut self, err: Option<&ProbeError>) -> bool {
        match err {
            Some(err) => {
                if self.err.is_none() {
                    self.err = Some(err.clone());
                }
                true
            }
            None => false,
        }
    }

    pub fn request_start(&mut self) {
        self.request_start = Some(Instant::now());
    }

    pub fn dns_start(&mut self) {
        self.dns_start = Some(Instant::now());
    }

    pub fn dns_done(&mut self, err: Option<&ProbeError>) {
        if !self.fail(err) {
            self.dns_done = Some(Instant::now());
        }
    }

    /// Called for every address dialed.
    pub fn connect_start(&mut self) {
        self.connect_start = Some(Instant::now());
    }

    pub fn connect_done(&mut self, err: Option<&ProbeError>) {
        if !self.fail(err) {
            self.connect_done = Some(Instant::now());
        }
    }

    pub fn tls_start(&mut self) {
        self.tls_start = Some(Instant::now());
    }

    pub fn tls_done(&mut self, err: Option<&ProbeError>) {
        if !self.fail(err) {
            self.tls_done = Some(Instant::now());
        }
    }

    pub fn got_conn(&mut self) {
        self.got_conn = Some(Instant::now());
    }

    pub fn first_byte(&mut self, at: Instant) {
        self.first_byte = Some(at);
    }

    pub fn total_done(&mut self) {
        self.total_done = Some(Instant::now());
    }

    pub fn set_status_code(&mut self, code: u16) {
        self.status_code = Some(code);
    }

    pub fn status_code(&self) -> Option<u16> {
        self.status_code
    }

    pub fn error(&self) -> Option<&ProbeError> {
        self.err.as_ref()
    }

    pub fn take_error(&mut self) -> Option<ProbeError> {
        self.err.take()
    }

    /// Derives the phase durations. Phases that never happened (no TLS on plain
    /// HTTP, no dial on a reused connection) come out as zero.
    pub fn compute_durations(&mut self) {
        self.dns = between(self.dns_start, self.dns_done);
        self.connect = between(self.connect_start, self.connect_done);
        self.tls = between(self.tls_start, self.tls_done);
        self.got_conn_duration = between(self.request_start, self.got_conn);
        self.first_byte_duration = between(self.request_start, self.first_byte);
        self.total = between(self.request_start, self.total_done);

        debug!("Response Code: {:?}", self.status_code);
        debug!("DNS Latency: {:?}", self.dns);
        debug!("Connection Latency: {:?}", self.connect);
        debug!("TLS Latency: {:?}", self.tls);
        debug!("GotConnection Latency: {:?}", self.got_conn_duration);
        debug!("TimeToFirstByte Latency: {:?}", self.first_byte_duration);
        debug!("Total Latency: {:?}", self.total);
    }

    /// The six latency observations, in seconds.
    pub fn observations(&self) -> [(Phase, f64); 6] {
        [
            (Phase::Dns, self.dns.as_secs_f64()),
            (Phase::Connect, self.connect.as_secs_f64()),
            (Phase::Tls, self.tls.as_secs_f64()),
            (Phase::GotConn, self.got_conn_duration.as_secs_f64()),
            (Phase::FirstByte, self.first_byte_duration.as_secs_f64()),
            (Phase::Total, self.total.as_secs_f64()),
        ]
    }
}
