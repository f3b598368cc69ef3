use std::time::Duration;

/// A validated destination to monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// `http(s)://host[:port]` for httpTrace, `host:port` for tcp.
    pub uri: String,
    pub interval: Duration,
    pub tag: String,
    pub retries: u32,
    /// Raw prober type as configured; parsed into a `ProberKind` by the agent.
    pub prober_type: String,
    pub one_off: bool,
    pub reuse_connection: bool,
    pub skip_tls_verify: bool,
    pub tcp_timeout: Duration,
}
