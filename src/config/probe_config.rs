use std::time::Duration;

use log::error;
use serde::Deserialize;

use super::ConfigError;
use super::model::Endpoint;
use crate::probe::ProberKind;

const DEFAULT_INTERVAL_SECONDS: u64 = 5;
const DEFAULT_RETRIES: u32 = 1;
const DEFAULT_TCP_TIMEOUT_MS: u64 = 10_000;

/// The endpoints file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EndpointsConfig {
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
}

/// A single endpoint as written in the endpoints file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EndpointConfig {
    /// Host name (httpTrace) or `host:port` (tcp) to probe.
    pub domain: String,

    /// Probe with `https://` instead of `http://`. Ignored by tcp probers.
    #[serde(default)]
    pub https: bool,

    /// Seconds between probes, at least 1. Defaults to 5.
    pub interval_seconds: Option<u64>,

    /// Free-form label attached to every metric of this endpoint.
    #[serde(default)]
    pub tag: String,

    /// Attempts per probe, at least 1. Defaults to 1.
    pub retries: Option<u32>,

    /// `tcp` or `httpTrace`. Defaults to `httpTrace`.
    pub prober: Option<String>,

    #[serde(default)]
    pub reuse_connection: bool,

    #[serde(default)]
    pub skip_tls_verify: bool,

    /// Dial timeout in milliseconds. Defaults to 10000.
    pub tcp_timeout_ms: Option<u64>,
}

impl EndpointsConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Validates every endpoint, logging and skipping the invalid ones.
    pub fn clean_endpoints(&self, one_off: bool) -> Result<Vec<Endpoint>, ConfigError> {
        if self.endpoints.is_empty() {
            return Err(ConfigError::NoEndpoints);
        }

        let clean: Vec<Endpoint> = self
            .endpoints
            .iter()
            .filter_map(|e| match e.clean_endpoint(one_off) {
                Ok(endpoint) => Some(endpoint),
                Err(err) => {
                    error!("Skipping endpoint {:?}: {}", e.domain, err);
                    None
                }
            })
            .collect();

        if clean.is_empty() {
            return Err(ConfigError::NoValidEndpoints);
        }
        Ok(clean)
    }
}

impl EndpointConfig {
    pub fn clean_endpoint(&self, one_off: bool) -> Result<Endpoint, ConfigError> {
        if self.domain.trim().is_empty() {
            return Err(ConfigError::InvalidEndpoint("domain cannot be empty".to_string()));
        }

        let interval = self.interval_seconds.unwrap_or(DEFAULT_INTERVAL_SECONDS);
        if interval < 1 {
            return Err(ConfigError::InvalidEndpoint(
                "interval cannot be less than 1 second".to_string(),
            ));
        }

        let retries = self.retries.unwrap_or(DEFAULT_RETRIES);
        if retries < 1 {
            return Err(ConfigError::InvalidEndpoint("retries must be at least 1".to_string()));
        }

        let tcp_timeout = self.tcp_timeout_ms.unwrap_or(DEFAULT_TCP_TIMEOUT_MS);
        if tcp_timeout < 1 {
            return Err(ConfigError::InvalidEndpoint(
                "tcp_timeout_ms must be at least 1".to_string(),
            ));
        }

        let prober = self.prober.as_deref().unwrap_or(ProberKind::HttpTrace.as_str());
        let kind: ProberKind = prober
            .parse()
            .map_err(|e: crate::probe::UnknownProberKind| ConfigError::InvalidEndpoint(e.to_string()))?;

        let uri = match kind {
            ProberKind::HttpTrace if self.https => format!("https://{}", self.domain),
            ProberKind::HttpTrace => format!("http://{}", self.domain),
            ProberKind::Tcp => self.domain.clone(),
        };

        Ok(Endpoint {
            uri,
            interval: Duration::from_secs(interval),
            tag: self.tag.clone(),
            retries,
            prober_type: kind.as_str().to_string(),
            one_off,
            reuse_connection: self.reuse_connection,
            skip_tls_verify: self.skip_tls_verify,
            tcp_timeout: Duration::from_millis(tcp_timeout),
        })
    }
}

#[cfg(test)]
pub mod test {
    use super::*;

    fn domain(d: &str) -> EndpointConfig {
        EndpointConfig {
            domain: d.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let ep = domain("example.com").clean_endpoint(false).expect("valid endpoint");

        assert_eq!(ep.prober_type, "httpTrace");
        assert_eq!(ep.retries, 1);
        assert_eq!(ep.uri, "http://example.com");
        assert_eq!(ep.interval, Duration::from_secs(5));
        assert_eq!(ep.tcp_timeout, Duration::from_secs(10));
        assert!(!ep.one_off);
    }

    #[test]
    fn test_https_and_tcp_uris() {
        let https = EndpointConfig {
            https: true,
            ..domain("example.com")
        };
        assert_eq!(https.clean_endpoint(true).unwrap().uri, "https://example.com");

        let tcp = EndpointConfig {
            prober: Some("tcp".to_string()),
            https: true,
            ..domain("example.com:443")
        };
        let ep = tcp.clean_endpoint(true).unwrap();
        assert_eq!(ep.uri, "example.com:443");
        assert_eq!(ep.prober_type, "tcp");
        assert!(ep.one_off);
    }

    #[test]
    fn test_rejections() {
        let short_interval = EndpointConfig {
            interval_seconds: Some(0),
            ..domain("example.com")
        };
        assert!(short_interval.clean_endpoint(false).is_err());

        let no_retries = EndpointConfig {
            retries: Some(0),
            ..domain("example.com")
        };
        assert!(no_retries.clean_endpoint(false).is_err());

        let bad_prober = EndpointConfig {
            prober: Some("icmp".to_string()),
            ..domain("example.com")
        };
        assert!(bad_prober.clean_endpoint(false).is_err());

        assert!(domain("  ").clean_endpoint(false).is_err());
    }

    #[test]
    fn test_endpoints_deserialization() {
        let yaml = r#"
                    endpoints:
                      - domain: example.com
                        https: true
                        interval_seconds: 10
                        tag: prod
                        retries: 3
                        reuse_connection: true
                        skip_tls_verify: true
                      - domain: example.com:443
                        prober: tcp
                        tcp_timeout_ms: 1500
                      - domain: example.org
                        prober: icmp
                                    "#;

        let config = EndpointsConfig::from_yaml(yaml).expect("Invalid YAML");
        assert_eq!(config.endpoints.len(), 3);

        let endpoints = config.clean_endpoints(false).expect("valid endpoints");
        assert_eq!(endpoints.len(), 2);
        assert_eq!(endpoints[0].uri, "https://example.com");
        assert_eq!(endpoints[0].interval, Duration::from_secs(10));
        assert_eq!(endpoints[0].tag, "prod");
        assert_eq!(endpoints[0].retries, 3);
        assert!(endpoints[0].reuse_connection);
        assert!(endpoints[0].skip_tls_verify);
        assert_eq!(endpoints[1].uri, "example.com:443");
        assert_eq!(endpoints[1].tcp_timeout, Duration::from_millis(1500));
    }

    #[test]
    fn test_empty_and_all_invalid() {
        let empty = EndpointsConfig::from_yaml("endpoints: []").unwrap();
        assert!(matches!(empty.clean_endpoints(false), Err(ConfigError::NoEndpoints)));

        let invalid = EndpointsConfig {
            endpoints: vec![EndpointConfig {
                retries: Some(0),
                ..domain("example.com")
            }],
        };
        assert!(matches!(invalid.clean_endpoints(false), Err(ConfigError::NoValidEndpoints)));
    }
}
