use std::env;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::info;
use trust_dns_resolver::{
    TokioAsyncResolver,
    config::{NameServerConfig, NameServerConfigGroup, Protocol, ResolverConfig, ResolverOpts},
};

use super::ConfigError;
use super::model::Endpoint;
use super::probe_config::EndpointsConfig;
use crate::http_probe::resolver::Resolver;

const DEFAULT_APP_PORT: u16 = 3000;
const DEFAULT_MIMIR_ENDPOINT: &str = "http://localhost:9009";

/// Largest body the `/latency` endpoint will generate, in bytes.
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 10 * 1024 * 1024;

pub struct AppConfig {
    pub endpoints: Vec<Endpoint>,
    pub one_off: bool,
    pub app_port: u16,
    pub mimir_endpoint: String,
    pub mimir_org_id: Option<String>,
    pub dns_hosts: Vec<String>,
    pub max_payload_size: usize,
}

/// Load the application configuration from the endpoints file and the environment.
///
/// The endpoints file must contain at least one valid endpoint. Environment
/// variables: `APP_PORT`, `MIMIR_ENDPOINT`, `MIMIR_ORG_ID`, `DNS_HOSTS` and
/// `MAX_PAYLOAD_SIZE`.
pub fn load_config(config_file: &Path, one_off: bool) -> Result<AppConfig, ConfigError> {
    let config_str = std::fs::read_to_string(config_file).map_err(|source| ConfigError::Read {
        path: PathBuf::from(config_file),
        source,
    })?;

    let endpoints = EndpointsConfig::from_yaml(&config_str)?.clean_endpoints(one_off)?;

    let app_port = match env_var("APP_PORT") {
        Some(port) => port.parse().map_err(|_| ConfigError::InvalidPort(port))?,
        None => DEFAULT_APP_PORT,
    };

    let max_payload_size = match env_var("MAX_PAYLOAD_SIZE") {
        Some(size) => size.parse().map_err(|_| ConfigError::InvalidPayloadSize(size))?,
        None => DEFAULT_MAX_PAYLOAD_SIZE,
    };

    let dns_hosts = parse_dns_hosts(env_var("DNS_HOSTS").as_deref());
    if dns_hosts.is_empty() {
        info!("Using the system DNS resolver");
    } else {
        info!("Using DNS hosts: {:?}", dns_hosts);
    }

    let mimir_endpoint = env_var("MIMIR_ENDPOINT").unwrap_or_else(|| DEFAULT_MIMIR_ENDPOINT.to_string());

    Ok(AppConfig {
        endpoints,
        one_off,
        app_port,
        mimir_endpoint,
        mimir_org_id: env_var("MIMIR_ORG_ID"),
        dns_hosts,
        max_payload_size,
    })
}

fn env_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_dns_hosts(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Setup the resolver used by the HTTP probers.
///
/// Without DNS hosts the system resolver is used. Otherwise a `TokioAsyncResolver`
/// is bound to the given name servers over TCP, with 2 attempts and a 100ms
/// timeout per attempt. Caching is disabled, every probe measures a real lookup.
pub fn setup_resolver(dns_hosts: &[String]) -> Result<Resolver, ConfigError> {
    if dns_hosts.is_empty() {
        return Ok(Resolver::System);
    }

    let mut opts = ResolverOpts::default();
    opts.attempts = 2;
    opts.timeout = Duration::from_millis(100);
    opts.cache_size = 0;

    let mut name_servers = NameServerConfigGroup::new();

    for host in dns_hosts {
        let ip: IpAddr = host
            .parse()
            .map_err(|_| ConfigError::InvalidDnsHost(host.clone()))?;
        name_servers.push(NameServerConfig {
            socket_addr: (ip, 53).into(),
            protocol: Protocol::Tcp,
            tls_dns_name: None,
            trust_negative_responses: false,
            bind_addr: None,
        });
    }

    let resolver_config = ResolverConfig::from_parts(None, vec![], name_servers);
    Ok(Resolver::Custom(TokioAsyncResolver::tokio(resolver_config, opts)))
}
