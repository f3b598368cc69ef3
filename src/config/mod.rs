pub mod app_config;
pub mod model;
pub mod probe_config;

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid endpoints file")]
    Yaml(#[from] serde_yaml::Error),

    #[error("endpoints configuration is empty or malformed, cannot proceed with no endpoints")]
    NoEndpoints,

    #[error("no valid endpoints found in the endpoints configuration")]
    NoValidEndpoints,

    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("APP_PORT {0:?} is not a valid port")]
    InvalidPort(String),

    #[error("MAX_PAYLOAD_SIZE {0:?} is not a valid byte count")]
    InvalidPayloadSize(String),

    #[error("DNS host {0:?} is not an IP address")]
    InvalidDnsHost(String),
}
