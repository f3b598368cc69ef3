use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

pub mod agent;
pub mod app;
pub mod config;
pub mod http_probe;
pub mod metrics;
pub mod mimir;
pub mod probe;
pub mod server;

use app::App;
use config::app_config::load_config;

#[derive(Debug, Parser)]
#[clap(version, about)]
struct Opt {
    /// Run every prober once, push the metrics and exit
    #[clap(long)]
    oneoff: bool,

    /// Endpoints configuration file
    #[clap(long, env = "CONFIG_FILE", default_value = "config.yml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let opt = Opt::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = load_config(&opt.config, opt.oneoff)
        .with_context(|| format!("Failed to load configuration from {}", opt.config.display()))?;
    info!(
        "Loaded {} endpoints, mode: {}",
        config.endpoints.len(),
        if config.one_off { "one-off" } else { "server" }
    );

    App::new(config)?.start().await
}
