//! query-receiver: an HTTP endpoint that echoes back its query parameters
//!
//! Every request on the configured path (default `/receiver`) has its query
//! string percent-decoded and answered as `key = value` lines:
//! - Repeated keys keep every value, in arrival order
//! - Keys are listed in order of first appearance
//! - Undecodable queries get a 400 response
//!
//! Configuration via CLI arguments, environment variables or a TOML file.
//! The listen port defaults to 4000 and can be set with
//! `EDC_HTTP_SERVER_PORT`.

mod config;
mod protocols;
mod query;
mod server;

use config::Config;
use server::Server;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        listen = %config.listen,
        path = %config.path,
        encoding = config.decoder.encoding().name(),
        workers = ?config.workers,
        max_connections = config.max_connections,
        "Starting query-receiver"
    );

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if let Some(workers) = config.workers {
        builder.worker_threads(workers);
    }
    let runtime = builder.build()?;

    runtime.block_on(async move { Server::new(config).run().await })?;
    Ok(())
}
