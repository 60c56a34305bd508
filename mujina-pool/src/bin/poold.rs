//! Main entry point for the mujina-pool daemon.
//!
//! Takes an optional path to a JSON configuration file.

use mujina_pool::{config::PoolConfig, daemon::Daemon, tracing};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing::init_journald_or_stdout();

    let config = match std::env::args_os().nth(1) {
        Some(path) => PoolConfig::load(path)?,
        None => PoolConfig::default(),
    };

    Daemon::new(config).run().await
}
