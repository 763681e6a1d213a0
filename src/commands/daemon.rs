use anyhow::Result;

use crate::config;

pub fn run(
    http_addr: Option<String>,
    log_level: Option<String>,
    config_path: Option<String>,
) -> Result<()> {
    // Load config from file (custom path or default chain)
    let mut daemon_config = match config_path {
        Some(path) => config::load_with_path(&path)?.daemon.unwrap_or_default(),
        None => config::load()?.daemon.unwrap_or_default(),
    };

    // CLI flags override config values
    if let Some(addr) = http_addr {
        daemon_config.http_addr = addr;
    }
    if let Some(level) = log_level {
        daemon_config.log_level = level;
    }

    // Build tokio runtime explicitly (no #[tokio::main] on fn main)
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(crate::server::run(daemon_config))
}
