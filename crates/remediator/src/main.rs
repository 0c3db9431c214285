use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use remediator::{
    config::Config,
    dispatcher::Dispatcher,
    executor::create_executor,
    logging,
    server::Server,
    store::create_store,
};

#[derive(Debug, Parser)]
#[command(name = "remediator", version, about = "Alertmanager webhook remediation dispatcher")]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long, env = "REMEDIATOR_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, overrides server.addr
    #[arg(long)]
    addr: Option<String>,

    /// Log level, overrides log.level
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(addr) = args.addr {
        config.server.addr = addr;
    }
    if let Some(level) = args.log_level {
        config.log.level = level;
    }
    config.validate().context("Invalid configuration")?;

    logging::init(&config.log)?;
    info!(
        addr = %config.server.addr,
        database = ?config.database.db_type,
        actions = config.actions.len(),
        cooldown_secs = config.dispatcher.cooldown_secs,
        "Starting remediator"
    );
    for warning in config.warnings() {
        warn!("{}", warning);
    }

    // Initialize store
    let store = create_store(&config.database)
        .await
        .context("Failed to open outcome log")?;
    store.init().await.context("Failed to initialize outcome log")?;

    let executor = create_executor(&config.executor).context("Failed to create executor")?;

    let dispatcher = Arc::new(Dispatcher::new(
        config.actions.clone(),
        executor,
        store.clone(),
        config.dispatcher.clone(),
    ));
    dispatcher
        .restore()
        .await
        .context("Failed to restore cooldown state")?;
    let janitor = dispatcher.spawn_janitor();

    let server = Server::new(&config, dispatcher, store);
    server.start(&config.server.addr).await?;

    janitor.abort();
    Ok(())
}
