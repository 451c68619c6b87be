use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

use stakepilot::chain::HttpChainClient;
use stakepilot::cli::{ops, Cli, Commands};
use stakepilot::config::Config;
use stakepilot::credentials::CredentialSet;
use stakepilot::error::BotError;
use stakepilot::orchestrator::Orchestrator;
use stakepilot::pipeline::StakePipeline;
use stakepilot::proxy::ProxyPool;
use stakepilot::scheduler::LoopScheduler;
use stakepilot::state::StateStore;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    match cli.command {
        Some(Commands::ClearLog) => {
            ops::handle_clear_log(&Config::load_or_default(&cli.config).files)
        }
        Some(Commands::ResetData) => {
            ops::handle_reset_data(&Config::load_or_default(&cli.config).files)
        }
        Some(Commands::WatchLog) => {
            ops::handle_watch_log(&Config::load_or_default(&cli.config).files).await
        }
        Some(Commands::CheckConfig) => ops::handle_check_config(&cli.config),
        Some(Commands::Accounts) => {
            ops::handle_accounts(&Config::load_or_default(&cli.config).files)
        }
        None => {
            if let Err(e) = run(&cli.config).await {
                eprintln!("Fatal: {}", e);
                std::process::exit(1);
            }
        }
    }
}

/// Composition root: everything is constructed and wired here, once, then
/// handed to the scheduler.
async fn run(config_path: &str) -> Result<(), BotError> {
    let config = Arc::new(Config::load(config_path)?);
    init_logging(&config.files.log)?;
    info!(
        "stakepilot starting (reserve {}, tier {}, auto-compound {})",
        config.stake.reserve_balance, config.stake.tier_id, config.stake.auto_compound
    );

    let credentials = CredentialSet::load(Path::new(&config.files.credentials))?;
    if credentials.is_empty() {
        return Err(BotError::Config(format!(
            "no usable credentials in '{}'",
            config.files.credentials
        )));
    }
    if credentials.dropped > 0 {
        info!(
            "Loaded {} accounts ({} malformed lines dropped)",
            credentials.len(),
            credentials.dropped
        );
    } else {
        info!("Loaded {} accounts", credentials.len());
    }

    let proxies = ProxyPool::load(Path::new(&config.files.proxies))?;
    if proxies.is_empty() {
        info!("Proxy pool is empty, all accounts run proxyless");
    } else {
        info!("Loaded {} proxies", proxies.len());
    }

    let store = StateStore::open(Path::new(&config.files.state), config.state.on_corrupt)?;

    let chain = Arc::new(HttpChainClient::new(
        &config.chain.rpc_url,
        Duration::from_millis(config.chain.request_timeout_ms),
        config.chain.quiet_rpc,
    )?);

    let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Stop signal received, finishing the in-flight account first");
            let _ = stop_tx.send(true);
        }
    });

    let pipeline = StakePipeline::new(chain, config.clone());
    let orchestrator = Orchestrator::new(
        credentials,
        proxies,
        pipeline,
        store,
        config.clone(),
        stop_rx.clone(),
    );
    let mut scheduler = LoopScheduler::new(orchestrator, &config, stop_rx)?;
    scheduler.run().await
}

/// Log to stdout and to the append-mode process log. `RUST_LOG` overrides the
/// default `info` filter.
fn init_logging(log_path: &str) -> Result<(), BotError> {
    let path = Path::new(log_path);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                BotError::Config(format!("cannot create log directory: {}", e))
            })?;
        }
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| BotError::Config(format!("cannot open log file '{}': {}", log_path, e)))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(std::io::stdout.and(Arc::new(file)))
        .init();
    Ok(())
}
