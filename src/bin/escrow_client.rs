//! Escrow Client
//!
//! Command-line front end for the escrow state store:
//! - `deposits`: one reconciliation pass, prints active deposits and intents
//! - `account --owner <addr>`: prints one depositor's deposits
//! - `watch`: opens a refresh window and logs every published view until it closes
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin escrow-client -- --config escrow_client.toml deposits
//! ```
//!
//! Or set the config path via environment variable:
//!
//! ```bash
//! ESCROW_CLIENT_CONFIG_PATH=escrow_client.toml cargo run --bin escrow-client -- watch
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use escrow_client::{
    config::ClientConfig,
    escrow::{EscrowStateStore, RefreshState},
    storage::FileKeyValueStore,
    EvmEscrowClient,
};
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "escrow-client")]
#[command(about = "Reconciles escrow deposits and intents from the escrow contract")]
struct Args {
    /// Path to configuration file (default: config/escrow_client.toml or ESCROW_CLIENT_CONFIG_PATH env var)
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reconcile once and print active deposits and their intents as JSON
    Deposits,
    /// Print the deposits created by one depositor as JSON
    Account {
        /// Depositor address
        #[arg(long, value_name = "0x...")]
        owner: String,
    },
    /// Open a refresh window and log every published view until it closes
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ClientConfig::load_from_path(args.config.as_deref())?;
    info!(
        "Chain: {} (chain ID: {}), escrow: {}",
        config.chain.name, config.chain.chain_id, config.chain.escrow_contract_addr
    );

    let reader = Arc::new(EvmEscrowClient::new(&config.chain)?);
    let storage = Arc::new(
        FileKeyValueStore::new(&config.storage.cache_dir)
            .with_context(|| format!("Failed to open cache dir {}", config.storage.cache_dir))?,
    );
    let store = EscrowStateStore::new(
        reader,
        storage,
        &config.chain.escrow_contract_addr,
        &config.chain.target_token,
        config.reconciliation.clone(),
    )?;

    match args.command {
        Command::Deposits => {
            let summary = store
                .refresh()
                .await
                .context("Failed to read the deposit counter")?;
            info!(
                "Reconciled: {} active, {} newly pruned",
                summary.active, summary.newly_pruned
            );
            let output = serde_json::json!({
                "deposits": store.deposits().await,
                "intents": store.intents().await,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Command::Account { owner } => {
            let deposits = store.account_deposits(&owner).await?;
            println!("{}", serde_json::to_string_pretty(&deposits)?);
        }
        Command::Watch => watch(&store, &config).await?,
    }

    Ok(())
}

async fn watch(store: &EscrowStateStore, config: &ClientConfig) -> Result<()> {
    store.init().await;
    store.trigger_deposit_refresh().await;

    let mut ticker = tokio::time::interval(config.reconciliation.poll_interval());
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let deposits = store.deposits().await;
                let intents = store.intents().await;
                info!(
                    "Published view: {} deposit(s), {} intent(s), counter {:?}",
                    deposits.len(),
                    intents.len(),
                    store.last_deposit_counter().await
                );
                if store.refresh_state().await == RefreshState::Idle {
                    info!("Refresh window closed");
                    break;
                }
            }
            result = signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!("Failed to listen for shutdown signal: {}", e);
                }
                info!("Shutdown signal received");
                break;
            }
        }
    }

    store.dispose().await;
    Ok(())
}
