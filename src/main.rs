mod account;
mod config;
mod error;
mod mailer;
mod messages;
mod plans;
mod rpc;
mod seed;
mod storage;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use account::{AccountStore, Ledger, SessionSigner, TransactionLog, VerificationTokens};
use config::BlissConfig;
use messages::MessageStore;
use plans::{AccrualEngine, AccrualScheduler, PlanRegistry};
use rpc::{RpcServer, RpcState};
use storage::Storage;

#[derive(Parser)]
#[command(name = "profit_bliss", about = "Profit Bliss ledger & accrual backend")]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, default_value = "bliss.toml")]
    config: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the RPC server and accrual scheduler (default)
    Serve {
        /// Override the configured RPC port
        #[arg(long)]
        rpc_port: Option<u16>,
    },
    /// Initialize the database and seed data, then exit
    Seed,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = BlissConfig::load_or_default(&cli.config);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.server.log_level.clone())),
        )
        .init();

    match cli.command {
        Some(Commands::Seed) => {
            let services = build_services(&config)?;
            info!(
                "Seed complete: {} plans, {} accounts",
                services.registry.list().len(),
                services.accounts.count()
            );
            Ok(())
        }
        Some(Commands::Serve { rpc_port }) => {
            run_server(config, rpc_port).await
        }
        None => run_server(config, None).await,
    }
}

struct Services {
    accounts: Arc<AccountStore>,
    ledger: Ledger,
    tokens: Arc<VerificationTokens>,
    registry: Arc<PlanRegistry>,
    engine: Arc<AccrualEngine>,
    history: Arc<TransactionLog>,
    messages: Arc<MessageStore>,
}

/// Construct every component against one storage handle. Ownership is
/// explicit: the entry point wires the graph, components never reach for
/// globals.
fn build_services(config: &BlissConfig) -> Result<Services, Box<dyn std::error::Error>> {
    let storage = Arc::new(Storage::open(&config.server.db_path)?);

    let accounts = Arc::new(AccountStore::with_storage(
        storage.clone(),
        &config.auth.referral_code,
    )?);
    let ledger = Ledger::new(accounts.clone());
    let tokens = Arc::new(VerificationTokens::with_storage(
        storage.clone(),
        accounts.clone(),
        config.auth.verify_token_ttl_hours,
    )?);
    let registry = Arc::new(PlanRegistry::with_storage(storage.clone())?);
    let engine = Arc::new(AccrualEngine::with_storage(
        storage.clone(),
        registry.clone(),
        accounts.clone(),
    )?);
    let history = Arc::new(TransactionLog::with_storage(storage.clone())?);
    let messages = Arc::new(MessageStore::with_storage(storage)?);

    seed::seed(&registry, &accounts, &config.auth)?;

    Ok(Services {
        accounts,
        ledger,
        tokens,
        registry,
        engine,
        history,
        messages,
    })
}

async fn run_server(
    config: BlissConfig,
    rpc_port: Option<u16>,
) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting Profit Bliss backend");
    let services = build_services(&config)?;

    let scheduler = AccrualScheduler::new(
        services.engine.clone(),
        services.tokens.clone(),
        config.accrual.tick_secs,
    );
    tokio::spawn(scheduler.start());

    let state = RpcState {
        accounts: services.accounts,
        ledger: services.ledger,
        tokens: services.tokens,
        sessions: SessionSigner::new(&config.auth.session_secret, config.auth.session_ttl_days),
        registry: services.registry,
        engine: services.engine,
        history: services.history,
        messages: services.messages,
        mailer: mailer::from_config(&config.mail),
        base_url: config.server.base_url.clone(),
    };

    let port = rpc_port.unwrap_or(config.server.rpc_port);
    RpcServer::new(state, port).start().await?;
    Ok(())
}
