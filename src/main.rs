//! identity-connector - wallet client for the DigitalIdentity registry
//!
//! Connects to a wallet over JSON-RPC and registers, updates or looks up
//! name + email identities.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

mod classifier;
mod config;
mod error;
mod registry;
mod service;
mod session;
mod wallet;

use classifier::{ErrorClassifier, SubstringClassifier};
use config::FileConfig;
use error::{ClassifiedError, IdentityError};
use registry::IdentityLookup;
use service::{IdentityService, TxOutcome};
use session::SessionController;
use wallet::rpc::JsonRpcWallet;
use wallet::watcher::spawn_watcher;
use wallet::{detect_provider, WalletProvider};

/// identity-connector: register and look up on-chain identities
#[derive(Parser)]
#[command(name = "identity-connector")]
#[command(about = "Wallet client for the DigitalIdentity registry", long_about = None)]
struct Cli {
    /// JSON config file
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Wallet / node JSON-RPC endpoint
    #[arg(long, global = true)]
    rpc_url: Option<String>,

    /// Read-only JSON-RPC endpoint for lookups
    #[arg(long, global = true)]
    read_rpc_url: Option<String>,

    /// Deployed DigitalIdentity contract address
    #[arg(long, global = true)]
    contract: Option<String>,

    /// Network ID the contract is deployed on
    #[arg(long, global = true)]
    network_id: Option<String>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the wallet session without prompting for access
    Status,

    /// Connect the wallet and show the current identity
    Connect,

    /// Register an identity for the connected account
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
    },

    /// Update the connected account's identity
    Update {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
    },

    /// Look up the identity of any address
    View {
        #[arg(value_name = "ADDRESS")]
        address: String,

        /// Print the record as JSON
        #[arg(long)]
        json: bool,
    },

    /// Connect and follow account/network changes until interrupted
    Watch,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set subscriber: {}", e);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<config::IdentityConfig, IdentityError> {
    let mut raw = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    if let Some(url) = &cli.rpc_url {
        raw.rpc_url = url.clone();
    }
    if let Some(url) = &cli.read_rpc_url {
        raw.read_rpc_url = Some(url.clone());
    }
    if let Some(contract) = &cli.contract {
        raw.contract_address = contract.clone();
    }
    if let Some(network) = &cli.network_id {
        raw.target_network_id = network.clone();
    }
    Ok(raw.validate()?)
}

async fn run(cli: Cli) -> Result<(), IdentityError> {
    let config = load_config(&cli)?;
    info!(
        "Contract {:?} on network ID {} via {}",
        config.contract_address, config.target_network_id, config.rpc_url
    );

    let classifier: Arc<dyn ErrorClassifier> = Arc::new(SubstringClassifier);
    let provider: Arc<dyn WalletProvider> =
        Arc::new(JsonRpcWallet::new(&config.rpc_url).with_poll_interval(config.poll_interval));
    let read_provider: Arc<dyn WalletProvider> = match &config.read_rpc_url {
        Some(url) => Arc::new(JsonRpcWallet::new(url)),
        None => provider.clone(),
    };
    let wallet = detect_provider(provider, &*classifier).await;

    let poll_interval = config.poll_interval;
    let controller = Arc::new(
        SessionController::new(config, wallet.clone())
            .with_read_provider(read_provider)
            .with_classifier(classifier),
    );
    let service = IdentityService::new(controller.clone());

    match cli.command {
        Commands::Status => {
            if wallet.is_none() {
                println!("{}", ClassifiedError::provider_unavailable());
            }
            service.session().restore().await;
            print_session(service.session()).await;
        }
        Commands::Connect => {
            let connection = service.session().connect().await?;
            print_session(service.session()).await;
            match connection.identity {
                Ok(lookup) => print_lookup(&lookup, false),
                Err(e) => println!("Failed to load current user identity: {}", e),
            }
        }
        Commands::Register { name, email } => {
            controller.restore().await;
            let outcome = service.register(&name, &email).await?;
            println!("Identity registered successfully for {} ({})!", name, email);
            print_outcome(&outcome);
        }
        Commands::Update { name, email } => {
            controller.restore().await;
            let outcome = service.update(&name, &email).await?;
            println!("Identity updated successfully!");
            print_outcome(&outcome);
        }
        Commands::View { address, json } => {
            let lookup = service.view_by_address(&address).await?;
            print_lookup(&lookup, json);
        }
        Commands::Watch => {
            let Some(wallet) = wallet else {
                return Err(ClassifiedError::provider_unavailable().into());
            };
            if let Err(e) = controller.connect().await {
                println!("{}", e);
            }
            print_session(&controller).await;

            let mut updates = controller.subscribe();
            let (watcher, events) = spawn_watcher(wallet, poll_interval);
            let runner = {
                let controller = controller.clone();
                tokio::spawn(async move { controller.run_events(events).await })
            };

            loop {
                tokio::select! {
                    changed = updates.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let snapshot = updates.borrow_and_update().clone();
                        println!("[{}] Account: {}", snapshot.status, snapshot.account_label());
                        if let Some(notice) = &snapshot.notice {
                            println!("{}", notice);
                        }
                    }
                    _ = tokio::signal::ctrl_c() => {
                        info!("Interrupted, stopping watcher");
                        break;
                    }
                }
            }
            watcher.abort();
            runner.abort();
            controller.disconnect().await;
        }
    }

    Ok(())
}

async fn print_session(controller: &SessionController) {
    let snapshot = controller.snapshot().await;
    println!("Account:  {}", snapshot.account_label());
    println!("Contract: {:?}", controller.config().contract_address);
    println!("Network:  {}", controller.config().target_network_id);
    if let Some(notice) = snapshot.notice {
        println!("{}", notice);
    }
}

fn print_outcome(outcome: &TxOutcome) {
    println!(
        "Transaction {:?} confirmed in block {}",
        outcome.receipt.tx_hash,
        outcome
            .receipt
            .block_number
            .map(|n| n.to_string())
            .unwrap_or_else(|| "?".to_string())
    );
    match &outcome.identity {
        Ok(lookup) => print_lookup(lookup, false),
        Err(e) => println!("{}", e),
    }
}

fn print_lookup(lookup: &IdentityLookup, json: bool) {
    match (lookup, json) {
        (IdentityLookup::Registered(record), true) => match serde_json::to_string_pretty(record) {
            Ok(text) => println!("{}", text),
            Err(e) => println!("{}", e),
        },
        (IdentityLookup::NotRegistered { .. }, true) => println!("null"),
        (_, false) => println!("{}", lookup),
    }
}
