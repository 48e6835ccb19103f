use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use rust_decimal::Decimal;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use wallet_ledger::application::platform::{Collaborators, Platform};
use wallet_ledger::config::LedgerConfig;
use wallet_ledger::domain::money::Amount;
use wallet_ledger::domain::ports::{Clock, RepositoryRef, WebhookEmitter};
use wallet_ledger::domain::wallet::WalletId;
use wallet_ledger::infrastructure::clock::{ManualClock, SystemClock};
use wallet_ledger::infrastructure::in_memory::{InMemoryStore, InMemoryUserDirectory};
use wallet_ledger::infrastructure::notifier::LogNotifier;
use wallet_ledger::infrastructure::rails::SimulatedRail;
use wallet_ledger::infrastructure::webhook::HttpWebhookEmitter;
use wallet_ledger::interfaces::csv::script_reader::ScriptReader;
use wallet_ledger::interfaces::csv::script_runner::ScriptRunner;
use wallet_ledger::interfaces::csv::wallet_writer::WalletWriter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Ledger configuration (JSON). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the system wallets if they do not exist yet.
    InitWallets,
    /// Credit a confirmed deposit to a wallet.
    SimulateDeposit {
        #[arg(long)]
        wallet: String,
        #[arg(long)]
        amount: Decimal,
        /// Provider receipt, used as the transaction reference.
        #[arg(long)]
        receipt: Option<String>,
    },
    /// Release approved payouts whose hold has expired.
    ProcessPayouts {
        /// Keep running, one batch every N seconds.
        #[arg(long)]
        interval_secs: Option<u64>,
    },
    /// Print every wallet balance as CSV.
    Balances,
    /// Compare cached balances against ledger entries.
    Reconcile,
    /// Replay an operations script and print the resulting balances.
    Run { script: PathBuf },
}

fn open_repository(db_path: Option<PathBuf>) -> Result<RepositoryRef> {
    match db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(path) => {
            let store = wallet_ledger::infrastructure::rocksdb::RocksDBStore::open(path).into_diagnostic()?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => {
            eprintln!(
                "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
            );
            Ok(Arc::new(InMemoryStore::new()))
        }
        None => Ok(Arc::new(InMemoryStore::new())),
    }
}

fn webhook_emitter(config: &LedgerConfig) -> Result<Option<Arc<dyn WebhookEmitter>>> {
    match &config.webhook {
        Some(hook) => {
            let emitter = HttpWebhookEmitter::new(hook.url.clone(), hook.secret.clone()).into_diagnostic()?;
            Ok(Some(Arc::new(emitter)))
        }
        None => Ok(None),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => LedgerConfig::from_path(path).into_diagnostic()?,
        None => LedgerConfig::default(),
    };
    let repo = open_repository(cli.db_path)?;
    let users = InMemoryUserDirectory::new();
    let manual_clock = Arc::new(ManualClock::default());
    let clock: Arc<dyn Clock> = match cli.command {
        Command::Run { .. } => manual_clock.clone(),
        _ => Arc::new(SystemClock),
    };

    let platform = Platform::new(
        config.clone(),
        Collaborators {
            repo: repo.clone(),
            users: Arc::new(users.clone()),
            rail: Arc::new(SimulatedRail::default()),
            notifier: Arc::new(LogNotifier),
            webhook: webhook_emitter(&config)?,
            clock,
        },
    )
    .into_diagnostic()?;
    platform.wallets.bootstrap().await.into_diagnostic()?;

    let outcome = execute(&platform, cli.command, users, manual_clock).await;
    platform.shutdown().await;
    outcome
}

async fn execute(
    platform: &Platform,
    command: Command,
    users: InMemoryUserDirectory,
    clock: Arc<ManualClock>,
) -> Result<()> {
    match command {
        Command::InitWallets => {
            let system = platform.wallets.bootstrap().await.into_diagnostic()?;
            let mut writer = WalletWriter::new(io::stdout().lock());
            writer.write_wallets(&system, |_| None).into_diagnostic()?;
        }
        Command::SimulateDeposit {
            wallet,
            amount,
            receipt,
        } => {
            let wallet = wallet.parse::<WalletId>().into_diagnostic()?;
            let amount = Amount::new(amount).into_diagnostic()?;
            let tx = platform
                .collections
                .deposit(wallet, amount, receipt)
                .await
                .into_diagnostic()?;
            println!("{} {}", tx.reference, tx.status);
        }
        Command::ProcessPayouts { interval_secs } => match interval_secs {
            Some(secs) => {
                let handle = platform.payouts.clone().spawn(Duration::from_secs(secs.max(1)));
                tokio::signal::ctrl_c().await.into_diagnostic()?;
                handle.abort();
            }
            None => {
                let report = platform.payouts.run().await.into_diagnostic()?;
                for reference in &report.released {
                    println!("released,{reference}");
                }
                for (reference, reason) in &report.failed {
                    println!("failed,{reference},{reason}");
                }
                for reference in &report.escalated {
                    println!("escalated,{reference}");
                }
            }
        },
        Command::Balances => {
            let wallets = platform.repo.all_wallets().await.into_diagnostic()?;
            let mut writer = WalletWriter::new(io::stdout().lock());
            writer.write_wallets(&wallets, |_| None).into_diagnostic()?;
        }
        Command::Reconcile => {
            let drifts = platform.statements.reconcile().await.into_diagnostic()?;
            for drift in &drifts {
                println!("{}", serde_json::to_string(drift).into_diagnostic()?);
            }
            if !drifts.is_empty() {
                return Err(miette::miette!("{} wallet(s) out of balance", drifts.len()));
            }
            println!("ledger balanced");
        }
        Command::Run { script } => {
            let file = File::open(script).into_diagnostic()?;
            let mut runner = ScriptRunner::new(platform, users, clock);
            for (line, record) in ScriptReader::new(file).records().enumerate() {
                match record {
                    Ok(record) => match runner.execute(record).await {
                        Ok(outcome) => log::info!("row {}: {outcome}", line + 1),
                        Err(e) => eprintln!("Error processing row {}: {e}", line + 1),
                    },
                    Err(e) => eprintln!("Error reading row {}: {e}", line + 1),
                }
            }

            let wallets = platform.repo.all_wallets().await.into_diagnostic()?;
            let mut writer = WalletWriter::new(io::stdout().lock());
            writer
                .write_wallets(&wallets, |wallet| wallet.owner.and_then(|id| runner.owner_name(id)))
                .into_diagnostic()?;
        }
    }
    Ok(())
}
