use clap::{Parser, ValueEnum};
use miette::{IntoDiagnostic, Result};
use saga_pay::application::engine::SagaEngine;
use saga_pay::application::inbox::{Delivery, EventInbox, RetryPolicy};
use saga_pay::config::{MAX_TTL_SECS, SagaConfig};
use saga_pay::domain::ports::SagaStoreRef;
use saga_pay::infrastructure::in_memory::InMemoryStore;
use saga_pay::infrastructure::publisher::InMemoryPublisher;
use saga_pay::interfaces::csv::account_reader::AccountReader;
use saga_pay::interfaces::csv::account_writer::AccountWriter;
use saga_pay::interfaces::csv::payment_writer::PaymentWriter;
use saga_pay::interfaces::jsonl::message_reader::MessageReader;
use saga_pay::logging::init_logger;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Clone, Copy, ValueEnum)]
enum Report {
    Accounts,
    Payments,
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Inbox messages, one JSON object per line
    input: PathBuf,

    /// Opening balances CSV (`account,balance`)
    #[arg(long)]
    accounts: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Overrides EXPIRE_PAYMENT_TTL_SECONDS
    #[arg(long, value_parser = clap::value_parser!(u64).range(..=MAX_TTL_SECS))]
    ttl_secs: Option<u64>,

    /// Which final state to print
    #[arg(long, value_enum, default_value_t = Report::Accounts)]
    report: Report,

    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[cfg(feature = "storage-rocksdb")]
fn persistent_store(path: PathBuf) -> Result<SagaStoreRef> {
    let store = saga_pay::infrastructure::rocksdb::RocksDBStore::open(path).into_diagnostic()?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "storage-rocksdb"))]
fn persistent_store(_path: PathBuf) -> Result<SagaStoreRef> {
    eprintln!(
        "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
    );
    Ok(Arc::new(InMemoryStore::new()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(&cli.log_level, cli.json_logs).into_diagnostic()?;

    let mut config = SagaConfig::from_env();
    if let Some(ttl) = cli.ttl_secs {
        config = config.with_ttl_secs(ttl);
    }

    let store: SagaStoreRef = match cli.db_path {
        Some(path) => persistent_store(path)?,
        None => Arc::new(InMemoryStore::new()),
    };

    // Seed opening balances
    if let Some(path) = cli.accounts {
        let file = File::open(path).into_diagnostic()?;
        for account in AccountReader::new(file).accounts() {
            match account {
                Ok(account) => store.store_account(account).await.into_diagnostic()?,
                Err(e) => tracing::warn!(error = %e, "Skipping account row"),
            }
        }
    }

    let publisher = Arc::new(InMemoryPublisher::new(config.feed_capacity, 1024));
    let policy = RetryPolicy::from(&config);
    let engine = Arc::new(SagaEngine::new(store, publisher, config));
    let inbox = EventInbox::new(engine.clone(), policy);

    // Replay in file order; ordering matters for a recorded stream.
    let file = File::open(cli.input).into_diagnostic()?;
    for message in MessageReader::new(file).messages() {
        match message {
            Ok(message) => {
                if let Delivery::Rejected(e) = inbox.deliver(message).await {
                    tracing::warn!(error = %e, "Message rejected");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Skipping unreadable message"),
        }
    }
    engine.shutdown();

    let stdout = io::stdout();
    match cli.report {
        Report::Accounts => {
            let accounts = engine.accounts().await.into_diagnostic()?;
            AccountWriter::new(stdout.lock())
                .write_accounts(accounts)
                .into_diagnostic()?;
        }
        Report::Payments => {
            let payments = engine.payments().await.into_diagnostic()?;
            PaymentWriter::new(stdout.lock())
                .write_payments(&payments)
                .into_diagnostic()?;
        }
    }

    Ok(())
}
