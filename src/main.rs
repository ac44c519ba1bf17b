//! skytrack: keeps the most recent state of every aircraft the feed reports
//! and forgets the ones that stop reporting.

mod batch;
mod cli;
mod error;

use crate::batch::Batch;
use crate::cli::{Cli, Command};
use crate::error::{ErrorKind, Result};
use clap::Parser;
use exn::ResultExt;
use serde::Serialize;
use skytrack_config::{Config, TrackingConfig};
use skytrack_tracking::{PoolSettings, StoreOptions, TrackingStore};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr; stdout carries command output.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err:?}");
            ExitCode::FAILURE
        },
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    if let Some(database) = cli.database {
        config.tracking.database = database;
    }
    let store = open(&config.tracking).await?;
    let result = dispatch(&store, cli.command).await;
    store.close().await;
    result
}

async fn open(config: &TrackingConfig) -> Result<TrackingStore> {
    let threshold = time::Duration::try_from(config.staleness()).or_raise(|| ErrorKind::Config)?;
    let options = StoreOptions::default().with_threshold(threshold).with_sweep_interval(config.sweep_interval());
    let settings = PoolSettings { max_connections: config.max_connections, busy_timeout: config.busy_timeout() };
    TrackingStore::open(&config.database, settings, options).await.or_raise(|| ErrorKind::Store)
}

async fn dispatch(store: &TrackingStore, command: Command) -> Result<()> {
    match command {
        Command::Ingest { file } => {
            let batch = read_batch(&file)?;
            let written = store.upsert_batch(&batch.positions, &batch.attributes).await.or_raise(|| ErrorKind::Store)?;
            tracing::info!(written, file = %file.display(), "Batch ingested");
        },
        Command::Query { manufacturer } => {
            let entities = store.try_query(&manufacturer).await.or_raise(|| ErrorKind::Store)?;
            print_lines(&entities)?;
        },
        Command::Groups => {
            let groups = store.groups().await.or_raise(|| ErrorKind::Store)?;
            print_lines(&groups)?;
        },
        Command::Clear { manufacturer } => {
            let removed = store.clear_group(&manufacturer).await.or_raise(|| ErrorKind::Store)?;
            println!("{removed}");
        },
        Command::Sweep => {
            let removed = store.sweep().await.or_raise(|| ErrorKind::Store)?;
            println!("{removed}");
        },
        Command::Health => {
            store.health().await.or_raise(|| ErrorKind::Store)?;
            println!("healthy");
        },
        Command::Run => {
            tracing::info!("Sweeper running; press Ctrl-C to stop");
            tokio::signal::ctrl_c().await.or_raise(|| ErrorKind::Signal)?;
            tracing::info!("Shutting down");
        },
    }
    Ok(())
}

fn read_batch(file: &Path) -> Result<Batch> {
    let parsed = if file == Path::new("-") {
        Batch::from_reader(io::stdin().lock())
    } else {
        let reader = File::open(file).or_raise(|| ErrorKind::Input(file.to_path_buf()))?;
        Batch::from_reader(io::BufReader::new(reader))
    };
    parsed.or_raise(|| ErrorKind::Input(file.to_path_buf()))
}

fn print_lines<T: Serialize>(items: &[T]) -> Result<()> {
    let mut out = BufWriter::new(io::stdout().lock());
    for item in items {
        serde_json::to_writer(&mut out, item).or_raise(|| ErrorKind::Output)?;
        out.write_all(b"\n").or_raise(|| ErrorKind::Output)?;
    }
    out.flush().or_raise(|| ErrorKind::Output)
}
