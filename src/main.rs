mod cli;
mod error;

use crate::cli::{Cli, Command, FetchArgs, parse_url_list};
use crate::error::{ErrorKind, Result};
use clap::Parser;
use exn::ResultExt;
use hoard_cache::BinaryCacheStore;
use hoard_config::Config;
use hoard_fetch::{CancellationToken, FetchWorker, Transport};
use hoard_library::{Reconciler, run_fetch};
use hoard_record::{AssetRecord, Inventory, normalize_id};
use hoard_storage::Scanner;
use std::collections::BTreeMap;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = ?err, "hoard failed");
            ExitCode::FAILURE
        },
    }
}

/// Log targets of the workspace crates.
const TARGETS: [&str; 8] = [
    "hoard",
    "hoard_cache",
    "hoard_config",
    "hoard_fetch",
    "hoard_library",
    "hoard_record",
    "hoard_snapshot",
    "hoard_storage",
];

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let default = TARGETS.map(|target| format!("{target}={level}")).join(",");
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    let reconciler = Reconciler::new(
        &config.library.root,
        &config.snapshots.directory,
        BinaryCacheStore::new(&config.cache.path),
    )
    .with_scanner(Scanner::new(&config.library.extension, &config.library.classification_tags))
    .with_snapshot_extension(&config.snapshots.extension)
    .force_rescan(cli.rescan || config.cache.force_rescan);

    match cli.command {
        Command::Reconcile => {
            let inventory = reconciler.run().await;
            print_summary(&inventory);
        },
        Command::Show { ids } => {
            let inventory = reconciler.run().await;
            let wanted: Vec<String> = ids.iter().map(|id| normalize_id(id)).collect();
            inventory
                .values()
                .filter(|record| wanted.is_empty() || wanted.contains(&record.id))
                .for_each(|record| println!("{}", status_line(record)));
        },
        Command::Fetch(args) => fetch(config, reconciler, args).await?,
    }
    Ok(())
}

async fn fetch(mut config: Config, reconciler: Reconciler, args: FetchArgs) -> Result<()> {
    let mut urls = args.urls;
    if let Some(file) = &args.file {
        let contents = tokio::fs::read_to_string(file).await.or_raise(|| ErrorKind::UrlList(file.clone()))?;
        urls.extend(parse_url_list(&contents));
    }
    if urls.is_empty() {
        exn::bail!(ErrorKind::NoUrls);
    }

    if let Some(transport) = args.transport {
        config.fetch.transport = transport;
    }
    if let Some(concurrency) = args.concurrency {
        config.fetch.concurrency = concurrency;
    }
    if let Some(destination) = args.destination {
        config.fetch.destination = Some(destination);
    }
    config.validate().or_raise(|| ErrorKind::Config)?;

    let transport = Transport::from_name(&config.fetch.transport, &config.fetch.transport_settings())
        .or_raise(|| ErrorKind::Config)?;
    let token = CancellationToken::new();
    tokio::spawn({
        let token = token.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted; stopping after the current attempt");
                token.cancel();
            }
        }
    });
    let worker = FetchWorker::new(transport)
        .with_policy(config.fetch.retry_policy())
        .with_protocol(&config.fetch.protocol)
        .with_cancellation(token);

    let mut inventory = reconciler.run().await;
    let destination = config.fetch.destination(&config.library);
    let report =
        run_fetch(&mut inventory, urls, &worker, Some(destination), config.fetch.concurrency, &reconciler).await;

    println!(
        "downloaded {}, already on disk {}, skipped {}, failed {}{}",
        report.downloaded,
        report.existing,
        report.skipped,
        report.failed,
        if report.cancelled { " (cancelled)" } else { "" },
    );
    if let Some(path) = report.snapshot {
        println!("snapshot written to {}", path.display());
    }
    Ok(())
}

fn print_summary(inventory: &Inventory) {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for record in inventory.values() {
        *counts.entry(record.dl_status.as_str()).or_default() += 1;
    }
    println!("{} assets", inventory.len());
    for (status, count) in counts {
        println!("  {status}: {count}");
    }
}

fn status_line(record: &AssetRecord) -> String {
    let location = record.locations.first().map(|path| path.display().to_string());
    format!(
        "{}\t{}\t{}\t{}",
        record.id,
        record.dl_status,
        record.file_size.as_deref().unwrap_or("-"),
        location.as_deref().or(record.error_info.as_deref()).unwrap_or("-"),
    )
}
