use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use rental_scout::export::{export_partition, ExportSink, FileSink, StdoutSink};
use rental_scout::scrapers::{Fetcher, HttpFetcher};
use rental_scout::storage::{KeyValueStore, LocalStorage};
use rental_scout::{Config, Partition, PollHandle, PollLoop, RecordStore};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Rental Scout - watches a rental search for new listings
#[derive(Parser, Debug)]
#[command(name = "rental-scout", version, about = "Watches a rental search for new listings")]
struct Cli {
    /// Directory holding config.toml and the listing files
    #[arg(short, long, default_value = "storage")]
    storage_dir: PathBuf,

    /// Config file (default: {storage_dir}/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll the search and collect new listings
    Watch {
        /// Seconds between polls, overriding the config (0 starts paused)
        #[arg(long)]
        interval: Option<u64>,

        /// Fetch a single page and exit
        #[arg(long)]
        once: bool,

        /// Render pages in headless Chrome (needs the `browser` feature)
        #[arg(long)]
        browser: bool,
    },

    /// Print the listings of a partition
    List {
        #[arg(default_value = "unseen")]
        partition: Partition,
    },

    /// Mark a listing as seen
    Hide { id: String },

    /// Mark every new listing as seen
    HideAll,

    /// Save or unsave a listing
    Favorite { id: String },

    /// Move a listing from one partition to another
    Move {
        id: String,
        from: Partition,
        to: Partition,
    },

    /// Export a partition as JSON
    Export {
        partition: Partition,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate the configuration file
    Validate,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| cli.storage_dir.join("config.toml"));
    let config = Config::load_or_default(&config_path);

    let storage: Arc<dyn KeyValueStore> = Arc::new(LocalStorage::new(&cli.storage_dir));

    match cli.command {
        Command::Watch {
            interval,
            once,
            browser,
        } => {
            config.validate().context("Invalid configuration")?;
            let store = RecordStore::load(storage).await;
            let fetcher = make_fetcher(&config, browser)?;
            let mut poll = PollLoop::from_config(&config, fetcher, store)
                .context("Failed to set up poll loop")?;
            if let Some(secs) = interval {
                poll = poll.with_interval(Some(Duration::from_secs(secs)));
            }

            if once {
                let report = poll.tick().await.context("Poll failed")?;
                info!(
                    "Fetched {}: {} listings, {} new, next page {} ({})",
                    report.page, report.extracted, report.added, report.next_page, report.direction
                );
                return Ok(());
            }

            info!("🏠 Rental Scout watching {}", config.source.host_url);
            info!("Commands on stdin: pause | resume [secs] | status | quit");

            let handle = poll.handle();
            let resume_interval = config.poll.interval().unwrap_or(Duration::from_secs(10));
            let shutdown = async move {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Interrupted"),
                    _ = control(handle, resume_interval) => {}
                }
            };
            poll.run(shutdown).await;

            let store = poll.into_store();
            info!(
                "Stopped with {} new, {} seen, {} saved listings",
                store.view(Partition::Unseen).len(),
                store.len(Partition::Seen),
                store.len(Partition::Favorite)
            );
        }

        Command::List { partition } => {
            let store = RecordStore::load(storage).await;
            let rentals = store.view(partition);
            info!("{} {} listings", rentals.len(), partition);

            for (i, rental) in rentals.iter().enumerate() {
                let saved = if store.contains_in(Partition::Favorite, &rental.id) {
                    " ❤️"
                } else {
                    ""
                };
                println!("{}. {} ({}){}", i + 1, rental.address, rental.price, saved);
                if !rental.beds.is_empty() {
                    println!("   {} bed(s)", rental.beds);
                }
                println!("   ID: {}", rental.id);
                println!("   URL: {}", rental.url);
                println!("   Map: {}", rental.gmaps_url);
                println!();
            }
        }

        Command::Hide { id } => {
            let mut store = RecordStore::load(storage).await;
            if store.hide(&id).await.context("Failed to save seen listings")? {
                info!("Hid {}", id);
            } else {
                warn!("{} is unknown or already hidden", id);
            }
        }

        Command::HideAll => {
            let mut store = RecordStore::load(storage).await;
            let hidden = store
                .hide_all()
                .await
                .context("Failed to save seen listings")?;
            info!("Hid {} listings", hidden);
        }

        Command::Favorite { id } => {
            let mut store = RecordStore::load(storage).await;
            match store
                .toggle_favorite(&id)
                .await
                .context("Failed to save favorites")?
            {
                Some(true) => info!("Saved {}", id),
                Some(false) => info!("Unsaved {}", id),
                None => bail!("Unknown listing {}", id),
            }
        }

        Command::Move { id, from, to } => {
            let mut store = RecordStore::load(storage).await;
            if store
                .move_record(&id, from, to)
                .await
                .context("Failed to save listings")?
            {
                info!("Moved {} from {} to {}", id, from, to);
            } else {
                warn!("{} is not in {}", id, from);
            }
        }

        Command::Export { partition, output } => {
            let store = RecordStore::load(storage).await;
            let sink: Box<dyn ExportSink> = match output {
                Some(path) => Box::new(FileSink::new(path)),
                None => Box::new(StdoutSink),
            };
            if let Err(e) = export_partition(&store, partition, sink.as_ref()) {
                error!("Export to {} failed: {}", sink.describe(), e);
            }
        }

        Command::Validate => {
            info!("Validating {}", config_path.display());
            config.validate().context("Config validation failed")?;
            info!("✓ Config OK, start page {}", config.source.start_path());
        }
    }

    Ok(())
}

fn make_fetcher(config: &Config, browser: bool) -> anyhow::Result<Arc<dyn Fetcher>> {
    if browser {
        #[cfg(feature = "browser")]
        {
            let fetcher = rental_scout::scrapers::BrowserFetcher::new(Duration::from_secs(8))
                .context("Failed to start headless Chrome")?;
            return Ok(Arc::new(fetcher));
        }
        #[cfg(not(feature = "browser"))]
        bail!("--browser needs a build with the `browser` feature");
    }
    let fetcher = HttpFetcher::new(&config.http).context("Failed to create HTTP client")?;
    Ok(Arc::new(fetcher))
}

/// Read loop-control commands from stdin until `quit`.
async fn control(handle: PollHandle, resume_interval: Duration) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            // No terminal attached; keep running until interrupted
            Ok(None) | Err(_) => return std::future::pending().await,
        };

        let mut words = line.split_whitespace();
        match (words.next(), words.next()) {
            (Some("pause"), _) => handle.pause(),
            (Some("resume"), secs) => {
                let interval = secs
                    .and_then(|s| s.parse().ok())
                    .map(Duration::from_secs)
                    .unwrap_or(resume_interval);
                handle.set_interval(Some(interval));
            }
            (Some("status"), _) => match serde_json::to_string_pretty(&handle.status()) {
                Ok(json) => println!("{json}"),
                Err(e) => warn!("Could not render status: {}", e),
            },
            (Some("quit"), _) => return,
            (None, _) => {}
            (Some(other), _) => warn!("Unknown command '{}'", other),
        }
    }
}
