//! Loader Service - Loads LCA disclosure extracts into the dimensional model
//!
//! Responsibilities:
//! - Discover yearly source files (csv/txt/xlsx)
//! - Map drifting column layouts onto canonical fields
//! - Upsert dimensions, then insert applications in batches
//! - Skip fiscal years that are already loaded
//! - Optionally refresh the aggregate views
//!
//! Re-running is safe: dimensions upsert, applications insert-or-ignore.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn};

use loader::naics::load_naics;
use loader::{Loader, LoaderConfig, MemoryStore, PgStore, Store, YearSelection};

#[derive(Parser, Debug)]
#[command(name = "loader", about = "Loads LCA disclosure extracts into the dimensional model")]
struct Args {
    /// Fiscal years to load (e.g. --years 2019 2020 or --years 2019,2020)
    #[arg(long, num_args = 1.., value_delimiter = ',', conflicts_with = "all")]
    years: Vec<i32>,

    /// Load every year found in the data directory
    #[arg(long)]
    all: bool,

    /// Directory holding the yearly extracts (overrides LCA_DATA_DIR)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Refresh aggregate views when at least one year finished
    #[arg(long)]
    refresh_views: bool,

    /// Reload years that already have applications
    #[arg(long)]
    force: bool,

    /// Load into memory only; nothing touches the database
    #[arg(long)]
    dry_run: bool,

    /// Apply schema migrations before loading
    #[arg(long)]
    migrate: bool,

    /// NAICS lookup CSV to load into naics_lookup
    #[arg(long)]
    naics: Option<PathBuf>,

    /// Debug-level logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn selection(&self) -> Option<YearSelection> {
        if self.all {
            Some(YearSelection::All)
        } else if !self.years.is_empty() {
            Some(YearSelection::Specific(self.years.clone()))
        } else {
            None
        }
    }
}

fn setup_logging(verbose: bool) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("loader={level}")));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_level(true)
                .with_timer(fmt::time::uptime())
                .with_writer(std::io::stderr),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    setup_logging(args.verbose);

    let selection = args.selection();
    if selection.is_none() && args.naics.is_none() {
        bail!("nothing to do: pass --years, --all or --naics");
    }

    let mut config = LoaderConfig::from_env();
    if let Some(dir) = &args.data_dir {
        config.data_dir = dir.clone();
    }
    config.refresh_views = args.refresh_views;
    config.force = args.force;

    println!("=== LCA Disclosure Loader ===");
    println!("Data dir: {}", config.data_dir.display());
    println!("Mode: {}", if args.dry_run { "dry-run" } else { "live" });

    let store: Arc<dyn Store> = if args.dry_run {
        if args.migrate {
            warn!("--migrate ignored in dry-run mode");
        }
        Arc::new(MemoryStore::new())
    } else {
        let db_url = config.db_url.clone().context("DB_URL env var missing")?;
        let store = PgStore::connect(&db_url, config.max_connections)
            .await
            .context("Failed to connect to database")?;
        if args.migrate {
            store.migrate().await.context("Failed to apply migrations")?;
            info!("migrations applied");
        }
        Arc::new(store)
    };

    if let Some(path) = &args.naics {
        let report = load_naics(store.as_ref(), path, config.dimension_batch_size)
            .await
            .with_context(|| format!("Failed to load NAICS lookup from {}", path.display()))?;
        println!("NAICS codes loaded: {} of {}", report.written, report.total);
    }

    let Some(selection) = selection else {
        return Ok(());
    };

    let loader = Loader::new(store, config);
    let summary = loader.run(selection).await.context("Load aborted")?;
    println!("\n{}", summary.render());

    if !summary.failed_years().is_empty() {
        warn!(years = ?summary.failed_years(), "some fiscal years failed");
    }
    Ok(())
}
