mod api;
mod database;
mod enricher;
mod ingest;
mod lake;
mod loader;
mod media;
mod ml;
mod pipeline;
mod scraper;
mod source;
mod utils;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::pipeline::{EnrichStage, LoadStage, Pipeline, ScrapeStage, TransformStage};
use crate::utils::config::Config;

#[derive(Parser, Debug)]
#[command(author, version, about = "Channel scraper, data lake and detection pipeline", long_about = None)]
struct Args {
    /// Settings file read before the process environment.
    #[arg(long, global = true, default_value = ".env")]
    env_file: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scrape configured channels into the data lake.
    Scrape {
        /// Stop each channel after this many new messages.
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Load data-lake message files into the staging table.
    Load,
    /// Run object detection over collected images.
    Detect,
    /// Run the external transformation commands.
    Transform,
    /// Scrape, load, detect and transform, stopping at the first failure.
    Run {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Start the read API.
    Serve {
        /// Overrides API_BIND_ADDR.
        #[arg(long)]
        bind: Option<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = Config::load(&args.env_file)?;

    let transform = || TransformStage::new(&config.transform_dir, config.transform_commands.clone());
    let mut pipeline = match args.command {
        Command::Scrape { limit } => Pipeline::new().then(ScrapeStage::new(&config, limit)),
        Command::Load => Pipeline::new().then(LoadStage::new(&config)),
        Command::Detect => Pipeline::new().then(EnrichStage::new(&config)),
        Command::Transform => Pipeline::new().then(transform()),
        Command::Run { limit } => Pipeline::new()
            .then(ScrapeStage::new(&config, limit))
            .then(LoadStage::new(&config))
            .then(EnrichStage::new(&config))
            .then(transform()),
        Command::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.bind_addr.clone());
            let runtime = tokio::runtime::Runtime::new()?;
            return runtime.block_on(api::serve(&bind, config.database_path.clone()));
        }
    };

    let reports = pipeline.run()?;
    for report in &reports {
        info!("{}", report);
    }
    Ok(())
}
