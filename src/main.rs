// Pdfbirch - Main Entry Point
//
// Quota-limited filler PDF generator:
// - HTTP server with per-identity sliding-window download quota
// - Offline rendering of a single document for inspection

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pdfbirch::config::Config;
use pdfbirch::document::{download_filename, DocumentRenderer, FillerRenderer};
use pdfbirch::server;
use std::fs;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

/// Pdfbirch: Entropy Engine
#[derive(Parser, Debug)]
#[command(name = "pdfbirch")]
#[command(author = "Pdfbirch Contributors")]
#[command(version)]
#[command(about = "Quota-limited filler PDF generator", long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Path to config file (default: ~/.config/pdfbirch/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Override the listen port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Render one document to a file
    Render {
        /// Output path (default: Dataset_NNNN.pdf in the current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Seed for reproducible output
        #[arg(long)]
        seed: Option<u64>,

        /// Override the configured page count
        #[arg(long)]
        pages: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    init_tracing(&config, args.verbose)?;

    info!("Pdfbirch v{} starting...", env!("CARGO_PKG_VERSION"));

    match args.command {
        Some(Commands::Serve { port }) => {
            if let Some(port) = port {
                config.server.port = port;
                config.validate()?;
            }
            server::serve(&config).await?;
        }
        Some(Commands::Render {
            output,
            seed,
            pages,
        }) => {
            if let Some(pages) = pages {
                config.document.pages = pages;
            }
            render(&config, output, seed)?;
        }
        None => {
            info!("No command specified. Use \"pdfbirch --help\" for usage.");
        }
    }

    Ok(())
}

fn init_tracing(config: &Config, verbose: bool) -> Result<()> {
    let level = if verbose {
        Level::DEBUG
    } else {
        config.log_level()?
    };

    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        );

    match config.logging.format.to_lowercase().as_str() {
        "json" => builder.json().init(),
        "pretty" => builder.pretty().init(),
        _ => builder.compact().init(),
    }

    Ok(())
}

/// Render a single document without touching any quota
fn render(config: &Config, output: Option<PathBuf>, seed: Option<u64>) -> Result<()> {
    let mut renderer =
        FillerRenderer::new(config.document.clone()).context("Invalid document configuration")?;
    if let Some(seed) = seed {
        renderer = renderer.with_seed(seed);
    }

    let bytes = renderer.render().context("Failed to render document")?;
    let path = output.unwrap_or_else(|| PathBuf::from(download_filename()));

    fs::write(&path, &bytes).with_context(|| format!("Failed to write {:?}", path))?;
    info!("Wrote {} bytes to {:?}", bytes.len(), path);
    println!("{}", path.display());

    Ok(())
}
