use anyhow::Result;
use clap::{Parser, Subcommand};
use qorch::transport;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), env!("QORCH_VERSION_SUFFIX"));

#[derive(Parser)]
#[command(name = "qorch")]
#[command(author, version = VERSION, about = "Query orchestration: decompose, classify, route and aggregate", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server (POST /user_query)
    Serve {
        /// Port to listen on (default from config, 8008)
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to (default from config, 0.0.0.0)
        #[arg(long)]
        host: Option<String>,

        /// Configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Run a single query through the pipeline
    Ask {
        /// The query text
        query: String,

        /// Configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show the configured category routes
    Routes {
        /// Configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "qorch=debug"
    } else {
        "qorch=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Serve { port, host, config } => {
            tracing::info!("Starting qorch {}", VERSION);
            transport::cli::run_serve(host, port, config.as_deref()).await?;
        }
        Commands::Ask {
            query,
            config,
            format,
        } => {
            transport::cli::run_ask(&query, config.as_deref(), &format).await?;
        }
        Commands::Routes { config } => {
            transport::cli::run_routes(config.as_deref())?;
        }
    }

    Ok(())
}
