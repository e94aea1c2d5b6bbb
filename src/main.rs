//! mai-streaming CLI entry point

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use mai_streaming::{
    commands::{
        cmd_ddos, cmd_live, cmd_offline, cmd_status, print_offline_report, print_run_summary,
        print_status, LiveSource,
    },
    config::Config,
    error::Result,
    locate::FileFormat,
    progress::LogWriterFactory,
    store::{BulkStore, ElasticStore},
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "mai-streaming")]
#[command(version, about = "Idempotent flow-record ingestion into Elasticsearch", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Elasticsearch URL
    #[arg(long, global = true, env = "ES_URL")]
    es_url: Option<String>,

    /// Target index
    #[arg(long, global = true, env = "ES_INDEX")]
    index: Option<String>,

    /// Documents per bulk request
    #[arg(long, global = true, env = "ES_CHUNK_SIZE")]
    chunk_size: Option<usize>,

    /// Rows read per batch
    #[arg(long, global = true)]
    batch_size: Option<usize>,

    /// Files processed concurrently
    #[arg(long, global = true)]
    workers: Option<usize>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract captures (if any) and ingest a directory once
    Offline {
        /// Directory with pcaps or flow files
        input_dir: PathBuf,

        /// Where extracted flow files go
        output_dir: Option<PathBuf>,
    },

    /// Continuously ingest a directory, capturing from an interface if needed
    Live {
        /// Network interface, or an existing directory to watch
        target: String,

        /// Where captured flow files go
        output_dir: Option<PathBuf>,
    },

    /// Ingest windowed attack-traffic files once
    Ddos {
        /// Directory with window files
        input_dir: PathBuf,

        /// Input format (csv or orc)
        #[arg(long, default_value = "csv")]
        format: FileFormat,
    },

    /// Show done and pending files of a directory
    Status {
        /// Directory to inspect
        dir: PathBuf,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
}

async fn run() -> Result<bool> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with((!cli.json).then(|| fmt::layer().with_writer(LogWriterFactory)))
        .with(cli.json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with(filter)
        .init();

    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "mai-streaming", &mut std::io::stdout());
        return Ok(true);
    }

    let config = load_config(&cli)?;

    if let Commands::Status { dir } = &cli.command {
        let status = cmd_status(&config, dir)?;
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&status)?);
        } else {
            print_status(&status);
        }
        return Ok(true);
    }

    let store = connect_store(&config).await?;
    let cancel = cancel_on_ctrl_c();
    let show_progress = !cli.json;

    match cli.command {
        Commands::Offline {
            input_dir,
            output_dir,
        } => {
            let report = cmd_offline(
                &config,
                store,
                &input_dir,
                output_dir.as_deref(),
                show_progress,
                &cancel,
            )
            .await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_offline_report(&report);
            }
            Ok(report.run.is_success())
        }

        Commands::Live { target, output_dir } => {
            let source = LiveSource::resolve(&target, output_dir.as_deref(), &config);
            let summary = cmd_live(&config, store, source, cancel).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("\n✓ Live ingestion stopped");
                print_run_summary(&summary);
            }
            Ok(true)
        }

        Commands::Ddos { input_dir, format } => {
            let summary =
                cmd_ddos(&config, store, &input_dir, format, show_progress, &cancel).await?;

            if cli.json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("\n✓ Attack-traffic ingestion complete");
                print_run_summary(&summary);
            }
            Ok(summary.is_success())
        }

        Commands::Status { .. } | Commands::Completions { .. } => unreachable!(),
    }
}

/// File config, then CLI flags and environment on top
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::load_or_default(cli.config.as_deref())?;

    if let Some(url) = &cli.es_url {
        config.store.url = url.clone();
    }
    if let Some(index) = &cli.index {
        config.store.index = index.clone();
    }
    if let Some(chunk_size) = cli.chunk_size {
        config.store.chunk_size = chunk_size;
    }
    if let Some(batch_size) = cli.batch_size {
        config.pipeline.batch_size = batch_size;
    }
    if let Some(workers) = cli.workers {
        config.pipeline.workers = workers;
    }

    config.validate()?;
    Ok(config)
}

/// Build the store client; an unreachable store is only a warning here
async fn connect_store(config: &Config) -> Result<Arc<dyn BulkStore>> {
    let store = ElasticStore::new(&config.store)?;
    match store.ping().await {
        Ok(()) => info!("Connected to {}", store.base_url()),
        Err(e) => warn!("{}; files will be retried until it is reachable", e),
    }
    Ok(Arc::new(store))
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, finishing in-flight batches");
            token.cancel();
        }
    });
    cancel
}
