use std::path::PathBuf;

use anyhow::Result;
use apiwatch::config::{AppConfig, LogFormat};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "apiwatch",
    about = "Threshold-based anomaly detection for monitored HTTP APIs",
    version,
    long_about = None
)]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, global = true, env = "APIWATCH_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (API server + scheduled detection)
    Serve {
        /// Bind address (overrides [server] bind)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Run one detection pass over the trailing window
    Detect {
        /// Window length in minutes (defaults to [schedule] manual_window_minutes)
        #[arg(long)]
        minutes: Option<u32>,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Record one performance sample for a registered API
    Record {
        /// API id
        #[arg(long)]
        api: i64,

        /// Error rate as a fraction (0.0 - 1.0)
        #[arg(long)]
        error_rate: Option<f64>,

        /// Response time in milliseconds
        #[arg(long)]
        response_time_ms: Option<f64>,
    },

    /// Manage monitored APIs
    Apis {
        #[command(subcommand)]
        action: ApisAction,
    },

    /// List recently detected anomalies
    Anomalies {
        /// Maximum number of anomalies to show
        #[arg(long, default_value = "20")]
        limit: usize,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ApisAction {
    /// List registered APIs
    List,

    /// Register a new API
    Add {
        /// Unique API name
        #[arg(long)]
        name: String,

        /// Base URL of the API
        #[arg(long)]
        url: String,
    },
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = AppConfig::resolve(cli.config.as_deref())?;

    // Initialize tracing
    init_tracing(config.logging.format);
    match &config.source {
        Some(path) => tracing::info!(path = %path.display(), "Loaded configuration"),
        None => tracing::debug!("No config file found, using compiled-in defaults"),
    }

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            tracing::info!(bind = %config.server.bind, "Starting apiwatch daemon");
            apiwatch::serve(config).await?;
        }
        Commands::Detect { minutes, json } => {
            let pool = apiwatch::storage::open_pool(&config.storage.db_path)?;
            let detector = apiwatch::build_detector(&config, pool)?;
            let length = match minutes {
                Some(m) => chrono::Duration::minutes(i64::from(m)),
                None => config.schedule.manual_window(),
            };

            let report = apiwatch::scheduler::trigger_manual_detection(&detector, length).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("\n=== apiwatch Detection Report ===");
                println!("Window:          {} .. {}", report.scan_window_start, report.scan_window_end);
                println!("Samples scanned: {}", report.summary.samples_scanned);
                println!("New anomalies:   {}", report.anomalies_found);
                println!("Already known:   {}", report.summary.duplicates);
                for failure in &report.summary.failures {
                    println!(" ! sample {}: {}", failure.sample_id, failure.error);
                }
                println!("=================================\n");
            }
        }
        Commands::Record {
            api,
            error_rate,
            response_time_ms,
        } => {
            let pool = apiwatch::storage::open_pool(&config.storage.db_path)?;
            let sample = apiwatch::storage::samples::record(
                &pool,
                apiwatch::storage::NewSample {
                    api_id: api,
                    timestamp: None,
                    error_rate,
                    response_time_ms,
                },
            )
            .await?;
            println!("Sample {} recorded for API {} at {}.", sample.id, sample.api_id, sample.timestamp);
        }
        Commands::Apis { action } => {
            let pool = apiwatch::storage::open_pool(&config.storage.db_path)?;
            match action {
                ApisAction::List => {
                    let list = apiwatch::storage::apis::list(&pool).await?;
                    if list.is_empty() {
                        println!("No APIs registered.");
                    } else {
                        println!("{:<6} | {:<20} | Url", "Id", "Name");
                        println!("{:-<6}-|-{:-<20}-|-{:-<30}", "", "", "");
                        for api in list {
                            println!("{:<6} | {:<20} | {}", api.id, api.name, api.url);
                        }
                    }
                }
                ApisAction::Add { name, url } => {
                    let api = apiwatch::storage::apis::register(&pool, &name, &url).await?;
                    println!("API '{}' registered with id {}.", api.name, api.id);
                }
            }
        }
        Commands::Anomalies { limit, json } => {
            let pool = apiwatch::storage::open_pool(&config.storage.db_path)?;
            let store = apiwatch::storage::SqliteAnomalyStore::new(pool);
            let anomalies = store.list_recent(limit).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&anomalies)?);
            } else if anomalies.is_empty() {
                println!("No anomalies recorded.");
            } else {
                println!("{:<6} | {:<8} | {:<8} | {:<25} | Type", "Id", "Severity", "Sample", "Detected");
                println!("{:-<6}-|-{:-<8}-|-{:-<8}-|-{:-<25}-|-{:-<34}", "", "", "", "", "");
                for a in anomalies {
                    println!(
                        "{:<6} | {:<8} | {:<8} | {:<25} | {}",
                        a.id,
                        a.severity.as_str(),
                        a.sample_id,
                        a.detected_at.to_rfc3339(),
                        a.kind
                    );
                }
            }
        }
    }

    Ok(())
}
