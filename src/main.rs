//! Anamnesis - resource association engine
//!
//! Entry point for the background service and the one-shot maintenance
//! commands.

use anamnesis_core::{
    api::{ApiServer, ApiServerConfig},
    config::default_data_dir,
    AssociationConfig, EventBroadcaster, Intervention, ModelRefreshJob, RecommendOptions,
    RecommendationEngine, RefreshScheduler, ResourceVisit, Session, UserSettings,
};
use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "anamnesis")]
#[command(about = "Learns which resources are used together and recommends associations", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML)
    #[arg(long, env = "ANAMNESIS_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory (overrides the configured one)
    #[arg(long, env = "ANAMNESIS_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Set log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the refresh scheduler, session and HTTP API until interrupted
    Serve {
        /// API server address (defaults to the configured one)
        #[arg(long)]
        addr: Option<SocketAddr>,
    },

    /// Rebuild the model once and print the report
    Refresh,

    /// Print associated resources for a path
    Recommend {
        path: String,

        /// Include resources below the similarity threshold
        #[arg(long)]
        all: bool,
    },

    /// Record a similar/dissimilar judgment for a resource pair
    Intervene {
        active: String,
        associated: String,
        #[arg(value_enum)]
        intervention: InterventionArg,
    },

    /// Record a resource visit into the visit store
    Visit {
        path: String,

        /// Application that showed the resource
        #[arg(long)]
        app: String,

        /// Window title
        #[arg(long)]
        window: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum InterventionArg {
    Similar,
    Dissimilar,
}

impl From<InterventionArg> for Intervention {
    fn from(arg: InterventionArg) -> Self {
        match arg {
            InterventionArg::Similar => Intervention::Similar,
            InterventionArg::Dissimilar => Intervention::Dissimilar,
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<AssociationConfig> {
    let mut config = match &cli.config {
        Some(path) => AssociationConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => {
            let default_path = default_data_dir().join("config.toml");
            if default_path.exists() {
                AssociationConfig::from_file(&default_path)?
            } else {
                AssociationConfig::default()
            }
        }
    };

    if let Some(data_dir) = &cli.data_dir {
        config.data_dir = data_dir.clone();
    }
    config.validate()?;
    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("Failed to create {}", config.data_dir.display()))?;

    debug!("Using data directory {}", config.data_dir.display());
    Ok(config)
}

async fn serve(config: AssociationConfig, addr: Option<SocketAddr>) -> anyhow::Result<()> {
    let addr = addr.unwrap_or(config.api_addr);
    let settings = match UserSettings::load(&config.settings_path()) {
        Ok(settings) => settings,
        Err(e) => {
            warn!("Ignoring unreadable settings: {}", e);
            UserSettings::default()
        }
    };

    let interval = config.refresh_interval;
    let max_duration = config.refresh_timeout;
    let engine = Arc::new(RecommendationEngine::open(config).await?);
    let events = EventBroadcaster::default();
    let session = Arc::new(Session::new(engine.clone(), events.clone(), settings));

    let scheduler = Arc::new(RefreshScheduler::new(
        Arc::new(ModelRefreshJob::new(engine)),
        events.clone(),
        interval,
        max_duration,
    ));
    let runner = scheduler.clone();
    let scheduler_task = tokio::spawn(async move {
        if let Err(e) = runner.start().await {
            warn!("Refresh scheduler stopped: {}", e);
        }
    });

    let server = ApiServer::new(
        ApiServerConfig { addr },
        session,
        events,
        Some(scheduler.clone()),
    );

    tokio::select! {
        result = server.serve() => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal, stopping gracefully...");
        }
    }

    scheduler.stop();
    if let Err(e) = scheduler_task.await {
        warn!("Refresh scheduler task failed: {}", e);
    }
    info!("Shut down complete");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // Own crates at the requested level, HTTP tracing only when noisy
    let filter = EnvFilter::new(format!(
        "anamnesis={level},anamnesis_core={level},tower_http=warn,tokio_stream=error",
        level = level.as_str().to_lowercase()
    ));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    debug!("Anamnesis v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = load_config(&cli)?;

    match cli.command {
        Commands::Serve { addr } => serve(config, addr).await,
        Commands::Refresh => {
            let engine = RecommendationEngine::open(config).await?;
            let report = engine.refresh().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Commands::Recommend { path, all } => {
            let settings = UserSettings::load(&config.settings_path())?;
            let engine = RecommendationEngine::open(config).await?;
            engine.refresh().await?;

            let options = RecommendOptions {
                show_all: all,
                ..RecommendOptions::from_settings(&settings)
            };
            let resources = engine.recommend(&path, options).await;
            if resources.is_empty() {
                eprintln!("No associated resources for {}", path);
            }
            for resource in resources {
                println!(
                    "{:.3}\t{:?}\t{}",
                    resource.similarity, resource.status, resource.path
                );
            }
            Ok(())
        }
        Commands::Intervene {
            active,
            associated,
            intervention,
        } => {
            let engine = RecommendationEngine::open(config).await?;
            engine.refresh().await?;
            let outcome = engine
                .record_intervention(&active, &associated, intervention.into())
                .await?;
            println!("{}", serde_json::to_string(&outcome)?);
            Ok(())
        }
        Commands::Visit { path, app, window } => {
            let engine = RecommendationEngine::open(config).await?;
            let mut visit = ResourceVisit::new(path, app);
            if let Some(title) = window {
                visit = visit.with_window(title);
            }
            engine.record_visit(&visit).await?;
            Ok(())
        }
    }
}
