use clap::Parser;
use confwatch::core::{Configd, Settings};
use std::env;
use std::path::PathBuf;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Watches a configuration tree and serves its content and changes.
#[derive(Parser, Debug)]
#[command(name = "confwatchd", version, about)]
struct Cli {
    /// Settings file (YAML, TOML or JSON)
    #[arg(long, env = "CONFWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Root of the watched configuration tree
    #[arg(long)]
    root_folder: Option<PathBuf>,

    /// Content store backend
    #[arg(long)]
    store: Option<String>,

    /// Topic bus backend
    #[arg(long)]
    bus: Option<String>,

    /// Tree walker period in milliseconds
    #[arg(long)]
    fswalk_interval_ms: Option<u64>,

    /// Per-subscriber queue length
    #[arg(long)]
    queue_capacity: Option<usize>,

    /// What to do with a subscriber whose queue is full: drop-oldest or disconnect
    #[arg(long)]
    overflow_policy: Option<String>,

    /// Log at debug level
    #[arg(long)]
    debug: bool,
}

impl Cli {
    fn apply(self, mut settings: Settings) -> Settings {
        if let Some(root_folder) = self.root_folder {
            settings.root_folder = root_folder;
        }
        if let Some(store) = self.store {
            settings.store = store;
        }
        if let Some(bus) = self.bus {
            settings.bus = bus;
        }
        if let Some(interval) = self.fswalk_interval_ms {
            settings.walk_interval_ms = interval;
        }
        if let Some(capacity) = self.queue_capacity {
            settings.queue_capacity = capacity;
        }
        if let Some(policy) = self.overflow_policy {
            settings.overflow_policy = policy;
        }
        settings.debug |= self.debug;
        settings
    }
}

/// Merge the settings file, the environment and the flags, then validate once.
fn load_settings(cli: Cli) -> confwatch::error::Result<Settings> {
    let mut loader = Settings::loader().without_validation();
    if let Some(file) = &cli.config {
        loader = loader.with_file(file);
    }
    let settings = cli.apply(loader.load()?);

    #[cfg(feature = "validation")]
    {
        use confwatch::core::Validate;
        settings.validate()?;
    }
    Ok(settings)
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `debug`; `CONFWATCH_LOG_FORMAT=json` switches to JSON lines.
fn init_tracing(debug: bool) -> Result<(), Box<dyn std::error::Error>> {
    let default_level = if debug { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let format = env::var("CONFWATCH_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let registry = tracing_subscriber::registry().with(env_filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_target(true).with_level(true))
                .try_init()?;
        }
        _ => {
            registry
                .with(
                    fmt::layer()
                        .pretty()
                        .with_target(true)
                        .with_level(true)
                        .with_thread_ids(true),
                )
                .try_init()?;
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl+C, shutting down"),
        () = terminate => info!("received SIGTERM, shutting down"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let settings = load_settings(cli)?;

    init_tracing(settings.debug)?;

    info!(
        root_folder = %settings.root_folder.display(),
        store = %settings.store,
        bus = %settings.bus,
        walk_interval_ms = settings.walk_interval_ms,
        queue_capacity = settings.queue_capacity,
        overflow_policy = %settings.overflow_policy,
        "starting confwatchd"
    );

    let daemon = match Configd::from_settings(&settings).await {
        Ok(daemon) => daemon,
        Err(err) => {
            error!(error = %err, "failed to start");
            return Err(err.into());
        }
    };

    shutdown_signal().await;

    daemon.shutdown().await;
    info!("goodbye");
    Ok(())
}
