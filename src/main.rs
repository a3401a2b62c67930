use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lanshare::config::{CollisionPolicy, RootSpec};
use lanshare::{Config, Service};

#[derive(Parser, Debug)]
#[command(name = "lanshare")]
#[command(about = "Share this device's files with browsers on the local network")]
#[command(version)]
struct Cli {
    /// Port to listen on [default: 8000]
    #[arg(short, long, env = "LANSHARE_PORT")]
    port: Option<u16>,

    /// Address to bind to [default: 0.0.0.0]
    #[arg(short, long, env = "LANSHARE_BIND")]
    bind: Option<String>,

    /// Login username
    #[arg(short, long, env = "LANSHARE_USERNAME")]
    username: Option<String>,

    /// Login password
    #[arg(long, env = "LANSHARE_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Share NAME=PATH instead of discovered storage (repeatable)
    #[arg(short, long = "root", env = "LANSHARE_ROOT", value_delimiter = ',')]
    roots: Vec<RootSpec>,

    /// What to do when an upload's name is taken
    #[arg(long, env = "LANSHARE_ON_COLLISION", value_enum)]
    on_collision: Option<CollisionPolicy>,

    /// Enable verbose logging
    #[arg(short, long, env = "LANSHARE_VERBOSE")]
    verbose: bool,

    /// Config file path (optional)
    #[arg(short, long, env = "LANSHARE_CONFIG")]
    config: Option<PathBuf>,
}

impl Cli {
    /// Layer command-line values over `config`.
    fn apply(self, mut config: Config) -> Config {
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        if let Some(username) = self.username {
            config.username = username;
        }
        if let Some(password) = self.password {
            config.password = password;
        }
        if !self.roots.is_empty() {
            config.roots = self.roots;
        }
        if let Some(policy) = self.on_collision {
            config.on_collision = policy;
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose {
        "lanshare=debug,tower_http=debug"
    } else {
        "lanshare=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load config from file if provided, otherwise use defaults
    let config = if let Some(config_path) = &cli.config {
        Config::from_file(config_path)?
    } else {
        Config::default()
    };
    let config = cli.apply(config);

    let service = Service::with_discovery(config);

    if service.roots().is_empty() {
        error!("No shareable storage found; pass --root NAME=PATH");
        return Err(lanshare::ServiceError::NoStorageRoots.into());
    }
    for root in service.roots().iter() {
        info!("Storage {:?}: {}", root.name, root.path.display());
    }

    if service.config().uses_default_credentials() {
        warn!("Using the default login; set --username and --password before sharing on an untrusted network");
    }

    service.start(service.config().port).await?;
    match service.access_url() {
        Some(url) => info!("Open {} on another device", url),
        None => warn!("Listener started but no address is available"),
    }

    shutdown_signal().await;
    info!("Shutting down");
    service.stop().await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
