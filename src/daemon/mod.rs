use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
    sync::Arc,
};

use anyhow::{Context, Result};
use bridge::Bridge;
use clap::Args;
use collector::EventCollector;
use storage::{log_store::JsonLogStore, received_storage::ReceivedStorage};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::utils::{
    clock::{Clock, DefaultClock},
    dir::create_application_default_path,
};

pub mod args;
pub mod bridge;
pub mod collector;
pub mod shutdown;
pub mod storage;

pub const DEFAULT_BIND: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 5000);

/// Daemon options shared by `dwelltime serve`, `dwelltime init` and the daemon binary.
#[derive(Args, Debug, Clone)]
pub struct DaemonConfig {
    #[arg(
        long,
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    pub dir: Option<PathBuf>,
    #[arg(long, default_value_t = DEFAULT_BIND, help = "Address the HTTP bridge listens on")]
    pub bind: SocketAddr,
    #[arg(
        long = "plots-dir",
        help = "Directory with plot images for the gallery. Defaults to <dir>/plots"
    )]
    pub plots_dir: Option<PathBuf>,
}

/// [DaemonConfig] with every default filled in and every path made absolute, so it survives
/// the daemon changing its working directory.
#[derive(Debug, Clone)]
pub struct DaemonSettings {
    pub dir: PathBuf,
    pub bind: SocketAddr,
    pub plots_dir: PathBuf,
}

impl DaemonConfig {
    pub fn resolve(&self) -> Result<DaemonSettings> {
        let dir = match &self.dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                std::path::absolute(dir)?
            }
            None => create_application_default_path()?,
        };
        let plots_dir = match &self.plots_dir {
            Some(plots_dir) => std::path::absolute(plots_dir)?,
            None => dir.join("plots"),
        };
        Ok(DaemonSettings {
            dir,
            bind: self.bind,
            plots_dir,
        })
    }

    /// The same configuration as command line arguments, for spawning a daemon process.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec!["--bind".to_string(), self.bind.to_string()];
        if let Some(dir) = &self.dir {
            args.extend(["--dir".to_string(), dir.display().to_string()]);
        }
        if let Some(plots_dir) = &self.plots_dir {
            args.extend(["--plots-dir".to_string(), plots_dir.display().to_string()]);
        }
        args
    }
}

/// Represents the starting point for the daemon
pub async fn start_daemon(settings: DaemonSettings) -> Result<()> {
    let listener = TcpListener::bind(settings.bind)
        .await
        .with_context(|| format!("Failed to bind {}, is another daemon running?", settings.bind))?;

    let shutdown_token = CancellationToken::new();

    let (_, result) = tokio::join!(
        shutdown::detect_shutdown(shutdown_token.clone()),
        run_daemon(&settings, listener, shutdown_token.clone(), DefaultClock),
    );

    result
}

/// Runs the collector and the bridge until `shutdown` fires. Either of them stopping brings the
/// other one down too.
async fn run_daemon(
    settings: &DaemonSettings,
    listener: TcpListener,
    shutdown: CancellationToken,
    clock: impl Clock,
) -> Result<()> {
    info!("Starting daemon in {}", settings.dir.display());

    let store = JsonLogStore::new(settings.dir.join("storage"))?;
    let (collector, handle) = EventCollector::start(store).await;
    let received = ReceivedStorage::new(settings.dir.join("received"))?;
    let bridge = Bridge::new(
        handle,
        received,
        settings.plots_dir.clone(),
        Arc::new(clock),
    );

    let (collection_result, bridge_result) = tokio::join!(
        async {
            let result = collector.run(shutdown.clone()).await;
            shutdown.cancel();
            result
        },
        async {
            let result = bridge.serve(listener, shutdown.clone()).await;
            shutdown.cancel();
            result
        },
    );

    if let Err(e) = &collection_result {
        error!("Collector got an error {e:?}");
    }

    if let Err(e) = &bridge_result {
        error!("Bridge got an error {e:?}");
    }

    collection_result.and(bridge_result)
}
