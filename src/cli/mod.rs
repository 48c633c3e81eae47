pub mod daemon_path;
pub mod logs;
pub mod observe;
pub mod process;
pub mod received;

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Result;
use clap::{Parser, Subcommand};
use process::{restart_server, stop_server};
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::{
    client::{RemoteCollector, DEFAULT_SERVER},
    daemon::{shutdown::detect_shutdown, start_daemon, DaemonConfig},
    observer::{domain_watch::DEFAULT_POLL_INTERVAL, notify::HttpNotifier},
    utils::{clock::DefaultClock, logging::enable_console_logging},
    viewer::csv::EXPORT_FILE_NAME,
};

#[derive(Parser, Debug)]
#[command(name = "Dwelltime", version, long_about = None)]
#[command(about = "Records how long you dwell on each website", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, help = "Enable logging")]
    log: bool,
    #[arg(long, default_value = DEFAULT_SERVER, help = "Address of the running daemon")]
    server: Url,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Starts a daemon for the application")]
    Init {
        #[command(flatten)]
        config: DaemonConfig,
    },
    #[command(
        about = "Run a daemon directly in current console. Used for debugging and for environments that supervise processes themselves"
    )]
    Serve {
        #[command(flatten)]
        config: DaemonConfig,
    },
    #[command(about = "Stop currently running daemon.")]
    Stop {},
    #[command(about = "Show the recorded time log, newest first")]
    Logs {
        #[arg(long, short, help = "Keep the view updated as new entries arrive")]
        follow: bool,
    },
    #[command(about = "Export the whole time log as CSV")]
    Export {
        #[arg(long, short, default_value = EXPORT_FILE_NAME)]
        out: PathBuf,
    },
    #[command(about = "Clear the time log")]
    Reset {},
    #[command(
        about = "Observe one page described by JSON lines on stdin, as a browser native messaging host sends them"
    )]
    Observe {
        #[arg(
            long = "report-endpoint",
            help = "Where time spent reports are also posted. Defaults to http://127.0.0.1:5000/log"
        )]
        report_endpoint: Option<String>,
        #[arg(long = "poll-millis", help = "How often the page location is checked")]
        poll_millis: Option<u64>,
    },
    #[command(about = "Show side channel reports, totalled per domain or as domain transitions")]
    Received {
        #[command(flatten)]
        command: received::ReceivedCommand,
    },
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    enable_console_logging(logging_level);

    let remote = RemoteCollector::new(args.server);

    match args.commands {
        Commands::Init { config } => restart_server(&config),
        Commands::Stop {} => {
            let stopped = stop_server()?;
            if stopped == 0 {
                println!("No daemon was running");
            } else {
                println!("Stopped daemon");
            }
            Ok(())
        }
        Commands::Serve { config } => start_daemon(config.resolve()?).await,
        Commands::Logs { follow: false } => logs::show_logs(&remote).await,
        Commands::Logs { follow: true } => logs::follow_logs(&remote).await,
        Commands::Export { out } => logs::export_logs(&remote, &out).await,
        Commands::Reset {} => logs::reset_logs(&remote).await,
        Commands::Observe {
            report_endpoint,
            poll_millis,
        } => {
            let notifier = report_endpoint.map_or_else(HttpNotifier::default, HttpNotifier::new);
            let poll_interval = poll_millis.map_or(DEFAULT_POLL_INTERVAL, Duration::from_millis);
            let shutdown = CancellationToken::new();
            let (_, result) = tokio::join!(
                detect_shutdown(shutdown.clone()),
                observe::observe_page(
                    BufReader::new(tokio::io::stdin()),
                    Arc::new(remote),
                    Arc::new(notifier),
                    poll_interval,
                    DefaultClock,
                    shutdown.clone(),
                ),
            );
            result
        }
        Commands::Received { command } => received::process_received_command(command).await,
    }
}
