use clap::Parser;
use tracing::level_filters::LevelFilter;

use super::DaemonConfig;

#[derive(Parser)]
#[command(name = "dwelltime-daemon", version, about = "Collects dwell time and serves it over HTTP")]
pub struct DaemonArgs {
    /// Run in the current process instead of detaching.
    #[arg(long)]
    pub force: bool,
    #[command(flatten)]
    pub config: DaemonConfig,
    /// This option is for debugging purposes only.
    #[arg(long = "log-console")]
    pub log_console: bool,
    #[arg(long = "log-filter")]
    pub log: Option<LevelFilter>,
}
