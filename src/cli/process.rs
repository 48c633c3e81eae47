use std::{env, path::Path, process::Stdio};

use anyhow::{Context, Result};
use sysinfo::{get_current_pid, Signal, System};
use tracing::debug;

use crate::daemon::DaemonConfig;

use super::daemon_path::to_daemon_path;

/// Stops every running process started from `name`. Returns how many were stopped.
pub fn kill_previous_servers(name: &Path) -> Result<usize> {
    let system = System::new_all();
    let current_id = get_current_pid().map_err(|e| anyhow::anyhow!("Can't get own pid {e}"))?;
    let mut stopped = 0;
    for (pid, process) in system.processes().iter() {
        if *pid == current_id {
            continue;
        }

        if process
            .exe()
            .filter(|v| v.exists())
            .filter(|v| name == *v)
            .is_some()
        {
            debug!("Stopping daemon {pid}");
            // This will forcefully terminate the process on Windows. Anything better will require a
            // lot more work.
            if process.kill_with(Signal::Term).is_none() {
                process.kill();
            }
            process.wait();
            stopped += 1;
        }
    }
    Ok(stopped)
}

fn daemon_executable() -> Result<std::path::PathBuf> {
    let current = env::current_exe().context("Can't operate without an executable")?;
    Ok(to_daemon_path(current))
}

pub fn stop_server() -> Result<usize> {
    kill_previous_servers(&daemon_executable()?)
}

/// Shuts down the previous daemon and starts a new detached one with `config`.
pub fn restart_server(config: &DaemonConfig) -> Result<()> {
    let daemon = daemon_executable()?;
    kill_previous_servers(&daemon)?;

    let mut command = std::process::Command::new(&daemon);
    command.arg("--force").args(config.to_args());

    #[cfg(feature = "win")]
    {
        use std::os::windows::process::CommandExt;
        use windows::Win32::System::Threading::DETACHED_PROCESS;
        command.creation_flags(DETACHED_PROCESS.0);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
        command.stdin(Stdio::null());
        command.stdout(Stdio::null());
        command.stderr(Stdio::null());
    }

    #[allow(clippy::zombie_processes)]
    let _ = command
        .spawn()
        .with_context(|| format!("Failed to start {}", daemon.display()))?;
    println!("Daemon started, listening on {}", config.bind);
    Ok(())
}
