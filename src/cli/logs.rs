use std::fmt::Write;

use ansi_term::Style;
use anyhow::Result;
use chrono::{Local, Utc};
use futures::StreamExt;
use tokio::select;

use crate::{
    daemon::storage::entities::TimeEntry,
    viewer::{CollectorClient, LogViewer, DISPLAY_LIMIT},
};

const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

fn render_entry(entry: &TimeEntry) -> String {
    format!(
        "{}\t{}s\t{}",
        Style::new().bold().paint(&entry.domain),
        entry.seconds,
        entry.timestamp.with_timezone(&Local).format("%x %H:%M:%S"),
    )
}

/// Renders the viewer the way the terminal shows it: newest first, at most [DISPLAY_LIMIT] rows.
pub fn render(viewer: &LogViewer) -> String {
    let total = viewer.entries().len();
    if total == 0 {
        return "No logs.\n".into();
    }

    let mut out = String::new();
    for entry in viewer.displayed() {
        let _ = writeln!(out, "{}", render_entry(entry));
    }
    if total > DISPLAY_LIMIT {
        let _ = writeln!(out, "... showing {DISPLAY_LIMIT} of {total} entries");
    }
    out
}

pub async fn show_logs(client: &dyn CollectorClient) -> Result<()> {
    let viewer = LogViewer::load(client).await?;
    print!("{}", render(&viewer));
    Ok(())
}

/// Keeps the screen in sync with the collector until ctrl-c or until the daemon goes away.
pub async fn follow_logs(client: &dyn CollectorClient) -> Result<()> {
    let (mut viewer, mut entries) = LogViewer::open(client).await?;
    print!("{CLEAR_SCREEN}{}", render(&viewer));

    loop {
        select! {
            _ = tokio::signal::ctrl_c() => break,
            entry = entries.next() => match entry {
                Some(entry) => {
                    viewer.push(entry);
                    print!("{CLEAR_SCREEN}{}", render(&viewer));
                }
                None => {
                    println!("Daemon closed the live channel");
                    break;
                }
            },
        }
    }
    Ok(())
}

pub async fn export_logs(client: &dyn CollectorClient, out: &std::path::Path) -> Result<()> {
    let viewer = LogViewer::load(client).await?;
    tokio::fs::write(out, viewer.export_csv(Utc::now())).await?;
    println!(
        "Exported {} entries to {}",
        viewer.entries().len(),
        out.display()
    );
    Ok(())
}

pub async fn reset_logs(client: &dyn CollectorClient) -> Result<()> {
    let mut viewer = LogViewer::new();
    println!("{}", viewer.reset(client).await?);
    Ok(())
}
