use std::{collections::BTreeMap, path::PathBuf};

use anyhow::Result;
use chrono::{Duration, NaiveDate, Utc};
use clap::Args;

use crate::{
    daemon::storage::{entities::ReceivedReport, received_storage::ReceivedStorage},
    utils::dir::create_application_default_path,
};

#[derive(Args, Debug)]
pub struct ReceivedCommand {
    #[arg(long, help = "Day to show as YYYY-MM-DD. Defaults to today (UTC)")]
    pub date: Option<NaiveDate>,
    #[arg(long, conflicts_with = "date", help = "Use every day that has reports")]
    pub all: bool,
    #[arg(long, help = "Application directory the daemon uses")]
    pub dir: Option<PathBuf>,
    #[arg(long, default_value_t = 12, help = "How many rows to show")]
    pub top: usize,
    #[arg(
        long,
        help = "Count moves from one domain to the next instead of summing time"
    )]
    pub transitions: bool,
}

/// Seconds per domain, largest total first.
fn totals_by_domain(reports: &[ReceivedReport], top: usize) -> Vec<(&str, u64)> {
    let mut totals = BTreeMap::new();
    for report in reports {
        *totals.entry(report.domain.as_str()).or_insert(0) += report.seconds;
    }
    let mut totals = totals.into_iter().collect::<Vec<_>>();
    totals.sort_by(|a, b| b.1.cmp(&a.1));
    totals.truncate(top);
    totals
}

/// How often one domain was directly followed by a different one, in report time order. Most
/// frequent first.
fn count_transitions(reports: &[ReceivedReport], top: usize) -> Vec<((&str, &str), usize)> {
    let mut ordered = reports.iter().collect::<Vec<_>>();
    ordered.sort_by_key(|report| report.ts);

    let mut counts = BTreeMap::new();
    for pair in ordered.windows(2) {
        let (from, to) = (pair[0].domain.as_str(), pair[1].domain.as_str());
        if from != to {
            *counts.entry((from, to)).or_insert(0) += 1;
        }
    }
    let mut counts = counts.into_iter().collect::<Vec<_>>();
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts.truncate(top);
    counts
}

fn format_duration(v: Duration) -> String {
    if v.num_hours() > 0 {
        format!(
            "{}h{}m{}s",
            v.num_hours(),
            v.num_minutes() % 60,
            v.num_seconds() % 60
        )
    } else if v.num_minutes() > 0 {
        format!("{}m{}s", v.num_minutes() % 60, v.num_seconds() % 60)
    } else {
        format!("{}s", v.num_seconds() % 60)
    }
}

async fn load_reports(
    storage: &ReceivedStorage,
    days: &[NaiveDate],
) -> Result<Vec<ReceivedReport>> {
    let mut reports = vec![];
    for day in days {
        reports.extend(storage.get_data_for(*day).await?);
    }
    Ok(reports)
}

/// Prints what the side channel received on one day (today by default) or on every day.
pub async fn process_received_command(command: ReceivedCommand) -> Result<()> {
    let dir = command
        .dir
        .map_or_else(create_application_default_path, Ok)?;
    let storage = ReceivedStorage::new(dir.join("received"))?;

    let (days, label) = if command.all {
        (storage.days().await?, "any day".to_string())
    } else {
        let date = command.date.unwrap_or_else(|| Utc::now().date_naive());
        (vec![date], date.to_string())
    };

    let reports = load_reports(&storage, &days).await?;
    if reports.is_empty() {
        println!("Nothing received on {label}.");
        return Ok(());
    }

    if command.transitions {
        let transitions = count_transitions(&reports, command.top);
        if transitions.is_empty() {
            println!("No domain transitions on {label}.");
        }
        for ((from, to), count) in transitions {
            println!("{count}\t{from} -> {to}");
        }
        return Ok(());
    }

    for (domain, seconds) in totals_by_domain(&reports, command.top) {
        let seconds = i64::try_from(seconds).unwrap_or(i64::MAX);
        println!("{}\t{domain}", format_duration(Duration::seconds(seconds)));
    }
    Ok(())
}
