//! Log viewer state. A viewer starts uninitialized, becomes live once the log snapshot arrives
//! and from then on only grows as entries are pushed to it.

pub mod csv;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use tracing::debug;

use crate::daemon::storage::entities::TimeEntry;

/// At most this many entries are shown, newest first. Exports always cover everything.
pub const DISPLAY_LIMIT: usize = 100;
pub const RESET_CONFIRMATION: &str = "Logs cleared!";

/// A freshly opened live channel: the log at the time of connecting plus every entry recorded
/// after that.
pub struct LiveSession {
    pub snapshot: Vec<TimeEntry>,
    pub entries: BoxStream<'static, TimeEntry>,
}

/// The viewer's way of reaching a collector, in-process or over HTTP.
#[async_trait]
pub trait CollectorClient: Send + Sync {
    async fn get_logs(&self) -> Result<Vec<TimeEntry>>;

    async fn reset_logs(&self) -> Result<()>;

    async fn connect(&self) -> Result<LiveSession>;
}

#[derive(Debug, Default, PartialEq, Eq)]
pub enum ViewerState {
    #[default]
    Uninitialized,
    Live(Vec<TimeEntry>),
}

#[derive(Debug, Default)]
pub struct LogViewer {
    state: ViewerState,
}

impl LogViewer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connects to `client` and returns a live viewer together with the stream of entries to
    /// [push](LogViewer::push) into it.
    pub async fn open(
        client: &dyn CollectorClient,
    ) -> Result<(Self, BoxStream<'static, TimeEntry>)> {
        let session = client.connect().await?;
        let mut viewer = Self::new();
        viewer.apply_snapshot(session.snapshot);
        Ok((viewer, session.entries))
    }

    /// A viewer that only needs the current log, without following it.
    pub async fn load(client: &dyn CollectorClient) -> Result<Self> {
        let mut viewer = Self::new();
        viewer.apply_snapshot(client.get_logs().await?);
        Ok(viewer)
    }

    pub fn state(&self) -> &ViewerState {
        &self.state
    }

    pub fn is_live(&self) -> bool {
        matches!(self.state, ViewerState::Live(_))
    }

    pub fn apply_snapshot(&mut self, logs: Vec<TimeEntry>) {
        debug!("Snapshot with {} entries", logs.len());
        self.state = ViewerState::Live(logs);
    }

    /// Appends a pushed entry. Entries arriving before the snapshot are dropped, the snapshot
    /// already contains them.
    pub fn push(&mut self, entry: TimeEntry) -> bool {
        match &mut self.state {
            ViewerState::Live(entries) => {
                entries.push(entry);
                true
            }
            ViewerState::Uninitialized => {
                debug!("Dropping entry for {} pushed before the snapshot", entry.domain);
                false
            }
        }
    }

    pub fn entries(&self) -> &[TimeEntry] {
        match &self.state {
            ViewerState::Live(entries) => entries,
            ViewerState::Uninitialized => &[],
        }
    }

    /// The entries worth showing: the last [DISPLAY_LIMIT], newest first.
    pub fn displayed(&self) -> impl Iterator<Item = &TimeEntry> {
        self.entries().iter().rev().take(DISPLAY_LIMIT)
    }

    pub fn export_csv(&self, exported_at: DateTime<Utc>) -> String {
        csv::to_csv(self.entries(), exported_at)
    }

    /// Clears the log everywhere and returns the confirmation to show.
    pub async fn reset(&mut self, client: &dyn CollectorClient) -> Result<&'static str> {
        client.reset_logs().await?;
        self.state = ViewerState::Live(vec![]);
        Ok(RESET_CONFIRMATION)
    }
}
