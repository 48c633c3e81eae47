//! The event collector: the single owner of the time log. Everything else talks to it through
//! [CollectorHandle], so requests are served one at a time in arrival order and no locking is
//! needed around the log or the viewer registry.

pub mod channels;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    observer::EventSink,
    protocol::EventMessage,
    viewer::{CollectorClient, LiveSession},
};

use super::storage::{
    entities::{EventKind, TimeEntry},
    log_store::LogStore,
};

use channels::{ChannelId, ViewerChannel, ViewerChannels};

const REQUEST_QUEUE_SIZE: usize = 64;

pub enum CollectorRequest {
    Submit(EventMessage),
    GetLogs(oneshot::Sender<Vec<TimeEntry>>),
    Reset(oneshot::Sender<()>),
    Connect(oneshot::Sender<ViewerChannel>),
    Disconnect(ChannelId),
}

pub struct EventCollector<S: LogStore> {
    store: S,
    logs: Vec<TimeEntry>,
    channels: ViewerChannels,
    requests: mpsc::Receiver<CollectorRequest>,
    requests_weak: mpsc::WeakSender<CollectorRequest>,
}

impl<S: LogStore> EventCollector<S> {
    /// Creates the collector with its in-memory log hydrated from `store`.
    pub async fn start(store: S) -> (Self, CollectorHandle) {
        let (sender, requests) = mpsc::channel(REQUEST_QUEUE_SIZE);
        let logs = load_or_empty(&store).await;
        info!("Collector starting with {} persisted entries", logs.len());

        let collector = Self {
            store,
            logs,
            channels: ViewerChannels::default(),
            requests,
            requests_weak: sender.downgrade(),
        };
        (collector, CollectorHandle { requests: sender })
    }

    /// Records `message` when it reports time spent. Any other event kind is accepted and
    /// forgotten.
    pub async fn submit(&mut self, message: EventMessage) {
        if message.event_type != EventKind::TimeSpent {
            debug!("Ignoring {:?} event from {}", message.event_type, message.url);
            return;
        }

        let entry = match TimeEntry::try_from(message) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Dropping malformed event {e}");
                return;
            }
        };

        self.logs.push(entry.clone());
        self.persist().await;
        let delivered = self.channels.broadcast(&entry);
        info!(
            domain = %entry.domain,
            seconds = entry.seconds,
            viewers = delivered,
            "Recorded time entry"
        );
    }

    /// Returns the persisted log, empty when nothing was persisted or it can't be read.
    pub async fn get_logs(&self) -> Vec<TimeEntry> {
        load_or_empty(&self.store).await
    }

    pub async fn reset_logs(&mut self) {
        self.logs.clear();
        self.persist().await;
        info!("Logs reset");
    }

    /// Opens a live channel. The snapshot and the registration happen in the same step, so the
    /// viewer neither misses nor double counts an entry.
    pub async fn connect(&mut self) -> ViewerChannel {
        let snapshot = self.get_logs().await;
        let (id, receiver) = self.channels.register();
        debug!("Viewer {id:?} connected, {} viewers", self.channels.len());
        ViewerChannel::new(id, snapshot, receiver, self.requests_weak.clone())
    }

    pub fn disconnect(&mut self, id: ChannelId) {
        if self.channels.remove(id) {
            debug!("Viewer {id:?} disconnected, {} viewers", self.channels.len());
        }
    }

    pub fn viewer_count(&self) -> usize {
        self.channels.len()
    }

    async fn persist(&self) {
        if let Err(e) = self.store.save(&self.logs).await {
            error!("Failed to persist {} entries {e:?}", self.logs.len());
        }
    }

    async fn handle(&mut self, request: CollectorRequest) {
        match request {
            CollectorRequest::Submit(message) => self.submit(message).await,
            CollectorRequest::GetLogs(reply) => {
                let _ = reply.send(self.get_logs().await);
            }
            CollectorRequest::Reset(reply) => {
                self.reset_logs().await;
                let _ = reply.send(());
            }
            CollectorRequest::Connect(reply) => {
                let channel = self.connect().await;
                // If the viewer is already gone the channel drops here and deregisters itself.
                let _ = reply.send(channel);
            }
            CollectorRequest::Disconnect(id) => self.disconnect(id),
        }
    }

    /// Serves requests until shutdown or until every handle is gone.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<()> {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                request = self.requests.recv() => match request {
                    Some(request) => self.handle(request).await,
                    None => break,
                }
            }
        }
        info!("Collector stopped with {} entries", self.logs.len());
        Ok(())
    }
}

async fn load_or_empty(store: &impl LogStore) -> Vec<TimeEntry> {
    match store.load().await {
        Ok(logs) => logs.unwrap_or_default(),
        Err(e) => {
            warn!("Failed to read persisted logs, treating them as empty {e:?}");
            vec![]
        }
    }
}

/// Cloneable access point to a running [EventCollector].
#[derive(Clone)]
pub struct CollectorHandle {
    requests: mpsc::Sender<CollectorRequest>,
}

impl CollectorHandle {
    async fn enqueue(&self, request: CollectorRequest) -> Result<()> {
        self.requests
            .send(request)
            .await
            .map_err(|_| anyhow!("Collector is no longer running"))
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> CollectorRequest,
    ) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.enqueue(make(reply)).await?;
        response
            .await
            .map_err(|_| anyhow!("Collector stopped before replying"))
    }

    pub async fn submit(&self, message: EventMessage) -> Result<()> {
        self.enqueue(CollectorRequest::Submit(message)).await
    }

    pub async fn get_logs(&self) -> Result<Vec<TimeEntry>> {
        self.request(CollectorRequest::GetLogs).await
    }

    pub async fn reset_logs(&self) -> Result<()> {
        self.request(CollectorRequest::Reset).await
    }

    pub async fn connect(&self) -> Result<ViewerChannel> {
        self.request(CollectorRequest::Connect).await
    }
}

#[async_trait]
impl EventSink for CollectorHandle {
    async fn send(&self, message: EventMessage) -> Result<()> {
        self.submit(message).await
    }
}

#[async_trait]
impl CollectorClient for CollectorHandle {
    async fn get_logs(&self) -> Result<Vec<TimeEntry>> {
        CollectorHandle::get_logs(self).await
    }

    async fn reset_logs(&self) -> Result<()> {
        CollectorHandle::reset_logs(self).await
    }

    async fn connect(&self) -> Result<LiveSession> {
        let mut channel = CollectorHandle::connect(self).await?;
        let snapshot = std::mem::take(&mut channel.snapshot);
        Ok(LiveSession {
            snapshot,
            entries: channel.boxed(),
        })
    }
}
