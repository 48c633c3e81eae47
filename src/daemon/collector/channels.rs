use std::{
    pin::Pin,
    task::{Context, Poll},
};

use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;

use crate::daemon::storage::entities::TimeEntry;

use super::CollectorRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(u64);

/// Registry of connected viewers. There is no bound on how many may connect.
#[derive(Default)]
pub struct ViewerChannels {
    next_id: u64,
    channels: Vec<(ChannelId, mpsc::UnboundedSender<TimeEntry>)>,
}

impl ViewerChannels {
    pub fn register(&mut self) -> (ChannelId, mpsc::UnboundedReceiver<TimeEntry>) {
        let id = ChannelId(self.next_id);
        self.next_id += 1;
        let (sender, receiver) = mpsc::unbounded_channel();
        self.channels.push((id, sender));
        (id, receiver)
    }

    pub fn remove(&mut self, id: ChannelId) -> bool {
        let before = self.channels.len();
        self.channels.retain(|(channel, _)| *channel != id);
        before != self.channels.len()
    }

    /// Pushes `entry` to every channel and returns how many received it. Channels whose viewer
    /// went away without saying goodbye are dropped here.
    pub fn broadcast(&mut self, entry: &TimeEntry) -> usize {
        self.channels.retain(|(id, sender)| match sender.send(entry.clone()) {
            Ok(()) => true,
            Err(_) => {
                debug!("Dropping closed viewer channel {id:?}");
                false
            }
        });
        self.channels.len()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

/// Viewer side of a live channel: the log as it was when the channel opened, followed by every
/// entry recorded afterwards. Dropping it deregisters the channel.
pub struct ViewerChannel {
    id: ChannelId,
    pub snapshot: Vec<TimeEntry>,
    entries: UnboundedReceiverStream<TimeEntry>,
    requests: mpsc::WeakSender<CollectorRequest>,
}

impl ViewerChannel {
    pub(super) fn new(
        id: ChannelId,
        snapshot: Vec<TimeEntry>,
        receiver: mpsc::UnboundedReceiver<TimeEntry>,
        requests: mpsc::WeakSender<CollectorRequest>,
    ) -> Self {
        Self {
            id,
            snapshot,
            entries: UnboundedReceiverStream::new(receiver),
            requests,
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }
}

impl Stream for ViewerChannel {
    type Item = TimeEntry;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().entries).poll_next(cx)
    }
}

impl Drop for ViewerChannel {
    fn drop(&mut self) {
        if let Some(requests) = self.requests.upgrade() {
            // A full queue is fine, the next broadcast prunes the channel anyway.
            let _ = requests.try_send(CollectorRequest::Disconnect(self.id));
        }
    }
}
