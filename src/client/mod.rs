//! HTTP access to a running daemon. Lets out-of-process observers and the terminal viewer use
//! the same [EventSink] and [CollectorClient] seams the in-process collector offers.

pub mod sse;

use std::{collections::VecDeque, pin::Pin};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use futures::{stream, Stream, StreamExt};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::{
    daemon::storage::entities::TimeEntry,
    observer::EventSink,
    protocol::{
        AckResponse, EventMessage, LogsResponse, Message, ENTRY_EVENT, SNAPSHOT_EVENT,
    },
    viewer::{CollectorClient, LiveSession},
};

use sse::{SseDecoder, SseFrame};

pub const DEFAULT_SERVER: &str = "http://127.0.0.1:5000";

type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Vec<u8>>> + Send>>;

/// Talks to the daemon's message bridge.
pub struct RemoteCollector {
    base: Url,
    client: reqwest::Client,
}

impl RemoteCollector {
    pub fn new(base: Url) -> Self {
        Self {
            base,
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .with_context(|| format!("Can't build {path} url from {}", self.base))
    }

    async fn post_message<T: DeserializeOwned>(&self, message: &Message) -> Result<T> {
        let response = self
            .client
            .post(self.endpoint("message")?)
            .json(message)
            .send()
            .await
            .context("Failed to reach the daemon, is it running?")?
            .error_for_status()?;
        Ok(response.json::<T>().await?)
    }
}

/// Reads frames until one is available, `None` once the stream has ended.
async fn next_frame(
    bytes: &mut ByteStream,
    decoder: &mut SseDecoder,
    pending: &mut VecDeque<SseFrame>,
) -> Option<SseFrame> {
    loop {
        if let Some(frame) = pending.pop_front() {
            return Some(frame);
        }
        match bytes.next().await {
            Some(Ok(chunk)) => pending.extend(decoder.push(&chunk)),
            Some(Err(e)) => {
                warn!("Live channel failed {e}");
                return None;
            }
            None => return None,
        }
    }
}

#[async_trait]
impl CollectorClient for RemoteCollector {
    async fn get_logs(&self) -> Result<Vec<TimeEntry>> {
        let response: LogsResponse = self.post_message(&Message::GetLogs).await?;
        Ok(response.logs)
    }

    async fn reset_logs(&self) -> Result<()> {
        let response: AckResponse = self.post_message(&Message::ResetLogs).await?;
        if !response.ok {
            bail!("Daemon refused to reset logs");
        }
        Ok(())
    }

    async fn connect(&self) -> Result<LiveSession> {
        let response = self
            .client
            .get(self.endpoint("live")?)
            .send()
            .await
            .context("Failed to reach the daemon, is it running?")?
            .error_for_status()?;

        let mut bytes: ByteStream = Box::pin(
            response
                .bytes_stream()
                .map(|chunk| chunk.map(|chunk| chunk.to_vec())),
        );
        let mut decoder = SseDecoder::default();
        let mut pending = VecDeque::new();

        let snapshot = loop {
            let frame = next_frame(&mut bytes, &mut decoder, &mut pending)
                .await
                .ok_or_else(|| anyhow!("Live channel closed before the snapshot arrived"))?;
            if frame.event.as_deref() == Some(SNAPSHOT_EVENT) {
                break serde_json::from_str::<Vec<TimeEntry>>(&frame.data)?;
            }
            debug!("Skipping {:?} frame before the snapshot", frame.event);
        };

        let entries = stream::unfold(
            (bytes, decoder, pending),
            |(mut bytes, mut decoder, mut pending)| async move {
                loop {
                    let frame = next_frame(&mut bytes, &mut decoder, &mut pending).await?;
                    if frame.event.as_deref() != Some(ENTRY_EVENT) {
                        continue;
                    }
                    match serde_json::from_str::<TimeEntry>(&frame.data) {
                        Ok(entry) => return Some((entry, (bytes, decoder, pending))),
                        Err(e) => warn!("Skipping unreadable entry {}: {e}", frame.data),
                    }
                }
            },
        )
        .boxed();

        Ok(LiveSession { snapshot, entries })
    }
}

#[async_trait]
impl EventSink for RemoteCollector {
    async fn send(&self, message: EventMessage) -> Result<()> {
        let _: AckResponse = self.post_message(&Message::Event(message)).await?;
        Ok(())
    }
}
