//! Runs a page observer fed by JSON lines, the way a browser native messaging host forwards what
//! the page script sees:
//!
//! ```text
//! {"type":"location","href":"https://example.com/","title":"Example"}
//! {"type":"visibility","state":"hidden"}
//! {"type":"unload"}
//! ```

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use serde::Deserialize;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, Lines},
    select,
    sync::{mpsc, watch},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    observer::{
        domain_watch::PollingDomainWatcher, location::PageLocation, notify::Notifier, EventSink,
        PageObserver, PageSignal, Visibility,
    },
    utils::clock::Clock,
};

const SIGNAL_QUEUE_SIZE: usize = 16;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum PageInput {
    Location {
        href: String,
        #[serde(default)]
        title: Option<String>,
    },
    Visibility {
        state: Visibility,
    },
    Unload,
}

impl PageInput {
    fn location(href: &str, title: Option<String>) -> Result<PageLocation> {
        let location = PageLocation::parse(href)?;
        Ok(match title {
            Some(title) => location.with_title(title),
            None => location,
        })
    }
}

/// Next readable input. Unreadable lines are skipped, `None` once the input ended.
async fn next_input<R: AsyncBufRead + Unpin>(lines: &mut Lines<R>) -> Result<Option<PageInput>> {
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<PageInput>(&line) {
            Ok(input) => return Ok(Some(input)),
            Err(e) => warn!("Skipping unreadable page input {line}: {e}"),
        }
    }
    Ok(None)
}

/// Hands inputs to the running observer until the page unloads, the input ends or `shutdown`
/// fires. Dropping the senders on return tells the observer the page is gone.
async fn forward_input<R: AsyncBufRead + Unpin>(
    mut lines: Lines<R>,
    locations: watch::Sender<PageLocation>,
    signals: mpsc::Sender<PageSignal>,
    shutdown: CancellationToken,
) -> Result<()> {
    loop {
        let input = select! {
            _ = shutdown.cancelled() => return Ok(()),
            input = next_input(&mut lines) => input?,
        };
        let signal = match input {
            Some(PageInput::Location { href, title }) => {
                match PageInput::location(&href, title) {
                    Ok(location) => {
                        debug!("Page moved to {}", location.url);
                        locations.send_replace(location);
                    }
                    Err(e) => warn!("Ignoring location {href} {e}"),
                }
                continue;
            }
            Some(PageInput::Visibility { state }) => PageSignal::VisibilityChanged(state),
            Some(PageInput::Unload) => PageSignal::Unload,
            None => return Ok(()),
        };
        if signals.send(signal).await.is_err() || signal == PageSignal::Unload {
            return Ok(());
        }
    }
}

/// Observes one page described by `input` until it unloads. Returns without emitting anything
/// when the input ends before the first location.
pub async fn observe_page<R>(
    input: R,
    sink: Arc<dyn EventSink>,
    notifier: Arc<dyn Notifier>,
    poll_interval: Duration,
    clock: impl Clock + Clone,
    shutdown: CancellationToken,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let location = loop {
        let input = select! {
            _ = shutdown.cancelled() => return Ok(()),
            input = next_input(&mut lines) => input?,
        };
        match input {
            Some(PageInput::Location { href, title }) => match PageInput::location(&href, title) {
                Ok(location) => break location,
                Err(e) => warn!("Ignoring location {href} {e}"),
            },
            Some(other) => warn!("Ignoring {other:?} before the first location"),
            None => {
                info!("Input ended before any page was seen");
                return Ok(());
            }
        }
    };
    info!("Observing {}", location.url);

    let (locations, location_receiver) = watch::channel(location.clone());
    let (signals, signal_receiver) = mpsc::channel(SIGNAL_QUEUE_SIZE);
    let watcher = PollingDomainWatcher::new(
        location_receiver,
        location.clone(),
        poll_interval,
        Box::new(clock.clone()),
    );
    let observer = PageObserver::start(location, sink, notifier, Box::new(clock)).await?;

    let (forward_result, observer_result) = tokio::join!(
        forward_input(lines, locations, signals, shutdown.clone()),
        async {
            let result = observer
                .run(watcher, signal_receiver, shutdown.clone())
                .await;
            shutdown.cancel();
            result
        },
    );

    forward_result.and(observer_result)
}
