use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::{
    sync::{mpsc, watch},
    time::Instant,
};
use tracing::{debug, warn};

use crate::utils::clock::Clock;

use super::location::PageLocation;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Tells the observer when the page has moved without reloading.
#[async_trait]
pub trait DomainChangeObserver: Send {
    /// Resolves with the new location once the page moved away from the last one seen, or
    /// `None` when the page is gone. Moves within the same domain only update the url, time is
    /// booked when the domain differs.
    async fn next_change(&mut self) -> Option<PageLocation>;
}

/// Anything that can say where the page is right now. `None` means the page was closed.
#[cfg_attr(test, mockall::automock)]
pub trait LocationSource: Send {
    fn current(&mut self) -> Result<Option<PageLocation>>;
}

/// The latest location a push based source has seen. A dropped sender means the page is gone.
impl LocationSource for watch::Receiver<PageLocation> {
    fn current(&mut self) -> Result<Option<PageLocation>> {
        if self.has_changed().is_err() {
            return Ok(None);
        }
        Ok(Some(self.borrow_and_update().clone()))
    }
}

/// Detects navigation by sampling a [LocationSource] at a fixed interval.
pub struct PollingDomainWatcher<S> {
    source: S,
    last: PageLocation,
    interval: Duration,
    next_poll: Instant,
    clock: Box<dyn Clock>,
}

impl<S: LocationSource> PollingDomainWatcher<S> {
    pub fn new(source: S, current: PageLocation, interval: Duration, clock: Box<dyn Clock>) -> Self {
        let next_poll = clock.instant() + interval;
        Self {
            source,
            last: current,
            interval,
            next_poll,
            clock,
        }
    }
}

#[async_trait]
impl<S: LocationSource> DomainChangeObserver for PollingDomainWatcher<S> {
    async fn next_change(&mut self) -> Option<PageLocation> {
        loop {
            self.clock.sleep_until(self.next_poll).await;
            self.next_poll += self.interval;

            match self.source.current() {
                Ok(Some(location)) if location.url != self.last.url => {
                    if location.domain != self.last.domain {
                        debug!("Domain changed from {} to {}", self.last.domain, location.domain);
                    }
                    self.last = location.clone();
                    return Some(location);
                }
                Ok(Some(_)) => {}
                Ok(None) => return None,
                Err(e) => warn!("Failed to read page location {e:?}"),
            }
        }
    }
}

/// Push based sources hand over every location they see.
#[async_trait]
impl DomainChangeObserver for mpsc::Receiver<PageLocation> {
    async fn next_change(&mut self) -> Option<PageLocation> {
        self.recv().await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use anyhow::anyhow;
    use mockall::Sequence;
    use tokio::sync::watch;

    use crate::{
        observer::location::PageLocation,
        utils::clock::DefaultClock,
    };

    use super::{
        DomainChangeObserver, MockLocationSource, PollingDomainWatcher, DEFAULT_POLL_INTERVAL,
    };

    fn location(href: &str) -> PageLocation {
        PageLocation::parse(href).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn forwards_moves_and_skips_unchanged_polls() {
        let mut source = MockLocationSource::new();
        let mut sequence = Sequence::new();
        source
            .expect_current()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|| Ok(Some(location("https://a.com/"))));
        source
            .expect_current()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|| Ok(Some(location("https://a.com/other-path"))));
        source
            .expect_current()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|| Err(anyhow!("page busy")));
        source
            .expect_current()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|| Ok(Some(location("https://b.com/"))));

        let start = tokio::time::Instant::now();
        let mut watcher = PollingDomainWatcher::new(
            source,
            location("https://a.com/"),
            DEFAULT_POLL_INTERVAL,
            Box::new(DefaultClock),
        );

        // Same domain, new url.
        let change = watcher.next_change().await;
        assert_eq!(change, Some(location("https://a.com/other-path")));
        assert_eq!(start.elapsed(), Duration::from_secs(2));

        let change = watcher.next_change().await;
        assert_eq!(change, Some(location("https://b.com/")));
        assert_eq!(start.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn watch_channel_is_a_location_source() {
        let (sender, receiver) = watch::channel(location("https://a.com/"));
        let mut watcher = PollingDomainWatcher::new(
            receiver,
            location("https://a.com/"),
            Duration::from_millis(250),
            Box::new(DefaultClock),
        );

        sender.send(location("https://b.com/")).unwrap();
        assert_eq!(watcher.next_change().await, Some(location("https://b.com/")));

        drop(sender);
        assert_eq!(watcher.next_change().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_page_ends_the_watch() {
        let mut source = MockLocationSource::new();
        source.expect_current().times(1).returning(|| Ok(None));

        let mut watcher = PollingDomainWatcher::new(
            source,
            location("https://a.com/"),
            Duration::from_millis(250),
            Box::new(DefaultClock),
        );

        assert_eq!(watcher.next_change().await, None);
    }
}
