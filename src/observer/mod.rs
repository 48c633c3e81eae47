//! Page observer: measures how long a page stays visible on one domain and emits `page_load` and
//! `time_spent` events. One observer per page.

pub mod domain_watch;
pub mod location;
pub mod notify;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use tokio::{sync::mpsc, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{
    protocol::{DwellReport, EventMessage},
    utils::clock::Clock,
};

use domain_watch::DomainChangeObserver;
use location::PageLocation;
use notify::Notifier;

/// Where observer events go. Events from one observer arrive in the order they were sent.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn send(&self, message: EventMessage) -> Result<()>;
}

/// `document.visibilityState` as the page reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Visible,
    Hidden,
}

/// Lifecycle signals a page delivers to its observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSignal {
    VisibilityChanged(Visibility),
    Unload,
}

pub struct PageObserver {
    location: PageLocation,
    started: Instant,
    sink: Arc<dyn EventSink>,
    notifier: Arc<dyn Notifier>,
    clock: Box<dyn Clock>,
}

impl PageObserver {
    /// Starts measuring on `location` and announces the page load.
    pub async fn start(
        location: PageLocation,
        sink: Arc<dyn EventSink>,
        notifier: Arc<dyn Notifier>,
        clock: Box<dyn Clock>,
    ) -> Result<Self> {
        let observer = Self {
            started: clock.instant(),
            location,
            sink,
            notifier,
            clock,
        };
        observer.emit_page_load().await?;
        Ok(observer)
    }

    pub fn location(&self) -> &PageLocation {
        &self.location
    }

    async fn emit_page_load(&self) -> Result<()> {
        debug!("Page load on {}", self.location.domain);
        self.sink
            .send(EventMessage::page_load(
                self.location.url.clone(),
                self.location.domain.clone(),
                self.clock.time(),
                self.location.title.clone(),
            ))
            .await
    }

    /// Closes the current measurement. Emits `time_spent` when at least one whole second has
    /// passed and returns the recorded seconds. The measurement restarts either way.
    async fn log_time_spent(&mut self) -> Result<Option<u64>> {
        let now = self.clock.instant();
        let seconds = now.saturating_duration_since(self.started).as_secs();
        self.started = now;

        if seconds == 0 {
            return Ok(None);
        }

        let report = DwellReport {
            domain: self.location.domain.clone(),
            seconds,
            ts: self.clock.time(),
        };
        info!(domain = %report.domain, seconds, "Time spent");

        let message = EventMessage::time_spent(self.location.url.clone(), &report);
        let notifier = self.notifier.clone();
        tokio::spawn(async move { notifier.notify(&report).await });

        self.sink.send(message).await?;
        Ok(Some(seconds))
    }

    pub async fn on_visibility_change(&mut self, visibility: Visibility) -> Result<Option<u64>> {
        match visibility {
            Visibility::Hidden => self.log_time_spent().await,
            Visibility::Visible => Ok(None),
        }
    }

    pub async fn on_unload(&mut self) -> Result<Option<u64>> {
        self.log_time_spent().await
    }

    /// Handles an in-page navigation. Time so far is booked on the old domain, then the new
    /// domain gets its own page load.
    pub async fn on_navigate(&mut self, location: PageLocation) -> Result<Option<u64>> {
        if location.domain == self.location.domain {
            self.location = location;
            return Ok(None);
        }
        let seconds = self.log_time_spent().await;
        self.location = location;
        self.emit_page_load().await?;
        seconds
    }

    /// Drives the observer from page signals and domain changes until the page unloads, the
    /// domain observer gives up or `shutdown` fires. Each of those books the remaining time.
    pub async fn run(
        mut self,
        mut domain_changes: impl DomainChangeObserver,
        mut signals: mpsc::Receiver<PageSignal>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        loop {
            let result = tokio::select! {
                _ = shutdown.cancelled() => break,
                signal = signals.recv() => match signal {
                    Some(PageSignal::VisibilityChanged(visibility)) => {
                        self.on_visibility_change(visibility).await
                    }
                    Some(PageSignal::Unload) | None => break,
                },
                change = domain_changes.next_change() => match change {
                    Some(location) => self.on_navigate(location).await,
                    None => break,
                },
            };
            if let Err(e) = result {
                error!("Failed to emit event for {} {e:?}", self.location.domain);
            }
        }

        self.on_unload().await?;
        Ok(())
    }
}
