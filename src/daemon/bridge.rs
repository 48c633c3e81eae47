//! HTTP face of the daemon. Carries observer and viewer messages to the collector, streams live
//! entries to viewers, receives side channel reports and serves the plot gallery.

use std::{
    io::ErrorKind,
    path::{Path as FsPath, PathBuf},
    sync::Arc,
};

use anyhow::Result;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        Html, IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::{future, stream, Stream, StreamExt};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    protocol::{
        AckResponse, DwellReport, LogsResponse, Message, ENTRY_EVENT, SNAPSHOT_EVENT,
    },
    utils::clock::Clock,
};

use super::{
    collector::CollectorHandle,
    storage::{entities::ReceivedReport, received_storage::ReceivedStorage},
};

const PLOTS_PAGE: &str = include_str!("../../assets/plots.html");

const IMAGE_TYPES: [(&str, &str); 6] = [
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("svg", "image/svg+xml"),
    ("webp", "image/webp"),
];

#[derive(Clone)]
struct BridgeState {
    collector: CollectorHandle,
    received: Arc<ReceivedStorage>,
    plots_dir: Arc<PathBuf>,
    clock: Arc<dyn Clock>,
}

pub struct Bridge {
    state: BridgeState,
}

impl Bridge {
    pub fn new(
        collector: CollectorHandle,
        received: ReceivedStorage,
        plots_dir: PathBuf,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            state: BridgeState {
                collector,
                received: Arc::new(received),
                plots_dir: Arc::new(plots_dir),
                clock,
            },
        }
    }

    fn router(self) -> Router {
        Router::new()
            .route("/", get(index))
            .route("/message", post(message))
            .route("/live", get(live))
            .route("/log", post(receive_report))
            .route("/api/plots", get(list_plots))
            .route("/plots/:name", get(plot))
            .with_state(self.state)
    }

    pub async fn serve(self, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        info!(
            addr = %listener.local_addr()?,
            plots = %self.state.plots_dir.display(),
            "Bridge listening"
        );
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await?;
        info!("Bridge stopped");
        Ok(())
    }
}

struct BridgeError {
    status: StatusCode,
    error: anyhow::Error,
}

impl BridgeError {
    fn unavailable(error: anyhow::Error) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            error,
        }
    }

    fn internal(error: impl Into<anyhow::Error>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: error.into(),
        }
    }
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        error!("Request failed with {} {:?}", self.status, self.error);
        (self.status, self.error.to_string()).into_response()
    }
}

async fn index() -> Html<&'static str> {
    Html(PLOTS_PAGE)
}

async fn message(
    State(state): State<BridgeState>,
    Json(message): Json<Message>,
) -> Result<Response, BridgeError> {
    let collector = &state.collector;
    let response = match message {
        Message::Event(event) => {
            collector
                .submit(event)
                .await
                .map_err(BridgeError::unavailable)?;
            Json(AckResponse::ok()).into_response()
        }
        Message::GetLogs => {
            let logs = collector
                .get_logs()
                .await
                .map_err(BridgeError::unavailable)?;
            Json(LogsResponse { logs }).into_response()
        }
        Message::ResetLogs => {
            collector
                .reset_logs()
                .await
                .map_err(BridgeError::unavailable)?;
            Json(AckResponse::ok()).into_response()
        }
    };
    Ok(response)
}

/// The first frame is the snapshot, each following frame one new entry. The channel is
/// deregistered when the client goes away and the stream gets dropped.
async fn live(
    State(state): State<BridgeState>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, BridgeError> {
    let mut channel = state
        .collector
        .connect()
        .await
        .map_err(BridgeError::unavailable)?;
    debug!("Live channel {:?} opened", channel.id());

    let snapshot = Event::default()
        .event(SNAPSHOT_EVENT)
        .json_data(std::mem::take(&mut channel.snapshot));
    let entries = channel.map(|entry| Event::default().event(ENTRY_EVENT).json_data(entry));

    Ok(Sse::new(stream::once(future::ready(snapshot)).chain(entries))
        .keep_alive(KeepAlive::default()))
}

async fn receive_report(
    State(state): State<BridgeState>,
    Json(report): Json<DwellReport>,
) -> Result<Json<AckResponse>, BridgeError> {
    let received = ReceivedReport {
        domain: report.domain,
        seconds: report.seconds,
        ts: report.ts,
        received_at: state.clock.time(),
    };
    state
        .received
        .append(&received)
        .await
        .map_err(BridgeError::internal)?;
    debug!("Received report {received:?}");
    Ok(Json(AckResponse::ok()))
}

fn image_content_type(path: &FsPath) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    IMAGE_TYPES
        .iter()
        .find(|(known, _)| *known == extension)
        .map(|(_, content_type)| *content_type)
}

async fn list_plots(State(state): State<BridgeState>) -> Result<Json<Vec<String>>, BridgeError> {
    let mut plots = vec![];
    let mut dir = match tokio::fs::read_dir(state.plots_dir.as_ref()).await {
        Ok(dir) => dir,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Json(plots)),
        Err(e) => return Err(BridgeError::internal(e)),
    };

    while let Some(entry) = dir.next_entry().await.map_err(BridgeError::internal)? {
        let path = entry.path();
        if image_content_type(&path).is_none() {
            continue;
        }
        match entry.file_type().await {
            Ok(file_type) if file_type.is_file() => {}
            Ok(_) => continue,
            Err(e) => {
                warn!("Skipping {path:?} {e}");
                continue;
            }
        }
        if let Some(name) = path.file_name().and_then(|name| name.to_str()) {
            plots.push(name.to_string());
        }
    }

    plots.sort();
    Ok(Json(plots))
}

async fn plot(
    State(state): State<BridgeState>,
    Path(name): Path<String>,
) -> Result<Response, BridgeError> {
    if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
        return Ok((StatusCode::BAD_REQUEST, "Invalid plot name").into_response());
    }
    let path = state.plots_dir.join(&name);
    let Some(content_type) = image_content_type(&path) else {
        return Ok(StatusCode::NOT_FOUND.into_response());
    };

    match tokio::fs::read(&path).await {
        Ok(bytes) => Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(StatusCode::NOT_FOUND.into_response()),
        Err(e) => Err(BridgeError::internal(e)),
    }
}

#[cfg(test)]
mod tests {
    use std::{net::SocketAddr, sync::Arc};

    use anyhow::Result;
    use chrono::{TimeZone, Utc};
    use futures::StreamExt;
    use reqwest::StatusCode;
    use tempfile::tempdir;
    use tokio::net::TcpListener;
    use tokio_util::sync::CancellationToken;
    use url::Url;

    use crate::{
        client::RemoteCollector,
        daemon::{
            collector::{CollectorHandle, EventCollector},
            storage::{log_store::JsonLogStore, received_storage::ReceivedStorage},
        },
        observer::{
            notify::{HttpNotifier, Notifier},
            EventSink,
        },
        protocol::{DwellReport, EventMessage},
        utils::{
            clock::test_clock::{ManualClock, TEST_START_DATE},
            logging::TEST_LOGGING,
        },
        viewer::{CollectorClient, LogViewer},
    };

    use super::Bridge;

    fn report(domain: &str, seconds: u64) -> DwellReport {
        DwellReport {
            domain: domain.into(),
            seconds,
            ts: Utc.from_utc_datetime(&TEST_START_DATE),
        }
    }

    struct Harness {
        addr: SocketAddr,
        handle: CollectorHandle,
        received_dir: std::path::PathBuf,
        plots_dir: std::path::PathBuf,
    }

    impl Harness {
        fn url(&self, path: &str) -> String {
            format!("http://{}{path}", self.addr)
        }

        fn remote(&self) -> RemoteCollector {
            RemoteCollector::new(Url::parse(&self.url("/")).unwrap())
        }
    }

    /// Runs collector and bridge on an ephemeral port for the duration of `body`.
    async fn with_daemon<F, Fut>(body: F) -> Result<()>
    where
        F: FnOnce(Harness) -> Fut,
        Fut: std::future::Future<Output = Result<()>>,
    {
        *TEST_LOGGING;
        let dir = tempdir()?;
        let plots_dir = dir.path().join("plots");
        std::fs::create_dir_all(&plots_dir)?;
        let received_dir = dir.path().join("received");

        let (collector, handle) =
            EventCollector::start(JsonLogStore::new(dir.path().join("storage"))?).await;
        let bridge = Bridge::new(
            handle.clone(),
            ReceivedStorage::new(received_dir.clone())?,
            plots_dir.clone(),
            Arc::new(ManualClock::new()),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let harness = Harness {
            addr: listener.local_addr()?,
            handle,
            received_dir,
            plots_dir,
        };

        let shutdown = CancellationToken::new();
        let (collector_result, bridge_result, body_result) = tokio::join!(
            collector.run(shutdown.clone()),
            bridge.serve(listener, shutdown.clone()),
            async {
                let result = body(harness).await;
                shutdown.cancel();
                result
            }
        );
        collector_result?;
        bridge_result?;
        body_result
    }

    #[tokio::test]
    async fn messages_round_trip_through_http() -> Result<()> {
        with_daemon(|harness| async move {
            let remote = harness.remote();
            remote
                .send(EventMessage::page_load(
                    "https://a.com/".into(),
                    "a.com".into(),
                    Utc::now(),
                    None,
                ))
                .await?;
            remote
                .send(EventMessage::time_spent("https://a.com/".into(), &report("a.com", 10)))
                .await?;

            let logs = remote.get_logs().await?;
            assert_eq!(logs.len(), 1);
            assert_eq!(logs[0].domain, "a.com");
            assert_eq!(logs[0].seconds, 10);

            remote.reset_logs().await?;
            remote.reset_logs().await?;
            assert!(remote.get_logs().await?.is_empty());
            Ok(())
        })
        .await
    }

    #[tokio::test]
    async fn live_channel_starts_with_snapshot() -> Result<()> {
        with_daemon(|harness| async move {
            harness
                .handle
                .submit(EventMessage::time_spent("https://a.com/".into(), &report("a.com", 10)))
                .await?;

            let remote = harness.remote();
            let (mut viewer, mut entries) = LogViewer::open(&remote).await?;
            assert_eq!(viewer.entries().len(), 1);

            harness
                .handle
                .submit(EventMessage::time_spent("https://b.com/".into(), &report("b.com", 3)))
                .await?;
            let pushed = entries.next().await.unwrap();
            assert_eq!(pushed.domain, "b.com");
            viewer.push(pushed);
            assert_eq!(viewer.displayed().next().unwrap().domain, "b.com");
            Ok(())
        })
        .await
    }

    #[tokio::test]
    async fn malformed_messages_are_rejected() -> Result<()> {
        with_daemon(|harness| async move {
            let response = reqwest::Client::new()
                .post(harness.url("/message"))
                .header("content-type", "application/json")
                .body(r#"{"type":"launchRockets"}"#)
                .send()
                .await?;
            assert!(response.status().is_client_error());
            Ok(())
        })
        .await
    }

    #[tokio::test]
    async fn side_channel_reports_are_stored() -> Result<()> {
        with_daemon(|harness| async move {
            HttpNotifier::new(harness.url("/log"))
                .notify(&report("a.com", 7))
                .await;

            let storage = ReceivedStorage::new(harness.received_dir.clone())?;
            let reports = storage.get_data_for(TEST_START_DATE.date()).await?;
            assert_eq!(reports.len(), 1);
            assert_eq!(reports[0].domain, "a.com");
            assert_eq!(reports[0].seconds, 7);
            Ok(())
        })
        .await
    }

    #[tokio::test]
    async fn plots_are_listed_and_served() -> Result<()> {
        with_daemon(|harness| async move {
            std::fs::write(harness.plots_dir.join("b.svg"), "<svg/>")?;
            std::fs::write(harness.plots_dir.join("a.png"), [137u8, 80, 78, 71])?;
            std::fs::write(harness.plots_dir.join("notes.txt"), "not a plot")?;
            let client = reqwest::Client::new();

            let plots: Vec<String> = client
                .get(harness.url("/api/plots"))
                .send()
                .await?
                .json()
                .await?;
            assert_eq!(plots, vec!["a.png", "b.svg"]);

            let response = client.get(harness.url("/plots/a.png")).send().await?;
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(response.headers()["content-type"], "image/png");
            assert_eq!(response.bytes().await?.as_ref(), &[137u8, 80, 78, 71]);

            let response = client.get(harness.url("/plots/missing.png")).send().await?;
            assert_eq!(response.status(), StatusCode::NOT_FOUND);

            let response = client.get(harness.url("/plots/..png")).send().await?;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);

            let page = client.get(harness.url("/")).send().await?.text().await?;
            assert!(page.contains("/api/plots"));
            Ok(())
        })
        .await
    }
}
