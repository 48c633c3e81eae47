use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Detects signals sent to the process, or returns once something else cancelled the daemon.
///
/// On Windows detached processes can't detect signals sent to them, so `dwelltime stop` ends up
/// killing the process there.
pub async fn detect_shutdown(cancelation: CancellationToken) {
    select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!("Can't listen for ctrl-c {e}");
            }
            info!("Received ctrl-c, shutting down");
            cancelation.cancel();
        },
        _ = terminate() => {
            info!("Received SIGTERM, shutting down");
            cancelation.cancel();
        },
        _ = cancelation.cancelled() => {},
    };
}

#[cfg(unix)]
async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(e) => {
            warn!("Can't listen for SIGTERM {e}");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await;
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;

    use super::detect_shutdown;

    #[tokio::test]
    async fn returns_when_cancelled_elsewhere() {
        let token = CancellationToken::new();
        let detector = tokio::spawn(detect_shutdown(token.clone()));
        token.cancel();
        tokio::time::timeout(Duration::from_secs(5), detector)
            .await
            .unwrap()
            .unwrap();
    }
}
