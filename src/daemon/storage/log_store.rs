use std::{
    future::Future,
    io::{ErrorKind, SeekFrom},
    path::{Path, PathBuf},
};

use anyhow::Result;
use fs4::tokio::AsyncFileExt;
use serde::Serialize;
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt},
};
use tracing::{debug, warn};

use super::entities::{PersistedLogs, TimeEntry};

const LOGS_FILE: &str = "logs.json";

/// Durable home of the collector log. Writes replace the whole log, there are no deltas.
pub trait LogStore {
    /// Returns the persisted log, or `None` when nothing usable has been persisted yet.
    fn load(&self) -> impl Future<Output = Result<Option<Vec<TimeEntry>>>>;

    /// Overwrites the persisted log with `logs`.
    fn save(&self, logs: &[TimeEntry]) -> impl Future<Output = Result<()>>;
}

#[derive(Serialize)]
struct PersistedLogsRef<'a> {
    logs: &'a [TimeEntry],
}

/// Keeps the log as a single JSON document, `{"logs": [...]}`.
pub struct JsonLogStore {
    path: PathBuf,
}

impl JsonLogStore {
    pub fn new(storage_dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&storage_dir)?;

        Ok(Self {
            path: storage_dir.join(LOGS_FILE),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn overwrite(file: &mut File, buffer: &[u8]) -> Result<()> {
        file.set_len(0).await?;
        file.seek(SeekFrom::Start(0)).await?;
        file.write_all(buffer).await?;
        file.flush().await?;
        Ok(())
    }
}

impl LogStore for JsonLogStore {
    async fn load(&self) -> Result<Option<Vec<TimeEntry>>> {
        let mut file = match File::open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        file.lock_shared()?;
        let mut content = String::new();
        let read = file.read_to_string(&mut content).await;
        file.unlock_async().await?;
        read?;

        if content.trim().is_empty() {
            return Ok(None);
        }

        match serde_json::from_str::<PersistedLogs>(&content) {
            Ok(persisted) => {
                debug!("Loaded {} entries from {:?}", persisted.logs.len(), self.path);
                Ok(Some(persisted.logs))
            }
            Err(e) => {
                // A write cut short by a shutdown leaves a truncated document behind.
                warn!("Persisted log at {:?} is corrupted {e}", self.path);
                Ok(None)
            }
        }
    }

    async fn save(&self, logs: &[TimeEntry]) -> Result<()> {
        let buffer = serde_json::to_vec(&PersistedLogsRef { logs })?;

        let mut file = File::options()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .await?;

        file.lock_exclusive()?;
        let result = Self::overwrite(&mut file, &buffer).await;
        file.unlock_async().await?;
        result
    }
}
