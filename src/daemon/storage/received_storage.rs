use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::Result;
use chrono::NaiveDate;
use fs4::tokio::AsyncFileExt;
use tokio::{
    fs::File,
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
};
use tracing::{debug, warn};

use crate::utils::time::{date_to_record_name, record_name_to_date};

use super::entities::ReceivedReport;

/// Append-only storage for reports that arrive over the side channel. One JSON line per report,
/// one file per UTC day of arrival.
pub struct ReceivedStorage {
    record_dir: PathBuf,
}

impl ReceivedStorage {
    pub fn new(record_dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&record_dir)?;

        Ok(Self { record_dir })
    }

    fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.record_dir.join(date_to_record_name(date))
    }

    pub async fn append(&self, report: &ReceivedReport) -> Result<()> {
        let mut line = serde_json::to_vec(report)?;
        line.push(b'\n');

        let mut file = File::options()
            .append(true)
            .create(true)
            .open(self.path_for(report.received_at.date_naive()))
            .await?;

        file.lock_exclusive()?;
        let result = async {
            file.write_all(&line).await?;
            file.flush().await
        }
        .await;
        file.unlock_async().await?;
        Ok(result?)
    }

    /// Every day that has a record file, oldest first.
    pub async fn days(&self) -> Result<Vec<NaiveDate>> {
        let mut days = vec![];
        let mut dir = tokio::fs::read_dir(&self.record_dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            if let Some(day) = entry.file_name().to_str().and_then(record_name_to_date) {
                days.push(day);
            }
        }
        days.sort();
        Ok(days)
    }

    /// Retrieves every report received on `date`.
    pub async fn get_data_for(&self, date: NaiveDate) -> Result<Vec<ReceivedReport>> {
        match Self::extract(&self.path_for(date)).await {
            Ok(reports) => Ok(reports),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(vec![]),
            Err(e) => Err(e.into()),
        }
    }

    async fn extract(path: &Path) -> Result<Vec<ReceivedReport>, std::io::Error> {
        debug!("Extracting {path:?}");
        let file = File::open(path).await?;
        file.lock_shared()?;
        let mut reader = BufReader::new(file);
        let mut reports = vec![];
        let mut line = vec![];
        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line).await {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!("Stopped reading {path:?} after {} reports {e}", reports.len());
                    break;
                }
            }
            let raw = line.strip_suffix(b"\n").unwrap_or(&line);
            if raw.is_empty() {
                continue;
            }
            match serde_json::from_slice::<ReceivedReport>(raw) {
                Ok(v) => reports.push(v),
                Err(e) => {
                    // ignore illegal values. Might happen after shutdowns
                    warn!(
                        "During parsing in path {path:?} found illegal json string {}: {e}",
                        String::from_utf8_lossy(raw)
                    )
                }
            }
        }

        reader.into_inner().unlock_async().await?;

        Ok(reports)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use anyhow::Result;
    use chrono::{Duration, TimeZone, Utc};
    use tempfile::tempdir;

    use crate::{
        daemon::storage::entities::ReceivedReport,
        utils::{clock::test_clock::TEST_START_DATE, time::date_to_record_name},
    };

    use super::ReceivedStorage;

    fn report(domain: &str, seconds: u64, offset_hours: i64) -> ReceivedReport {
        let start = Utc.from_utc_datetime(&TEST_START_DATE);
        ReceivedReport {
            domain: domain.into(),
            seconds,
            ts: start + Duration::hours(offset_hours),
            received_at: start + Duration::hours(offset_hours),
        }
    }

    #[tokio::test]
    async fn reports_are_split_by_day_of_arrival() -> Result<()> {
        let dir = tempdir()?;
        let storage = ReceivedStorage::new(dir.path().to_path_buf())?;

        storage.append(&report("a.com", 3, 1)).await?;
        storage.append(&report("b.com", 4, 2)).await?;
        storage.append(&report("a.com", 5, 25)).await?;

        let first = storage.get_data_for(TEST_START_DATE.date()).await?;
        assert_eq!(first, vec![report("a.com", 3, 1), report("b.com", 4, 2)]);

        let second = storage
            .get_data_for(TEST_START_DATE.date().succ_opt().unwrap())
            .await?;
        assert_eq!(second, vec![report("a.com", 5, 25)]);
        Ok(())
    }

    #[tokio::test]
    async fn illegal_lines_are_skipped() -> Result<()> {
        let dir = tempdir()?;
        let storage = ReceivedStorage::new(dir.path().to_path_buf())?;
        storage.append(&report("a.com", 3, 1)).await?;

        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(dir.path().join(date_to_record_name(TEST_START_DATE.date())))?;
        file.write_all(b"{\"domain\": \"cut\n")?;

        let reports = storage.get_data_for(TEST_START_DATE.date()).await?;
        assert_eq!(reports, vec![report("a.com", 3, 1)]);
        Ok(())
    }

    #[tokio::test]
    async fn invalid_utf8_does_not_hide_later_reports() -> Result<()> {
        let dir = tempdir()?;
        let storage = ReceivedStorage::new(dir.path().to_path_buf())?;
        storage.append(&report("a.com", 3, 1)).await?;

        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(dir.path().join(date_to_record_name(TEST_START_DATE.date())))?;
        file.write_all(b"{\"domain\": \"\xff\xfe\"}\n")?;
        drop(file);
        storage.append(&report("b.com", 4, 2)).await?;

        let reports = storage.get_data_for(TEST_START_DATE.date()).await?;
        assert_eq!(reports, vec![report("a.com", 3, 1), report("b.com", 4, 2)]);
        Ok(())
    }

    #[tokio::test]
    async fn days_lists_only_record_files() -> Result<()> {
        let dir = tempdir()?;
        let storage = ReceivedStorage::new(dir.path().to_path_buf())?;
        storage.append(&report("a.com", 5, 25)).await?;
        storage.append(&report("a.com", 3, 1)).await?;
        std::fs::write(dir.path().join("notes.txt"), "not a day")?;

        let first = TEST_START_DATE.date();
        assert_eq!(storage.days().await?, vec![first, first.succ_opt().unwrap()]);
        Ok(())
    }

    #[tokio::test]
    async fn missing_day_is_empty() -> Result<()> {
        let dir = tempdir()?;
        let storage = ReceivedStorage::new(dir.path().to_path_buf())?;
        assert!(storage.get_data_for(TEST_START_DATE.date()).await?.is_empty());
        Ok(())
    }
}
