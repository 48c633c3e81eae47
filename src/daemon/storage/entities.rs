use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of event a page observer emits. Only [EventKind::TimeSpent] ever reaches the log,
/// page loads are transient signals.
#[derive(PartialEq, Eq, Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    PageLoad,
    TimeSpent,
    /// Anything an observer sends that this build doesn't know about. Accepted, never stored.
    #[serde(other)]
    Other,
}

/// One recorded visit: `seconds` spent on `domain`, reported at `timestamp`.
#[derive(PartialEq, Eq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeEntry {
    pub domain: String,
    pub seconds: u64,
    pub timestamp: DateTime<Utc>,
    pub source_url: String,
    pub event_kind: EventKind,
}

/// Shape of the persisted collector state. Mirrors a single storage key holding the whole log.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PersistedLogs {
    #[serde(default)]
    pub logs: Vec<TimeEntry>,
}

/// A dwell report delivered over the side channel, stamped with the moment it arrived.
#[derive(PartialEq, Eq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedReport {
    pub domain: String,
    pub seconds: u64,
    pub ts: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{EventKind, TimeEntry};

    #[test]
    fn unknown_event_kinds_are_accepted() {
        let kind: EventKind = serde_json::from_str("\"scroll\"").unwrap();
        assert_eq!(kind, EventKind::Other);
    }

    #[test]
    fn entry_uses_camel_case_keys() {
        let entry = TimeEntry {
            domain: "example.com".into(),
            seconds: 5,
            timestamp: Utc.with_ymd_and_hms(2018, 7, 4, 0, 0, 5).unwrap(),
            source_url: "https://example.com/".into(),
            event_kind: EventKind::TimeSpent,
        };
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["sourceUrl"], "https://example.com/");
        assert_eq!(value["eventKind"], "time_spent");
        assert!(value["timestamp"].is_string());
    }
}
