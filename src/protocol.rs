//! Messages exchanged between page observers, the collector and viewers. The JSON shapes match
//! what browser-side observers already send, so payloads stay loosely typed: every `data` field
//! is optional.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::daemon::storage::entities::{EventKind, TimeEntry};

/// SSE event name of the first frame on a live channel.
pub const SNAPSHOT_EVENT: &str = "snapshot";
/// SSE event name of every pushed entry.
pub const ENTRY_EVENT: &str = "entry";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Message {
    Event(EventMessage),
    GetLogs,
    ResetLogs,
}

/// `{type: "event", eventType, url, domain, ts, data}` without the tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMessage {
    pub event_type: EventKind,
    pub url: String,
    pub domain: String,
    pub ts: DateTime<Utc>,
    #[serde(default)]
    pub data: EventData,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// Reply to [Message::GetLogs].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogsResponse {
    pub logs: Vec<TimeEntry>,
}

/// Reply to every other message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckResponse {
    pub ok: bool,
}

impl AckResponse {
    pub fn ok() -> Self {
        Self { ok: true }
    }
}

/// Body of the best-effort side channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DwellReport {
    pub domain: String,
    pub seconds: u64,
    pub ts: DateTime<Utc>,
}

impl EventMessage {
    pub fn page_load(url: String, domain: String, ts: DateTime<Utc>, title: Option<String>) -> Self {
        Self {
            event_type: EventKind::PageLoad,
            url,
            data: EventData {
                domain: Some(domain.clone()),
                title,
                ..EventData::default()
            },
            domain,
            ts,
        }
    }

    pub fn time_spent(url: String, report: &DwellReport) -> Self {
        Self {
            event_type: EventKind::TimeSpent,
            url,
            domain: report.domain.clone(),
            ts: report.ts,
            data: EventData {
                domain: Some(report.domain.clone()),
                seconds: Some(report.seconds),
                ts: Some(report.ts),
                title: None,
            },
        }
    }
}

impl TryFrom<EventMessage> for TimeEntry {
    type Error = anyhow::Error;

    /// The domain measured by the observer wins over the page's current hostname, they differ
    /// right after an in-page navigation.
    fn try_from(message: EventMessage) -> Result<Self> {
        let seconds = message
            .data
            .seconds
            .ok_or_else(|| anyhow!("Event from {} carries no seconds", message.url))?;
        Ok(TimeEntry {
            domain: message.data.domain.unwrap_or(message.domain),
            seconds,
            timestamp: message.ts,
            source_url: message.url,
            event_kind: message.event_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use crate::daemon::storage::entities::{EventKind, TimeEntry};

    use super::{EventMessage, Message};

    #[test]
    fn parses_browser_event_message() {
        let message: Message = serde_json::from_value(json!({
            "type": "event",
            "eventType": "time_spent",
            "url": "https://www.example.com/a",
            "domain": "www.example.com",
            "ts": "2018-07-04T00:00:05.000Z",
            "data": { "domain": "example.com", "seconds": 5, "ts": "2018-07-04T00:00:05.000Z" }
        }))
        .unwrap();

        let Message::Event(event) = message else {
            panic!("expected an event, got {message:?}");
        };
        let entry = TimeEntry::try_from(event).unwrap();
        assert_eq!(
            entry,
            TimeEntry {
                domain: "example.com".into(),
                seconds: 5,
                timestamp: Utc.with_ymd_and_hms(2018, 7, 4, 0, 0, 5).unwrap(),
                source_url: "https://www.example.com/a".into(),
                event_kind: EventKind::TimeSpent,
            }
        );
    }

    #[test]
    fn parses_requests_without_payload() {
        let get: Message = serde_json::from_str(r#"{"type":"getLogs"}"#).unwrap();
        let reset: Message = serde_json::from_str(r#"{"type":"resetLogs"}"#).unwrap();
        assert_eq!(get, Message::GetLogs);
        assert_eq!(reset, Message::ResetLogs);
    }

    #[test]
    fn page_load_without_data_is_accepted() {
        let message: Message = serde_json::from_value(json!({
            "type": "event",
            "eventType": "page_load",
            "url": "https://example.com/",
            "domain": "example.com",
            "ts": "2018-07-04T00:00:00Z"
        }))
        .unwrap();
        assert!(matches!(message, Message::Event(EventMessage { event_type: EventKind::PageLoad, .. })));
    }

    #[test]
    fn time_spent_without_seconds_is_rejected() {
        let message = EventMessage::page_load(
            "https://example.com/".into(),
            "example.com".into(),
            Utc::now(),
            None,
        );
        assert!(TimeEntry::try_from(message).is_err());
    }
}
