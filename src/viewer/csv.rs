use chrono::{DateTime, Utc};

use crate::{daemon::storage::entities::TimeEntry, utils::time::iso_timestamp};

pub const EXPORT_FILE_NAME: &str = "time_tracker_logs.csv";
const HEADER: &str = "domain,seconds,exported_at\n";

/// Quotes a field only when it would otherwise break the row.
fn escape(field: &str) -> std::borrow::Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\"")).into()
    } else {
        field.into()
    }
}

/// Renders `entries` as CSV. Every row carries the same `exported_at`.
pub fn to_csv<'a>(entries: impl IntoIterator<Item = &'a TimeEntry>, exported_at: DateTime<Utc>) -> String {
    let exported_at = iso_timestamp(exported_at);
    let mut csv = String::from(HEADER);
    for entry in entries {
        csv.push_str(&format!(
            "{},{},{}\n",
            escape(&entry.domain),
            entry.seconds,
            exported_at
        ));
    }
    csv
}
