use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};

/// This is the standard way of converting a date to a record file name in dwelltime.
pub fn date_to_record_name(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Inverse of [date_to_record_name], `None` for files that aren't day records.
pub fn record_name_to_date(name: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(name, "%Y-%m-%d").ok()
}

/// Formats a timestamp the way browsers print `Date.toISOString()`, e.g.
/// `2018-07-04T00:00:05.000Z`.
pub fn iso_timestamp(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Millis, true)
}
