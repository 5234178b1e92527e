use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

pub const START_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Start time as the sites send it: ISO-8601 text, epoch millis or epoch seconds.
pub fn parse_start_time(v: &Value) -> Option<DateTime<Utc>> {
    match v {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(n) = s.parse::<i64>() {
                return from_epoch(n);
            }
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            // "2025-04-22T18:00:00" without zone, treated as UTC
            NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
                .ok()
                .map(|naive| Utc.from_utc_datetime(&naive))
        }
        Value::Number(n) => from_epoch(n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?),
        _ => None,
    }
}

/// Values past year ~2286 in seconds are read as milliseconds.
fn from_epoch(n: i64) -> Option<DateTime<Utc>> {
    if n <= 0 {
        return None;
    }
    if n >= 10_000_000_000 {
        Utc.timestamp_millis_opt(n).single()
    } else {
        Utc.timestamp_opt(n, 0).single()
    }
}

pub fn format_start_time(dt: DateTime<Utc>) -> String {
    dt.format(START_TIME_FORMAT).to_string()
}

pub fn start_time_string(v: &Value) -> Option<String> {
    parse_start_time(v).map(format_start_time)
}
