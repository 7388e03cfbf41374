//! HTTP date parsing and formatting
//!
//! Dates are carried as epoch milliseconds. Unparseable dates become `0`,
//! which the freshness rules treat as "absent".

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

/// IMF-fixdate, the preferred HTTP date format
const IMF_FIXDATE: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Obsolete RFC 850 format
const RFC_850: &str = "%A, %d-%b-%y %H:%M:%S GMT";

/// ANSI C asctime() format
const ASCTIME: &str = "%a %b %e %H:%M:%S %Y";

/// Parse an HTTP date into epoch milliseconds, or `0` if it is not a date
pub fn parse_http_date(value: &str) -> i64 {
    let value = value.trim();

    for format in [IMF_FIXDATE, RFC_850, ASCTIME] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return dt.and_utc().timestamp_millis();
        }
    }

    DateTime::parse_from_rfc2822(value)
        .map(|dt| dt.timestamp_millis())
        .unwrap_or(0)
}

/// Format epoch milliseconds as an IMF-fixdate
pub fn format_http_date(millis: i64) -> Option<String> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .map(|dt| dt.format(IMF_FIXDATE).to_string())
}
