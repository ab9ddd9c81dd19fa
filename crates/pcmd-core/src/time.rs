//! Time utilities for pcmd
//!
//! Timestamps embedded in per-run log file names.

use time::macros::format_description;
use time::OffsetDateTime;

/// Format a timestamp as `YYYY-MM-DD-HH.MM.SS.nnnnnnnnn`.
///
/// The format sorts lexically and contains no `:` so it is safe in file
/// names on every platform.
pub fn format_log_timestamp(at: OffsetDateTime) -> String {
    let format = format_description!(
        "[year]-[month]-[day]-[hour].[minute].[second].[subsecond digits:9]"
    );
    // Formatting with a fixed description only fails for out-of-range years.
    at.format(&format)
        .unwrap_or_else(|_| at.unix_timestamp_nanos().to_string())
}

/// Current local time formatted for a log file name.
///
/// Falls back to UTC when the local offset cannot be determined, which
/// is the case in multi-threaded processes on some platforms.
pub fn log_timestamp() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    format_log_timestamp(now)
}
