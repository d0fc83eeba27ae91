//! CLI presentation: text and json formatters per command family.

mod context;
mod run;

pub use context::{
    format_fragment_list, format_ingest_report, format_removal, format_snapshot, format_versions,
};
pub use run::{
    format_advance_report, format_recovery_report, format_run_list, format_run_status,
    stage_label,
};

use serde::Serialize;

pub(crate) fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

pub(crate) fn format_timestamp(ms: u64) -> String {
    use chrono::{SecondsFormat, TimeZone, Utc};
    match Utc.timestamp_millis_opt(ms as i64).single() {
        Some(ts) => ts.to_rfc3339_opts(SecondsFormat::Secs, true),
        None => "-".to_string(),
    }
}
