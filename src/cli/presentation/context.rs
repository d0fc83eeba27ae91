//! Context presentation: ingestion, snapshot, version and fragment text/json.

use super::{format_timestamp, to_json};
use crate::cli::OutputFormat;
use crate::context::{ContextSnapshot, Fragment, IngestReport, VersionRecord};
use crate::types::StoreVersion;
use comfy_table::presets::UTF8_FULL;
use comfy_table::Table;
use serde_json::json;

pub fn format_ingest_report(report: &IngestReport, format: OutputFormat) -> String {
    if format == OutputFormat::Json {
        return to_json(report);
    }
    let mut out = format!(
        "Published context version {}: {} fragments from {} files\n",
        report.version, report.fragments, report.files
    );
    if !report.skipped.is_empty() {
        out.push_str(&format!("Skipped {} file(s):\n", report.skipped.len()));
        for path in &report.skipped {
            out.push_str(&format!("  {}\n", path));
        }
    }
    out
}

pub fn format_snapshot(snapshot: &ContextSnapshot, format: OutputFormat) -> String {
    if format == OutputFormat::Json {
        return to_json(snapshot);
    }
    let mut out = format!(
        "Snapshot {} (store v{}, {} fragments, {} bytes)\n",
        snapshot.id.short(),
        snapshot.store_version,
        snapshot.len(),
        snapshot.total_bytes
    );
    if snapshot.is_empty() {
        out.push_str("No relevant fragments.\n");
        return out;
    }
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Score", "Fragment", "Line", "Type"]);
    for ranked in &snapshot.fragments {
        let f = &ranked.fragment;
        table.add_row(vec![
            ranked.score.to_string(),
            f.id.clone(),
            f.start_line.to_string(),
            f.language
                .clone()
                .unwrap_or_else(|| f.content_type.as_str().to_string()),
        ]);
    }
    out.push_str(&table.to_string());
    out
}

pub fn format_versions(versions: &[VersionRecord], format: OutputFormat) -> String {
    if format == OutputFormat::Json {
        return to_json(&versions);
    }
    if versions.is_empty() {
        return "No context published.\n\nUse 'walk context ingest' to publish one.".to_string();
    }
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Version", "Fragments", "Bytes", "Source", "Published"]);
    for v in versions {
        table.add_row(vec![
            v.version.to_string(),
            v.fragment_count.to_string(),
            v.total_bytes.to_string(),
            v.source.clone(),
            format_timestamp(v.published_at_ms),
        ]);
    }
    table.to_string()
}

pub fn format_fragment_list(
    version: StoreVersion,
    fragments: &[Fragment],
    format: OutputFormat,
) -> String {
    if format == OutputFormat::Json {
        return to_json(&json!({ "version": version, "fragments": fragments }));
    }
    if fragments.is_empty() {
        return format!("No fragments at context version {}.", version);
    }
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Fragment", "Line", "Type", "Bytes"]);
    for f in fragments {
        table.add_row(vec![
            f.id.clone(),
            f.start_line.to_string(),
            f.language
                .clone()
                .unwrap_or_else(|| f.content_type.as_str().to_string()),
            f.byte_len().to_string(),
        ]);
    }
    format!(
        "Context version {} ({} fragments)\n{}",
        version,
        fragments.len(),
        table
    )
}

pub fn format_removal(fragment_id: &str, version: StoreVersion, format: OutputFormat) -> String {
    if format == OutputFormat::Json {
        return to_json(&json!({ "removed": fragment_id, "version": version }));
    }
    format!(
        "Removed {}; published context version {}",
        fragment_id, version
    )
}
