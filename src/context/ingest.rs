//! Directory ingestion: the write side of the context corpus.

use super::fragment::Fragment;
use super::store::SledContextStore;
use crate::error::ContextError;
use crate::types::StoreVersion;
use serde::Serialize;
use std::path::{Component, Path};
use tracing::{debug, info};
use unicode_normalization::UnicodeNormalization;
use walkdir::{DirEntry, WalkDir};

/// Directories never worth ingesting.
const SKIPPED_DIRS: &[&str] = &["target", "node_modules", "__pycache__", "venv", "dist"];

/// Bytes inspected when sniffing for binary content.
const BINARY_SNIFF_LEN: usize = 8000;

#[derive(Debug, Clone)]
pub struct Ingestor {
    pub chunk_lines: usize,
    pub max_file_bytes: u64,
}

impl Default for Ingestor {
    fn default() -> Self {
        Self {
            chunk_lines: 120,
            max_file_bytes: 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub version: StoreVersion,
    pub files: usize,
    pub fragments: usize,
    pub skipped: Vec<String>,
}

impl Ingestor {
    pub fn new(chunk_lines: usize, max_file_bytes: u64) -> Self {
        Self {
            chunk_lines: chunk_lines.max(1),
            max_file_bytes,
        }
    }

    /// Walk `root` and chunk every eligible text file. Output is ordered by path.
    pub fn collect(&self, root: &Path) -> Result<(Vec<Fragment>, IngestReport), ContextError> {
        let root = dunce::canonicalize(root).map_err(|e| ContextError::Ingest {
            path: root.display().to_string(),
            message: e.to_string(),
        })?;

        let mut report = IngestReport::default();
        let mut fragments = Vec::new();

        let walker = WalkDir::new(&root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_skipped(e));

        for entry in walker {
            let entry = entry.map_err(|e| ContextError::Ingest {
                path: e
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
                message: e.to_string(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(relative) = relative_source(&root, entry.path()) else {
                continue;
            };

            match self.read_text(entry.path())? {
                Some(text) => {
                    let chunks = self.chunk(&relative, &text)?;
                    report.files += 1;
                    fragments.extend(chunks);
                }
                None => {
                    debug!(path = %relative, "Skipping binary or oversized file");
                    report.skipped.push(relative);
                }
            }
        }

        report.fragments = fragments.len();
        Ok((fragments, report))
    }

    /// Collect `root` and publish the result as a new store version.
    pub fn ingest(
        &self,
        root: &Path,
        store: &SledContextStore,
    ) -> Result<IngestReport, ContextError> {
        let (fragments, mut report) = self.collect(root)?;
        report.version = store.publish(fragments, &root.display().to_string())?;
        info!(
            version = report.version,
            files = report.files,
            fragments = report.fragments,
            skipped = report.skipped.len(),
            "Ingested context directory"
        );
        Ok(report)
    }

    fn read_text(&self, path: &Path) -> Result<Option<String>, ContextError> {
        let io_err = |e: std::io::Error| ContextError::Ingest {
            path: path.display().to_string(),
            message: e.to_string(),
        };
        let len = std::fs::metadata(path).map_err(io_err)?.len();
        if len > self.max_file_bytes {
            return Ok(None);
        }
        let bytes = std::fs::read(path).map_err(io_err)?;
        if bytes[..bytes.len().min(BINARY_SNIFF_LEN)].contains(&0) {
            return Ok(None);
        }
        Ok(String::from_utf8(bytes).ok())
    }

    fn chunk(&self, source: &str, text: &str) -> Result<Vec<Fragment>, ContextError> {
        let lines: Vec<&str> = text.lines().collect();
        let mut out = Vec::new();
        for (index, window) in lines.chunks(self.chunk_lines).enumerate() {
            let body = window.join("\n");
            if body.trim().is_empty() {
                continue;
            }
            let start_line = (index * self.chunk_lines + 1) as u32;
            out.push(Fragment::from_chunk(source, index, start_line, body)?);
        }
        Ok(out)
    }
}

fn is_skipped(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || (entry.file_type().is_dir() && SKIPPED_DIRS.contains(&name.as_ref()))
}

/// `/`-separated, NFC-normalized path of `path` relative to `root`.
fn relative_source(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().nfc().collect::<String>()),
            _ => None,
        })
        .collect();
    (!parts.is_empty()).then(|| parts.join("/"))
}
