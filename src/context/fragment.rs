//! Context fragments: addressable chunks of code or documentation.

use crate::error::ContextError;
use crate::types::FragmentId;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

/// Broad classification of a fragment, derived from its file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Code,
    Documentation,
    Configuration,
    Text,
}

impl ContentType {
    pub fn from_path(path: &Path) -> (Self, Option<&'static str>) {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("rs") => (ContentType::Code, Some("rust")),
            Some("py") => (ContentType::Code, Some("python")),
            Some("js") | Some("mjs") | Some("cjs") => (ContentType::Code, Some("javascript")),
            Some("ts") | Some("tsx") => (ContentType::Code, Some("typescript")),
            Some("go") => (ContentType::Code, Some("go")),
            Some("java") => (ContentType::Code, Some("java")),
            Some("c") | Some("h") => (ContentType::Code, Some("c")),
            Some("cpp") | Some("cc") | Some("hpp") => (ContentType::Code, Some("cpp")),
            Some("rb") => (ContentType::Code, Some("ruby")),
            Some("sh") | Some("bash") => (ContentType::Code, Some("shell")),
            Some("sql") => (ContentType::Code, Some("sql")),
            Some("md") | Some("markdown") | Some("rst") | Some("adoc") => {
                (ContentType::Documentation, None)
            }
            Some("toml") | Some("yaml") | Some("yml") | Some("json") | Some("ini") => {
                (ContentType::Configuration, None)
            }
            _ => (ContentType::Text, None),
        }
    }

    pub const ALL: [ContentType; 4] = [
        ContentType::Code,
        ContentType::Documentation,
        ContentType::Configuration,
        ContentType::Text,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Code => "code",
            ContentType::Documentation => "documentation",
            ContentType::Configuration => "configuration",
            ContentType::Text => "text",
        }
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        ContentType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| format!("unknown content type '{}'", s))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    pub id: FragmentId,
    /// Workspace-relative source path, `/`-separated
    pub source: String,
    pub content_type: ContentType,
    pub language: Option<String>,
    /// 1-based line of the chunk's first line in `source`
    pub start_line: u32,
    pub content: String,
}

impl Fragment {
    /// Chunk `chunk` of `source`, identified as `source#chunk`.
    pub fn from_chunk(
        source: &str,
        chunk: usize,
        start_line: u32,
        content: String,
    ) -> Result<Self, ContextError> {
        if source.is_empty() {
            return Err(ContextError::InvalidFragment(
                "fragment source cannot be empty".to_string(),
            ));
        }
        if content.trim().is_empty() {
            return Err(ContextError::InvalidFragment(format!(
                "fragment {}#{} has no content",
                source, chunk
            )));
        }
        let (content_type, language) = ContentType::from_path(Path::new(source));
        Ok(Self {
            id: format!("{}#{}", source, chunk),
            source: source.to_string(),
            content_type,
            language: language.map(str::to_string),
            start_line,
            content,
        })
    }

    pub fn byte_len(&self) -> usize {
        self.content.len()
    }
}
