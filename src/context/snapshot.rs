//! Immutable, content-addressed context snapshots.

use super::fragment::Fragment;
use crate::types::{SnapshotId, StoreVersion};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedFragment {
    pub score: u64,
    pub fragment: Fragment,
}

/// Ranked fragments selected for one query at one store version.
///
/// The id is a BLAKE3 digest over the version, the query text and every selected
/// fragment in rank order, so equal inputs always produce equal ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub id: SnapshotId,
    pub store_version: StoreVersion,
    pub query: String,
    pub fragments: Vec<RankedFragment>,
    pub total_bytes: u64,
}

impl ContextSnapshot {
    pub fn assemble(query: &str, store_version: StoreVersion, fragments: Vec<RankedFragment>) -> Self {
        let total_bytes = fragments.iter().map(|f| f.fragment.byte_len() as u64).sum();
        let id = Self::digest(query, store_version, &fragments);
        Self {
            id,
            store_version,
            query: query.to_string(),
            fragments,
            total_bytes,
        }
    }

    pub fn empty(query: &str, store_version: StoreVersion) -> Self {
        Self::assemble(query, store_version, Vec::new())
    }

    fn digest(query: &str, store_version: StoreVersion, fragments: &[RankedFragment]) -> SnapshotId {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&store_version.to_le_bytes());
        update_field(&mut hasher, query.as_bytes());
        hasher.update(&(fragments.len() as u64).to_le_bytes());
        for ranked in fragments {
            hasher.update(&ranked.score.to_le_bytes());
            update_field(&mut hasher, ranked.fragment.id.as_bytes());
            hasher.update(&ranked.fragment.start_line.to_le_bytes());
            update_field(&mut hasher, ranked.fragment.content.as_bytes());
        }
        SnapshotId::from(hex::encode(hasher.finalize().as_bytes()))
    }

    /// True when the stored id still matches the content.
    pub fn verify(&self) -> bool {
        Self::digest(&self.query, self.store_version, &self.fragments) == self.id
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    /// Context text handed to the generative model.
    pub fn render(&self) -> String {
        if self.fragments.is_empty() {
            return "(no relevant context was found)".to_string();
        }
        let mut out = String::with_capacity(self.total_bytes as usize + 64 * self.fragments.len());
        for ranked in &self.fragments {
            let f = &ranked.fragment;
            out.push_str(&format!(
                "--- {} (line {}, {}) ---\n",
                f.source,
                f.start_line,
                f.language.as_deref().unwrap_or(f.content_type.as_str())
            ));
            out.push_str(&f.content);
            if !f.content.ends_with('\n') {
                out.push('\n');
            }
        }
        out
    }
}

// length-prefixed so field boundaries are unambiguous
fn update_field(hasher: &mut blake3::Hasher, bytes: &[u8]) {
    hasher.update(&(bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}
