//! Context domain: fragments, versioned corpus, relevance ranking and snapshots.
//! The orchestrator only reads through [`ContextStore`]; [`Ingestor`] owns writes.

pub mod fragment;
pub mod ingest;
pub mod ranking;
pub mod snapshot;
pub mod store;

pub use fragment::{ContentType, Fragment};
pub use ingest::{IngestReport, Ingestor};
pub use ranking::{select_fragments, KeywordRanker, Query, RelevanceRanker, SnapshotBudget};
pub use snapshot::{ContextSnapshot, RankedFragment};
pub use store::{ContextStore, SledContextStore, VersionRecord};
