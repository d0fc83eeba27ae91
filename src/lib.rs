//! walk: a resumable code-generation pipeline
//!
//! Each task becomes a run that moves through context assembly, generation by a
//! model, and human review, looping on requested changes until it is integrated or
//! fails. Every transition is persisted, so runs survive restarts and can be driven
//! step by step.

pub mod cli;
pub mod concurrency;
pub mod config;
pub mod context;
pub mod error;
pub mod feedback;
pub mod generation;
pub mod logging;
pub mod pipeline;
pub mod provider;
pub mod retry;
pub mod store;
pub mod types;
