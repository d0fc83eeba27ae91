//! Integration tests for the walk generation pipeline

mod support;

mod concurrency;
mod config_loading;
mod context_ingest;
mod feedback_loop;
mod generation_failures;
mod recovery;
