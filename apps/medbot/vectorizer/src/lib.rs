//! MedBot Vectorizer
//!
//! Keeps the patient vector collections in step with the patients table and
//! serves semantic search over them. Runs as an HTTP API, a one-shot sync,
//! or a cron-scheduled worker.

pub mod config;
pub mod openapi;
pub mod pipeline;
pub mod scheduler;
pub mod server;
pub mod sync;
