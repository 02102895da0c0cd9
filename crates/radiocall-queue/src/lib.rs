//! Bounded in-memory transcription work queue
//!
//! Separates upload acceptance from transcription processing: the ingest
//! path enqueues without blocking and the worker pool drives a pluggable
//! [`TaskProcessor`] with retries, linear backoff and graceful shutdown.

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

pub mod queue;
pub mod task;

pub use queue::{ProcessError, TaskProcessor, TranscriptionQueue};
pub use task::{QueueStats, TaskStatus, TranscriptionTask};
