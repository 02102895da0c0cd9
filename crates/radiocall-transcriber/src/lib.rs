//! Transcriber capability for the radio call ingest pipeline
//!
//! The speech model itself is a black box behind the [`Transcriber`]
//! trait: given a materialized payload and call metadata it commits a
//! transcription with speaker segments atomically, or fails with a
//! [`TranscribeError`]. This crate ships the contract and a reference
//! no-op backend.

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    missing_docs
)]
#![allow(clippy::module_name_repetitions, clippy::must_use_candidate)]

pub mod error;
pub mod noop;
pub mod service;

pub use error::{TranscribeError, TranscribeResult};
pub use noop::NoopTranscriber;
pub use service::Transcriber;
