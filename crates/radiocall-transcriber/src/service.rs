//! Transcriber capability contract

use crate::error::TranscribeResult;
use async_trait::async_trait;
use radiocall_core::types::RadioCallCreate;
use std::path::Path;

/// The black-box speech capability the work queue drives.
///
/// A successful `transcribe` has exactly three observable effects: the
/// transcription and its speaker segments are committed together with the
/// call row in one store transaction, the temp file is gone, and `Ok(())`
/// comes back. The queue never interprets the transcript itself; it sees
/// success or a [`TranscribeError`](crate::TranscribeError).
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe one materialized payload and commit the result
    ///
    /// # Errors
    ///
    /// Returns a `TranscribeError` on any failure; nothing was committed
    /// and the payload file is left in place for a retry.
    async fn transcribe(&self, audio_path: &Path, call: &RadioCallCreate)
    -> TranscribeResult<()>;

    /// Backend name, reported in logs and health output
    fn name(&self) -> &str;
}
