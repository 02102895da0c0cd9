//! Error types for the transcriber capability

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for transcriber operations
pub type TranscribeResult<T> = Result<T, TranscribeError>;

/// Failure modes the queue distinguishes only as retryable or not
#[derive(Error, Debug)]
pub enum TranscribeError {
    /// Backend is not initialized or its model is not loaded
    #[error("Transcription service not ready")]
    NotReady,

    /// The materialized payload no longer exists
    #[error("Audio file not found: {path}")]
    AudioMissing {
        /// Path that was expected to exist
        path: PathBuf,
    },

    /// The payload exists but cannot be decoded
    #[error("Audio file unreadable: {message}")]
    AudioUnreadable {
        /// Decoder message
        message: String,
    },

    /// The speech model failed
    #[error("Model error: {message}")]
    ModelError {
        /// Backend message
        message: String,
    },

    /// The atomic commit failed; the call is not visible
    #[error("Store error: {0}")]
    Store(#[from] radiocall_core::Error),
}

impl TranscribeError {
    /// Build an audio-missing error
    pub fn audio_missing(path: impl Into<PathBuf>) -> Self {
        Self::AudioMissing { path: path.into() }
    }

    /// Build an audio-unreadable error
    pub fn audio_unreadable(message: impl Into<String>) -> Self {
        Self::AudioUnreadable {
            message: message.into(),
        }
    }

    /// Build a model error
    pub fn model(message: impl Into<String>) -> Self {
        Self::ModelError {
            message: message.into(),
        }
    }

    /// Whether retrying the same task can plausibly succeed
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NotReady | Self::ModelError { .. } | Self::Store(_)
        )
    }
}
