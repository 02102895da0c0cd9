//! Error types for the radio call ingest pipeline

use std::{error::Error as StdError, fmt};

/// What a payload validation check rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationKind {
    /// A required form field was absent
    MissingField,
    /// Filename contained a path or executable pattern
    DangerousName,
    /// File extension outside the allowed set
    BadExtension,
    /// Declared or guessed MIME type outside the allowed set
    BadMime,
    /// File below the minimum size
    TooSmall,
    /// File above the maximum size
    TooLarge,
    /// Leading bytes are not a valid MP3 header
    BadMagic,
    /// Executable or script content detected in the header area
    HostilePayload,
    /// Zero-length payload
    Empty,
}

/// Which authentication check denied the request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthKind {
    /// Presented key matched no configured key
    InvalidKey,
    /// Key is valid but not allowed from the client IP
    IpForbidden,
    /// Key is valid but not allowed for the source system
    SystemForbidden,
    /// Authentication is required and no key was presented
    MissingCredentials,
}

/// Which sliding window rejected the request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateWindow {
    /// 60 second window
    Minute,
    /// 3600 second window
    Hour,
}

impl fmt::Display for RateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Minute => write!(f, "minute"),
            Self::Hour => write!(f, "hour"),
        }
    }
}

/// Failure class reported by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// Pool acquisition or statement timeout
    Timeout,
    /// Serialization or concurrent-update conflict
    Conflict,
    /// Constraint (unique, foreign key, check) violation
    ConstraintViolation,
    /// Connection-level or unclassified failure
    Unavailable,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::Conflict => write!(f, "conflict"),
            Self::ConstraintViolation => write!(f, "constraint violation"),
            Self::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// Main error type for the radio call ingest pipeline
#[derive(Debug)]
pub enum Error {
    /// I/O error
    Io(std::io::Error),

    /// Configuration error
    Configuration {
        /// Error message
        message: String,
    },

    /// Upload payload validation failure
    Validation {
        /// Which check rejected
        kind: ValidationKind,
        /// Human readable reason, suitable for the client
        message: String,
    },

    /// Authentication or authorization failure
    Authentication {
        /// Which check denied
        kind: AuthKind,
        /// Human readable reason, suitable for the client
        message: String,
    },

    /// Sliding window rate limit rejection
    RateLimited {
        /// Which window rejected
        window: RateWindow,
        /// Requests observed in the window
        current: usize,
        /// Configured threshold
        limit: usize,
    },

    /// Work queue is at capacity
    QueueFull,

    /// Not found error
    NotFound {
        /// Resource that was not found
        resource: String,
    },

    /// Store failure
    Store {
        /// Failure class
        kind: StoreKind,
        /// Underlying message
        message: String,
    },

    /// Serialization error
    Serialization(serde_json::Error),

    /// Other error
    Other(String),
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Build a validation error
    pub fn validation(kind: ValidationKind, message: impl Into<String>) -> Self {
        Self::Validation {
            kind,
            message: message.into(),
        }
    }

    /// Build an authentication error
    pub fn auth(kind: AuthKind, message: impl Into<String>) -> Self {
        Self::Authentication {
            kind,
            message: message.into(),
        }
    }

    /// Build a store error
    pub fn store(kind: StoreKind, message: impl Into<String>) -> Self {
        Self::Store {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "I/O error: {err}"),
            Self::Configuration { message } => write!(f, "Configuration error: {message}"),
            // Validation and authentication messages go to clients verbatim
            Self::Validation { message, .. } | Self::Authentication { message, .. } => {
                write!(f, "{message}")
            }
            Self::RateLimited { window, limit, .. } => {
                write!(f, "Rate limit exceeded: maximum {limit} uploads per {window}")
            }
            Self::QueueFull => write!(f, "Transcription queue is full"),
            Self::NotFound { resource } => write!(f, "Resource not found: {resource}"),
            Self::Store { kind, message } => write!(f, "Store error ({kind}): {message}"),
            Self::Serialization(err) => write!(f, "Serialization error: {err}"),
            Self::Other(msg) => write!(f, "{msg}"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Serialization(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err)
    }
}
