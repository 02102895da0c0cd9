//! Upload payload validation
//!
//! The enforced policy is MP3-only: recorder firmware uploads MP3 and
//! nothing else, so every other container is rejected regardless of what
//! it claims to be. Checks run in a fixed order and stop at the first
//! failure.

use radiocall_core::config::IngestConfig;
use radiocall_core::error::ValidationKind;
use radiocall_core::utils::lowercase_extension;
use radiocall_core::{Error, Result};
use std::collections::BTreeSet;

/// Filename substrings that always reject
const DANGEROUS_PATTERNS: &[&str] = &[
    "..", "/", "\\", ":", "*", "?", "\"", "<", ">", "|", ".exe", ".bat", ".cmd", ".scr", ".pif",
    ".com",
];

/// Validation policy
#[derive(Debug, Clone)]
pub struct ValidationConfig {
    /// Maximum payload size in bytes
    pub max_file_size: u64,

    /// Minimum payload size in bytes
    pub min_file_size: u64,

    /// Acceptable declared or guessed MIME types
    pub allowed_mime_types: BTreeSet<String>,

    /// Acceptable lowercase extensions, without the dot
    pub allowed_extensions: BTreeSet<String>,

    /// Require a recognizable MP3 header
    pub require_valid_audio_header: bool,

    /// Reject executable and script signatures in the header area
    pub scan_for_malicious_content: bool,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_file_size: 100 * 1024 * 1024,
            min_file_size: 1024,
            allowed_mime_types: ["audio/mpeg", "audio/mp3"]
                .into_iter()
                .map(String::from)
                .collect(),
            allowed_extensions: ["mp3"].into_iter().map(String::from).collect(),
            require_valid_audio_header: true,
            scan_for_malicious_content: true,
        }
    }
}

impl ValidationConfig {
    /// Derive the policy from the ingest configuration; only the size
    /// bounds are operator tunable
    #[must_use]
    pub fn from_ingest(config: &IngestConfig) -> Self {
        Self {
            max_file_size: config.max_file_size_bytes(),
            min_file_size: config.min_file_size_bytes,
            ..Self::default()
        }
    }
}

/// Validates upload payloads against the policy
#[derive(Debug, Clone)]
pub struct UploadValidator {
    config: ValidationConfig,
}

impl UploadValidator {
    /// Create a validator with the given policy
    #[must_use]
    pub const fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Run every check in order, short-circuiting on the first failure
    ///
    /// # Errors
    ///
    /// Returns a `Validation` error naming the failed check; the message
    /// is suitable for the client.
    pub fn validate(
        &self,
        filename: &str,
        declared_mime: Option<&str>,
        data: &[u8],
    ) -> Result<()> {
        Self::check_filename(filename)?;
        self.check_extension(filename)?;
        self.check_content_type(filename, declared_mime)?;
        self.check_size(data)?;
        if self.config.require_valid_audio_header {
            Self::check_audio_header(data)?;
        }
        if self.config.scan_for_malicious_content {
            Self::check_hostile_content(data)?;
        }
        Ok(())
    }

    fn check_filename(filename: &str) -> Result<()> {
        if filename.is_empty() {
            return Err(Error::validation(
                ValidationKind::MissingField,
                "File must have a filename",
            ));
        }

        let lowered = filename.to_lowercase();
        for pattern in DANGEROUS_PATTERNS {
            if lowered.contains(pattern) {
                return Err(Error::validation(
                    ValidationKind::DangerousName,
                    format!("Invalid filename: contains dangerous pattern '{pattern}'"),
                ));
            }
        }
        Ok(())
    }

    fn check_extension(&self, filename: &str) -> Result<()> {
        let extension = lowercase_extension(filename);
        if self.config.allowed_extensions.contains(&extension) {
            return Ok(());
        }

        let allowed: Vec<String> = self
            .config
            .allowed_extensions
            .iter()
            .map(|e| format!(".{e}"))
            .collect();
        Err(Error::validation(
            ValidationKind::BadExtension,
            format!(
                "Invalid file extension '.{extension}'. Allowed: {}",
                allowed.join(", ")
            ),
        ))
    }

    fn check_content_type(&self, filename: &str, declared: Option<&str>) -> Result<()> {
        let candidate = match declared {
            Some(mime) if !mime.is_empty() => {
                if self.config.allowed_mime_types.contains(mime) {
                    return Ok(());
                }
                // The declared type is off; a correct extension-derived
                // guess still admits the upload
                Self::guess_mime(filename)
            }
            _ => Self::guess_mime(filename),
        };

        if let Some(guess) = candidate
            && self.config.allowed_mime_types.contains(guess)
        {
            return Ok(());
        }

        let allowed: Vec<&str> = self
            .config
            .allowed_mime_types
            .iter()
            .map(String::as_str)
            .collect();
        Err(Error::validation(
            ValidationKind::BadMime,
            format!(
                "Invalid content type '{}'. Allowed: {}",
                declared.unwrap_or(""),
                allowed.join(", ")
            ),
        ))
    }

    fn guess_mime(filename: &str) -> Option<&'static str> {
        match lowercase_extension(filename).as_str() {
            "mp3" => Some("audio/mpeg"),
            _ => None,
        }
    }

    fn check_size(&self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Err(Error::validation(
                ValidationKind::Empty,
                "Empty file content",
            ));
        }

        let size = data.len() as u64;
        if size < self.config.min_file_size {
            return Err(Error::validation(
                ValidationKind::TooSmall,
                format!(
                    "File too small: {size} bytes (minimum: {} bytes)",
                    self.config.min_file_size
                ),
            ));
        }
        if size > self.config.max_file_size {
            return Err(Error::validation(
                ValidationKind::TooLarge,
                format!(
                    "File too large: {size} bytes (maximum: {} bytes)",
                    self.config.max_file_size
                ),
            ));
        }
        Ok(())
    }

    fn check_audio_header(data: &[u8]) -> Result<()> {
        if data.len() < 12 {
            return Err(Error::validation(
                ValidationKind::BadMagic,
                "File too small to contain valid audio header",
            ));
        }

        // ID3 tag or an MP3 frame sync
        if data.starts_with(b"ID3")
            || data.starts_with(b"\xff\xfb")
            || data.starts_with(b"\xff\xfa")
        {
            Ok(())
        } else {
            Err(Error::validation(
                ValidationKind::BadMagic,
                "Invalid MP3 file header",
            ))
        }
    }

    /// MP3 frames may legitimately contain any byte sequence, so the scan
    /// is limited to signatures at the very start and the 64-byte
    /// metadata area
    fn check_hostile_content(data: &[u8]) -> Result<()> {
        if data.starts_with(b"\x7fELF") {
            return Err(Error::validation(
                ValidationKind::HostilePayload,
                "Executable file detected",
            ));
        }
        if data.starts_with(b"\xca\xfe\xba\xbe") {
            return Err(Error::validation(
                ValidationKind::HostilePayload,
                "Java class file detected",
            ));
        }
        if data.starts_with(b"%PDF") {
            return Err(Error::validation(
                ValidationKind::HostilePayload,
                "PDF file detected",
            ));
        }

        let header: Vec<u8> = data
            .iter()
            .take(64)
            .map(u8::to_ascii_lowercase)
            .collect();
        if contains(&header, b"<script") || contains(&header, b"javascript:") {
            return Err(Error::validation(
                ValidationKind::HostilePayload,
                "Script content detected in file header",
            ));
        }

        Ok(())
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
