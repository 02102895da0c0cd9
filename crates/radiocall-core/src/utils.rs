//! Utility functions for the radio call ingest pipeline

use std::path::Path;

/// Lowercased file extension without the leading dot, empty if none
#[must_use]
pub fn lowercase_extension(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default()
}

/// Generate a unique filename for storage, keeping the original extension
#[must_use]
pub fn generate_storage_filename(original: &str) -> String {
    let uuid = uuid::Uuid::new_v4();
    let extension = Path::new(original)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("mp3");

    format!("{uuid}.{extension}")
}

/// Sanitize filename for safe storage
#[must_use]
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| {
            match c {
                // Keep alphanumeric, dots, underscores, and hyphens
                c if c.is_alphanumeric() || c == '.' || c == '_' || c == '-' => c,
                _ => '_',
            }
        })
        .collect::<String>()
        .trim_matches('_')
        .to_string()
}

/// Format duration in seconds to human readable format
#[must_use]
pub fn format_duration(seconds: f64) -> String {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let total_seconds = seconds.round() as u64;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes:02}:{secs:02}")
    }
}

/// Truncated form of an API key used in audit records
#[must_use]
pub fn truncate_api_key(key: &str) -> String {
    let prefix: String = key.chars().take(8).collect();
    format!("{prefix}...")
}

/// First 8 characters of a key; the provenance identifier form
#[must_use]
pub fn api_key_id(key: &str) -> String {
    key.chars().take(8).collect()
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_lowercase_extension() {
        assert_eq!(lowercase_extension("test.MP3"), "mp3");
        assert_eq!(lowercase_extension("test.mp3"), "mp3");
        assert_eq!(lowercase_extension("a.b.WAV"), "wav");
        assert_eq!(lowercase_extension("noext"), "");
        assert_eq!(lowercase_extension(""), "");
    }

    #[test]
    fn test_generate_storage_filename_keeps_extension() {
        let name = generate_storage_filename("20240315_142530_call.mp3");
        assert!(name.ends_with(".mp3"));

        let other = generate_storage_filename("20240315_142530_call.mp3");
        assert_ne!(name, other);
    }

    #[test]
    fn test_generate_storage_filename_default_extension() {
        let name = generate_storage_filename("no_extension");
        assert!(name.ends_with(".mp3"));
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("normal_file.mp3"), "normal_file.mp3");
        assert_eq!(sanitize_filename("bad/path\\file.mp3"), "bad_path_file.mp3");
        assert_eq!(sanitize_filename("__trim__"), "trim");
        assert_eq!(sanitize_filename("spaces in name.mp3"), "spaces_in_name.mp3");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0.0), "00:00");
        assert_eq!(format_duration(59.4), "00:59");
        assert_eq!(format_duration(61.0), "01:01");
        assert_eq!(format_duration(3661.0), "01:01:01");
    }

    #[test]
    fn test_truncate_api_key() {
        assert_eq!(truncate_api_key("abcdef0123456789"), "abcdef01...");
        assert_eq!(truncate_api_key("short"), "short...");
    }

    #[test]
    fn test_api_key_id() {
        assert_eq!(api_key_id("abcdef0123456789"), "abcdef01");
        assert_eq!(api_key_id("k"), "k");
    }
}
