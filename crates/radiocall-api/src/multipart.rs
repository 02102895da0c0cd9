//! Manual multipart/form-data parser over raw body bytes
//!
//! One parser for every transport: gated on the Content-Type boundary and
//! indifferent to upgrade quirks upstream proxies may introduce. Splits on
//! `--<boundary>`, discards the preamble and closing marker, accepts both
//! `\r\n\r\n` and `\n\n` header separators, and strips a single trailing
//! CRLF from each part body so file payloads round-trip byte-identical.

use radiocall_core::{Error, Result};
use std::collections::HashMap;

/// A file part extracted from the form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// Client supplied filename
    pub filename: String,

    /// Part Content-Type, `application/octet-stream` when absent
    pub content_type: String,

    /// Raw part body
    pub data: Vec<u8>,
}

/// Parsed multipart form: text fields plus file parts
#[derive(Debug, Clone, Default)]
pub struct MultipartForm {
    fields: HashMap<String, String>,
    files: HashMap<String, UploadedFile>,
}

impl MultipartForm {
    /// Text field by name
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Text field by name, treating empty values as absent
    #[must_use]
    pub fn nonempty_field(&self, name: &str) -> Option<&str> {
        self.field(name).filter(|v| !v.is_empty())
    }

    /// File part by name
    #[must_use]
    pub fn file(&self, name: &str) -> Option<&UploadedFile> {
        self.files.get(name)
    }

    /// Number of parsed fields of both kinds
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len() + self.files.len()
    }

    /// Whether nothing was parsed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Extract the boundary parameter from a Content-Type header value
#[must_use]
pub fn boundary_from_content_type(content_type: &str) -> Option<String> {
    content_type.split(';').find_map(|part| {
        let part = part.trim();
        part.strip_prefix("boundary=")
            .map(|b| b.trim_matches('"').to_string())
    })
}

/// Parse a multipart/form-data body
///
/// # Errors
///
/// Returns an error if the content type is not multipart or carries no
/// boundary. Parts without a recognizable structure are skipped rather
/// than failing the whole form, matching lenient recorder firmware.
pub fn parse(content_type: &str, body: &[u8]) -> Result<MultipartForm> {
    if !content_type.starts_with("multipart/form-data") {
        return Err(Error::Other(format!(
            "Invalid content type for multipart parsing: {content_type}"
        )));
    }

    let boundary = boundary_from_content_type(content_type)
        .ok_or_else(|| Error::Other("No boundary in content-type header".to_string()))?;

    let marker = format!("--{boundary}").into_bytes();
    let mut form = MultipartForm::default();

    for (i, part) in split_on(body, &marker).into_iter().enumerate() {
        if i == 0 {
            // Preamble before the first boundary
            continue;
        }

        let trimmed = part.trim_ascii();
        if trimmed.is_empty() || trimmed == b"--" {
            // Closing marker
            continue;
        }

        let Some((headers, part_body)) = split_headers(part) else {
            tracing::warn!(part = i, "Multipart part without header separator");
            continue;
        };

        let headers_text = String::from_utf8_lossy(headers);
        let mut field_name: Option<String> = None;
        let mut filename: Option<String> = None;
        let mut part_content_type: Option<String> = None;

        for line in headers_text.lines() {
            let line = line.trim();
            if let Some(disposition) = line.strip_prefix("Content-Disposition:") {
                for item in disposition.split(';') {
                    let item = item.trim();
                    if let Some(name) = item.strip_prefix("name=\"") {
                        field_name = name.strip_suffix('"').map(ToString::to_string);
                    } else if let Some(file) = item.strip_prefix("filename=\"") {
                        filename = file.strip_suffix('"').map(ToString::to_string);
                    }
                }
            } else if let Some(value) = line.strip_prefix("Content-Type:") {
                part_content_type = Some(value.trim().to_string());
            }
        }

        let Some(name) = field_name else {
            tracing::warn!(part = i, "Multipart part without a field name");
            continue;
        };

        let value = strip_trailing_newline(part_body);

        if let Some(filename) = filename {
            form.files.insert(
                name,
                UploadedFile {
                    filename,
                    content_type: part_content_type
                        .unwrap_or_else(|| "application/octet-stream".to_string()),
                    data: value.to_vec(),
                },
            );
        } else {
            form.fields.insert(
                name,
                String::from_utf8_lossy(value).trim().to_string(),
            );
        }
    }

    Ok(form)
}

/// Split `haystack` on every occurrence of `needle`
fn split_on<'a>(haystack: &'a [u8], needle: &[u8]) -> Vec<&'a [u8]> {
    if needle.is_empty() {
        return vec![haystack];
    }

    let mut parts = Vec::new();
    let mut start = 0;
    let mut i = 0;
    while i + needle.len() <= haystack.len() {
        if &haystack[i..i + needle.len()] == needle {
            parts.push(&haystack[start..i]);
            i += needle.len();
            start = i;
        } else {
            i += 1;
        }
    }
    parts.push(&haystack[start..]);
    parts
}

/// Locate the header/body separator, `\r\n\r\n` preferred over `\n\n`
fn split_headers(part: &[u8]) -> Option<(&[u8], &[u8])> {
    find(part, b"\r\n\r\n")
        .map(|i| (&part[..i], &part[i + 4..]))
        .or_else(|| find(part, b"\n\n").map(|i| (&part[..i], &part[i + 2..])))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Strip exactly one trailing line ending; file bodies may legitimately
/// end in further newline bytes of their own
fn strip_trailing_newline(body: &[u8]) -> &[u8] {
    if body.ends_with(b"\r\n") {
        &body[..body.len() - 2]
    } else if body.ends_with(b"\n") {
        &body[..body.len() - 1]
    } else {
        body
    }
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const BOUNDARY: &str = "----testboundary42";

    fn content_type() -> String {
        format!("multipart/form-data; boundary={BOUNDARY}")
    }

    fn encode_form(fields: &[(&str, &str)], files: &[(&str, &str, &str, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
            );
            body.extend_from_slice(value.as_bytes());
            body.extend_from_slice(b"\r\n");
        }
        for (name, filename, mime, data) in files {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(format!("Content-Type: {mime}\r\n\r\n").as_bytes());
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    #[test]
    fn test_boundary_extraction() {
        assert_eq!(
            boundary_from_content_type("multipart/form-data; boundary=abc123"),
            Some("abc123".to_string())
        );
        assert_eq!(
            boundary_from_content_type("multipart/form-data; boundary=\"quoted\""),
            Some("quoted".to_string())
        );
        assert_eq!(boundary_from_content_type("multipart/form-data"), None);
    }

    #[test]
    fn test_parse_simple_fields() {
        let body = encode_form(&[("system", "123"), ("dateTime", "1703980800")], &[]);
        let form = parse(&content_type(), &body).unwrap();

        assert_eq!(form.field("system"), Some("123"));
        assert_eq!(form.field("dateTime"), Some("1703980800"));
        assert_eq!(form.len(), 2);
    }

    #[test]
    fn test_parse_rejects_non_multipart() {
        let result = parse("application/json", b"{}");
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_rejects_missing_boundary() {
        let result = parse("multipart/form-data", b"anything");
        assert!(result.is_err());
    }

    #[test]
    fn test_file_round_trip_is_byte_identical() {
        // Binary payload with embedded CRLFs, NULs and a trailing newline of
        // its own, which the parser must preserve
        let mut payload = b"ID3\x03\x00\x00\r\n\x00\xff\xfb\x90binary\r\ndata".to_vec();
        payload.extend_from_slice(&[0u8, 1, 2, 253, 254, 255, b'\n']);

        let body = encode_form(
            &[("system", "123")],
            &[("audio", "call.mp3", "audio/mpeg", &payload)],
        );
        let form = parse(&content_type(), &body).unwrap();

        let file = form.file("audio").unwrap();
        assert_eq!(file.filename, "call.mp3");
        assert_eq!(file.content_type, "audio/mpeg");
        assert_eq!(file.data, payload);
    }

    #[test]
    fn test_all_upload_contract_fields_round_trip() {
        let fields = [
            ("key", "k"),
            ("system", "123"),
            ("dateTime", "1703980800"),
            ("test", "1"),
            ("audioName", "call.mp3"),
            ("audioType", "audio/mpeg"),
            ("frequency", "460025000"),
            ("talkgroup", "1001"),
            ("source", "42"),
            ("systemLabel", "Metro"),
            ("talkgroupLabel", "Dispatch"),
            ("talkgroupGroup", "Police"),
            ("talkerAlias", "Unit 7"),
            ("patches", "[]"),
            ("frequencies", "[]"),
            ("sources", "[]"),
            ("talkgroupTag", "Law"),
        ];
        let audio = b"ID3\x04\x00payload";
        let body = encode_form(&fields, &[("audio", "a.mp3", "audio/mpeg", audio)]);

        let form = parse(&content_type(), &body).unwrap();
        for (name, value) in fields {
            assert_eq!(form.field(name), Some(value), "field {name}");
        }
        assert_eq!(form.file("audio").unwrap().data, audio);
        assert_eq!(form.len(), fields.len() + 1);
    }

    #[test]
    fn test_newline_only_separator() {
        let body = format!(
            "--{BOUNDARY}\nContent-Disposition: form-data; name=\"system\"\n\n123\n--{BOUNDARY}--\n"
        );
        let form = parse(&content_type(), body.as_bytes()).unwrap();
        assert_eq!(form.field("system"), Some("123"));
    }

    #[test]
    fn test_preamble_is_ignored() {
        let mut body = b"this is preamble text\r\n".to_vec();
        body.extend_from_slice(&encode_form(&[("system", "123")], &[]));
        let form = parse(&content_type(), &body).unwrap();
        assert_eq!(form.field("system"), Some("123"));
        assert_eq!(form.len(), 1);
    }

    #[test]
    fn test_part_without_separator_is_skipped() {
        let mut body = format!("--{BOUNDARY}\r\njunk without separator").into_bytes();
        body.extend_from_slice(format!("\r\n--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(b"Content-Disposition: form-data; name=\"system\"\r\n\r\n123\r\n");
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        let form = parse(&content_type(), &body).unwrap();
        assert_eq!(form.field("system"), Some("123"));
        assert_eq!(form.len(), 1);
    }

    #[test]
    fn test_file_default_content_type() {
        let body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"audio\"; filename=\"a.mp3\"\r\n\r\nID3data\r\n--{BOUNDARY}--\r\n"
        );
        let form = parse(&content_type(), body.as_bytes()).unwrap();
        let file = form.file("audio").unwrap();
        assert_eq!(file.content_type, "application/octet-stream");
        assert_eq!(file.data, b"ID3data");
    }

    #[test]
    fn test_field_values_are_trimmed() {
        let body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"system\"\r\n\r\n  123  \r\n--{BOUNDARY}--\r\n"
        );
        let form = parse(&content_type(), body.as_bytes()).unwrap();
        assert_eq!(form.field("system"), Some("123"));
    }

    #[test]
    fn test_nonempty_field() {
        let body = encode_form(&[("a", ""), ("b", "x")], &[]);
        let form = parse(&content_type(), &body).unwrap();
        assert_eq!(form.nonempty_field("a"), None);
        assert_eq!(form.nonempty_field("b"), Some("x"));
        assert_eq!(form.nonempty_field("missing"), None);
    }

    #[test]
    fn test_split_on() {
        let parts = split_on(b"a--b--c", b"--");
        assert_eq!(parts, vec![&b"a"[..], &b"b"[..], &b"c"[..]]);

        let parts = split_on(b"no separator", b"--");
        assert_eq!(parts, vec![&b"no separator"[..]]);
    }

    #[test]
    fn test_strip_trailing_newline_strips_exactly_one() {
        assert_eq!(strip_trailing_newline(b"data\r\n"), b"data");
        assert_eq!(strip_trailing_newline(b"data\n"), b"data");
        assert_eq!(strip_trailing_newline(b"data\r\n\r\n"), b"data\r\n");
        assert_eq!(strip_trailing_newline(b"data"), b"data");
    }
}
