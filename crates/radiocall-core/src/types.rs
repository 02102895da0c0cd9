//! Core data types for the radio call ingest pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Transcription status enumeration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptionStatus {
    /// Accepted but not yet worked
    Pending,
    /// Currently being transcribed
    Processing,
    /// Transcription completed successfully
    Completed,
    /// Transcription failed permanently
    Failed,
}

impl Default for TranscriptionStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl TranscriptionStatus {
    /// Stable string form used in the store and on the wire
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Whether the status admits no further transitions
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Status only ever advances: pending -> processing -> (completed | failed)
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Processing, Self::Completed | Self::Failed)
        )
    }

    /// Parse the stable string form
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for TranscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Metadata for a call about to enter the pipeline
///
/// The call id is assigned at ingest; the row itself is written by the
/// atomic transcription commit (or the pending-ingress insert).
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RadioCallCreate {
    /// Unique identifier for the call, generated at ingest
    pub call_id: Uuid,

    /// When the call occurred (client supplied, second precision)
    pub timestamp: DateTime<Utc>,

    /// Frequency in Hz
    pub frequency: i64,

    /// Talkgroup ID
    pub talkgroup_id: Option<i32>,

    /// Source radio ID
    pub source_radio_id: Option<i32>,

    /// Numeric system ID when the source system field parses as one
    pub system_id: Option<i32>,

    /// System label/name
    #[validate(length(max = 255))]
    pub system_label: Option<String>,

    /// Talkgroup label/name
    #[validate(length(max = 255))]
    pub talkgroup_label: Option<String>,

    /// Talkgroup group
    #[validate(length(max = 255))]
    pub talkgroup_group: Option<String>,

    /// Talker alias
    #[validate(length(max = 255))]
    pub talker_alias: Option<String>,

    /// Server-side location of the preserved payload
    pub audio_file_path: String,

    /// Duration of audio in seconds, filled by the transcriber
    pub audio_duration_seconds: Option<f64>,

    /// Lowercase audio extension
    pub audio_format: String,

    /// Client IP the upload arrived from
    pub upload_source_ip: Option<String>,

    /// Source system identifier supplied by the uploader
    pub upload_source_system: Option<String>,

    /// First 8 chars of the API key used, or the literal `legacy`
    pub upload_api_key_id: Option<String>,

    /// User agent of the uploader
    pub upload_user_agent: Option<String>,
}

impl RadioCallCreate {
    /// Create a new record with a fresh call id
    #[must_use]
    pub fn new(timestamp: DateTime<Utc>, frequency: i64, audio_file_path: String) -> Self {
        Self {
            call_id: Uuid::new_v4(),
            timestamp,
            frequency,
            talkgroup_id: None,
            source_radio_id: None,
            system_id: None,
            system_label: None,
            talkgroup_label: None,
            talkgroup_group: None,
            talker_alias: None,
            audio_file_path,
            audio_duration_seconds: None,
            audio_format: "mp3".to_string(),
            upload_source_ip: None,
            upload_source_system: None,
            upload_api_key_id: None,
            upload_user_agent: None,
        }
    }
}

/// Complete radio call record as stored
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadioCall {
    /// Unique identifier for the call
    pub call_id: Uuid,

    /// When the call occurred
    pub timestamp: DateTime<Utc>,

    /// Frequency in Hz
    pub frequency: i64,

    /// Talkgroup ID
    pub talkgroup_id: Option<i32>,

    /// Source radio ID
    pub source_radio_id: Option<i32>,

    /// Numeric system ID
    pub system_id: Option<i32>,

    /// System label/name
    pub system_label: Option<String>,

    /// Talkgroup label/name
    pub talkgroup_label: Option<String>,

    /// Talkgroup group
    pub talkgroup_group: Option<String>,

    /// Talker alias
    pub talker_alias: Option<String>,

    /// Server-side location of the preserved payload
    pub audio_file_path: String,

    /// Duration of audio in seconds
    pub audio_duration_seconds: Option<f64>,

    /// Lowercase audio extension
    pub audio_format: String,

    /// Transcription status
    pub transcription_status: TranscriptionStatus,

    /// Set when the status reached a terminal state
    pub transcribed_at: Option<DateTime<Utc>>,

    /// Client IP the upload arrived from
    pub upload_source_ip: Option<String>,

    /// Source system identifier supplied by the uploader
    pub upload_source_system: Option<String>,

    /// First 8 chars of the API key used, or the literal `legacy`
    pub upload_api_key_id: Option<String>,

    /// User agent of the uploader
    pub upload_user_agent: Option<String>,
}

/// Transcription result, 1:1 with a radio call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcription {
    /// Call this transcription belongs to
    pub call_id: Uuid,

    /// Full transcript text
    pub full_transcript: String,

    /// Detected language tag
    pub language: Option<String>,

    /// Overall confidence in [0, 1]
    pub confidence_score: Option<f64>,

    /// Number of distinct speakers
    pub speaker_count: i32,

    /// Model that produced the transcript
    pub model_name: Option<String>,

    /// Wall clock processing time in seconds
    pub processing_time_seconds: Option<f64>,
}

/// Individual speaker segment from diarization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeakerSegment {
    /// Call this segment belongs to
    pub call_id: Uuid,

    /// Unique segment identifier
    pub segment_id: Uuid,

    /// Segment start within the call, seconds
    pub start_time_seconds: f64,

    /// Segment end within the call, seconds
    pub end_time_seconds: f64,

    /// Speaker label, stable within one call only
    pub speaker_id: String,

    /// Segment transcript
    pub text: String,

    /// Segment confidence in [0, 1]
    pub confidence_score: Option<f64>,
}

impl SpeakerSegment {
    /// Create a segment with a fresh segment id
    #[must_use]
    pub fn new(
        call_id: Uuid,
        start_time_seconds: f64,
        end_time_seconds: f64,
        speaker_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            call_id,
            segment_id: Uuid::new_v4(),
            start_time_seconds,
            end_time_seconds,
            speaker_id: speaker_id.into(),
            text: text.into(),
            confidence_score: None,
        }
    }
}

/// Audit event severity
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Routine, expected activity
    Info,
    /// Low interest
    Low,
    /// Worth reviewing
    Medium,
    /// Likely hostile or misconfigured
    High,
    /// Immediate attention
    Critical,
}

impl Severity {
    /// Stable string form used in the store
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Parse the stable string form
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "info" => Some(Self::Info),
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Audit event taxonomy; the strings are a stable consumer contract
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventType {
    /// A configured API key was presented and accepted
    ApiKeyUsed,
    /// A key matching no configuration was presented
    InvalidApiKey,
    /// A valid key was used from an IP outside its allow-list
    ApiKeyIpViolation,
    /// A valid key was used for a system outside its allow-list
    ApiKeySystemViolation,
    /// A sliding window threshold was hit
    RateLimitExceeded,
    /// An upload passed validation
    UploadSuccess,
    /// An upload was rejected
    UploadBlocked,
}

impl SecurityEventType {
    /// Stable string form used in the store and on the wire
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ApiKeyUsed => "api_key_used",
            Self::InvalidApiKey => "invalid_api_key",
            Self::ApiKeyIpViolation => "api_key_ip_violation",
            Self::ApiKeySystemViolation => "api_key_system_violation",
            Self::RateLimitExceeded => "rate_limit_exceeded",
            Self::UploadSuccess => "upload_success",
            Self::UploadBlocked => "upload_blocked",
        }
    }

    /// Severity each event type is raised with
    #[must_use]
    pub const fn severity(self) -> Severity {
        match self {
            Self::ApiKeyUsed | Self::UploadSuccess => Severity::Info,
            Self::InvalidApiKey | Self::RateLimitExceeded | Self::UploadBlocked => {
                Severity::Medium
            }
            Self::ApiKeyIpViolation | Self::ApiKeySystemViolation => Severity::High,
        }
    }

    /// Parse the stable string form
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "api_key_used" => Some(Self::ApiKeyUsed),
            "invalid_api_key" => Some(Self::InvalidApiKey),
            "api_key_ip_violation" => Some(Self::ApiKeyIpViolation),
            "api_key_system_violation" => Some(Self::ApiKeySystemViolation),
            "rate_limit_exceeded" => Some(Self::RateLimitExceeded),
            "upload_success" => Some(Self::UploadSuccess),
            "upload_blocked" => Some(Self::UploadBlocked),
            _ => None,
        }
    }
}

impl std::fmt::Display for SecurityEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Append-only security audit record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    /// Unique event identifier
    pub event_id: Uuid,

    /// When the event occurred
    pub timestamp: DateTime<Utc>,

    /// Event classification
    pub event_type: SecurityEventType,

    /// Severity the event was raised with
    pub severity: Severity,

    /// Client IP involved
    pub source_ip: Option<String>,

    /// Source system involved
    pub source_system: Option<String>,

    /// Truncated form of the API key involved
    pub api_key_used: Option<String>,

    /// User agent involved
    pub user_agent: Option<String>,

    /// Human readable description
    pub description: String,

    /// Free-form context
    pub metadata: Option<serde_json::Value>,

    /// Call this event relates to, if any
    pub related_call_id: Option<Uuid>,

    /// File this event relates to, if any
    pub related_file_path: Option<String>,
}

impl SecurityEvent {
    /// Create an event with the type's default severity and a fresh id
    #[must_use]
    pub fn new(event_type: SecurityEventType, description: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event_type,
            severity: event_type.severity(),
            source_ip: None,
            source_system: None,
            api_key_used: None,
            user_agent: None,
            description: description.into(),
            metadata: None,
            related_call_id: None,
            related_file_path: None,
        }
    }

    /// Set the source IP
    #[must_use]
    pub fn with_source_ip(mut self, ip: impl Into<String>) -> Self {
        self.source_ip = Some(ip.into());
        self
    }

    /// Set the source system
    #[must_use]
    pub fn with_source_system(mut self, system: impl Into<String>) -> Self {
        self.source_system = Some(system.into());
        self
    }

    /// Set the truncated API key
    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key_used = Some(key.into());
        self
    }

    /// Set the user agent
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Attach free-form context
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Filters for querying the audit trail
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityEventFilter {
    /// Restrict to one event type
    pub event_type: Option<String>,

    /// Restrict to one severity
    pub severity: Option<String>,

    /// Restrict to one source IP
    pub source_ip: Option<String>,

    /// Restrict to one source system
    pub source_system: Option<String>,

    /// Inclusive lower bound on timestamp
    pub start_time: Option<DateTime<Utc>>,

    /// Inclusive upper bound on timestamp
    pub end_time: Option<DateTime<Utc>>,

    /// Maximum rows returned
    pub limit: Option<i64>,

    /// Rows skipped
    pub offset: Option<i64>,
}

/// Per-IP upload count in a source analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpUploadCount {
    /// Uploading IP
    pub ip: String,

    /// Number of uploads seen from it
    pub upload_count: i64,
}

/// Aggregate view of one source system's upload behavior
///
/// Composite of several independent queries; eventually consistent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSourceAnalysis {
    /// System the analysis covers
    pub system_id: String,

    /// Calls uploaded by the system
    pub total_uploads: i64,

    /// Distinct IPs the system uploaded from
    pub unique_ips: i64,

    /// First upload seen
    pub first_seen: Option<DateTime<Utc>>,

    /// Most recent upload seen
    pub last_seen: Option<DateTime<Utc>>,

    /// Audit events attributed to the system
    pub total_events: i64,

    /// High or critical events
    pub security_violations: i64,

    /// Upload-related events
    pub upload_events: i64,

    /// Per-IP upload breakdown, most active first
    pub ip_addresses: Vec<IpUploadCount>,

    /// Ten most recent events
    pub recent_events: Vec<SecurityEvent>,
}

/// Search query parameters shared by the call and transcript search paths
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Full-text query over transcripts
    pub query_text: Option<String>,

    /// Exact frequency filter, Hz
    pub frequency: Option<i64>,

    /// Talkgroup filter
    pub talkgroup_id: Option<i32>,

    /// System filter
    pub system_id: Option<i32>,

    /// Inclusive lower bound on call timestamp
    pub start_time: Option<DateTime<Utc>>,

    /// Inclusive upper bound on call timestamp
    pub end_time: Option<DateTime<Utc>>,

    /// Maximum rows returned (clamped to [1, 1000])
    pub limit: Option<i64>,

    /// Rows skipped
    pub offset: Option<i64>,
}

impl SearchQuery {
    /// Effective limit, clamped to [1, 1000] with a default of 50
    #[must_use]
    pub fn effective_limit(&self) -> i64 {
        self.limit.unwrap_or(50).clamp(1, 1000)
    }

    /// Effective offset, non-negative
    #[must_use]
    pub fn effective_offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

/// Search result joining call metadata with its transcription
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// Call identifier
    pub call_id: Uuid,

    /// When the call occurred
    pub timestamp: DateTime<Utc>,

    /// Frequency in Hz
    pub frequency: i64,

    /// Talkgroup ID
    pub talkgroup_id: Option<i32>,

    /// Talkgroup label
    pub talkgroup_label: Option<String>,

    /// System label
    pub system_label: Option<String>,

    /// Talker alias
    pub talker_alias: Option<String>,

    /// Audio file location
    pub audio_file_path: String,

    /// Audio duration, seconds
    pub audio_duration_seconds: Option<f64>,

    /// Full transcript
    pub full_transcript: Option<String>,

    /// Number of speakers
    pub speaker_count: Option<i32>,

    /// Transcription confidence
    pub confidence_score: Option<f64>,

    /// Full-text rank when a query text was given; stable ordering key
    pub search_rank: Option<f64>,
}

/// Paginated transcript search response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedSearchResponse {
    /// Result rows
    pub results: Vec<SearchResult>,

    /// Approximate total: `offset + results.len()`
    pub total: i64,

    /// Limit applied
    pub limit: i64,

    /// Offset applied
    pub offset: i64,

    /// Query text echoed back
    pub query: String,
}

#[cfg(test)]
#[allow(
    clippy::missing_panics_doc,
    clippy::field_reassign_with_default,
    clippy::float_cmp,
    clippy::uninlined_format_args
)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde_json::json;
    use validator::Validate;

    #[test]
    fn test_transcription_status_default() {
        assert_eq!(TranscriptionStatus::default(), TranscriptionStatus::Pending);
    }

    #[test]
    fn test_transcription_status_display() {
        assert_eq!(format!("{}", TranscriptionStatus::Pending), "pending");
        assert_eq!(format!("{}", TranscriptionStatus::Processing), "processing");
        assert_eq!(format!("{}", TranscriptionStatus::Completed), "completed");
        assert_eq!(format!("{}", TranscriptionStatus::Failed), "failed");
    }

    #[test]
    fn test_transcription_status_serialization() {
        let status = TranscriptionStatus::Completed;
        let serialized = serde_json::to_string(&status).unwrap();
        assert_eq!(serialized, "\"completed\"");

        let deserialized: TranscriptionStatus = serde_json::from_str(&serialized).unwrap();
        assert_eq!(deserialized, TranscriptionStatus::Completed);
    }

    #[test]
    fn test_status_transitions_are_monotone() {
        use TranscriptionStatus::{Completed, Failed, Pending, Processing};

        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));

        // No back edges, no skips
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Pending.can_transition_to(Failed));
        assert!(!Processing.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Processing));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Pending));
        assert!(!Failed.can_transition_to(Completed));
    }

    #[test]
    fn test_terminal_states() {
        assert!(!TranscriptionStatus::Pending.is_terminal());
        assert!(!TranscriptionStatus::Processing.is_terminal());
        assert!(TranscriptionStatus::Completed.is_terminal());
        assert!(TranscriptionStatus::Failed.is_terminal());
    }

    #[test]
    fn test_radio_call_create_new() {
        let ts = Utc::now();
        let call = RadioCallCreate::new(ts, 460_025_000, "/tmp/a.mp3".to_string());

        assert_eq!(call.timestamp, ts);
        assert_eq!(call.frequency, 460_025_000);
        assert_eq!(call.audio_format, "mp3");
        assert!(call.talkgroup_id.is_none());
        assert!(call.upload_api_key_id.is_none());
    }

    #[test]
    fn test_radio_call_create_fresh_ids() {
        let ts = Utc::now();
        let a = RadioCallCreate::new(ts, 0, String::new());
        let b = RadioCallCreate::new(ts, 0, String::new());
        assert_ne!(a.call_id, b.call_id);
    }

    #[test]
    fn test_radio_call_create_validation_label_too_long() {
        let mut call = RadioCallCreate::new(Utc::now(), 0, "/tmp/a.mp3".to_string());
        call.system_label = Some("a".repeat(256));

        let result = call.validate();
        assert!(result.is_err());
        let errors = result.unwrap_err();
        assert!(errors.field_errors().contains_key("system_label"));
    }

    #[test]
    fn test_radio_call_create_serialization_roundtrip() {
        let mut call = RadioCallCreate::new(Utc::now(), 854_000_000, "/tmp/x.mp3".to_string());
        call.talkgroup_id = Some(52197);
        call.upload_source_ip = Some("10.0.0.1".to_string());
        call.upload_api_key_id = Some("legacy".to_string());

        let serialized = serde_json::to_string(&call).unwrap();
        let deserialized: RadioCallCreate = serde_json::from_str(&serialized).unwrap();

        assert_eq!(deserialized.call_id, call.call_id);
        assert_eq!(deserialized.talkgroup_id, call.talkgroup_id);
        assert_eq!(deserialized.frequency, call.frequency);
        assert_eq!(deserialized.upload_source_ip, call.upload_source_ip);
        assert_eq!(deserialized.upload_api_key_id, call.upload_api_key_id);
    }

    #[test]
    fn test_speaker_segment_new() {
        let call_id = Uuid::new_v4();
        let segment = SpeakerSegment::new(call_id, 0.0, 2.5, "SPEAKER_00", "unit responding");

        assert_eq!(segment.call_id, call_id);
        assert_eq!(segment.speaker_id, "SPEAKER_00");
        assert_eq!(segment.text, "unit responding");
        assert!(segment.start_time_seconds < segment.end_time_seconds);
        assert!(segment.confidence_score.is_none());
    }

    #[test]
    fn test_severity_parse_roundtrip() {
        for severity in [
            Severity::Info,
            Severity::Low,
            Severity::Medium,
            Severity::High,
            Severity::Critical,
        ] {
            assert_eq!(Severity::parse(severity.as_str()), Some(severity));
        }
        assert_eq!(Severity::parse("unknown"), None);
    }

    #[test]
    fn test_event_type_stable_strings() {
        assert_eq!(SecurityEventType::ApiKeyUsed.as_str(), "api_key_used");
        assert_eq!(SecurityEventType::InvalidApiKey.as_str(), "invalid_api_key");
        assert_eq!(
            SecurityEventType::ApiKeyIpViolation.as_str(),
            "api_key_ip_violation"
        );
        assert_eq!(
            SecurityEventType::ApiKeySystemViolation.as_str(),
            "api_key_system_violation"
        );
        assert_eq!(
            SecurityEventType::RateLimitExceeded.as_str(),
            "rate_limit_exceeded"
        );
        assert_eq!(SecurityEventType::UploadSuccess.as_str(), "upload_success");
        assert_eq!(SecurityEventType::UploadBlocked.as_str(), "upload_blocked");
    }

    #[test]
    fn test_event_type_severities_match_taxonomy() {
        assert_eq!(SecurityEventType::ApiKeyUsed.severity(), Severity::Info);
        assert_eq!(SecurityEventType::InvalidApiKey.severity(), Severity::Medium);
        assert_eq!(
            SecurityEventType::ApiKeyIpViolation.severity(),
            Severity::High
        );
        assert_eq!(
            SecurityEventType::ApiKeySystemViolation.severity(),
            Severity::High
        );
        assert_eq!(
            SecurityEventType::RateLimitExceeded.severity(),
            Severity::Medium
        );
        assert_eq!(SecurityEventType::UploadSuccess.severity(), Severity::Info);
        assert_eq!(SecurityEventType::UploadBlocked.severity(), Severity::Medium);
    }

    #[test]
    fn test_security_event_builder() {
        let event = SecurityEvent::new(SecurityEventType::ApiKeyIpViolation, "bad ip")
            .with_source_ip("10.0.0.1")
            .with_source_system("123")
            .with_api_key("abcd1234...")
            .with_user_agent("sdrtrunk")
            .with_metadata(json!({"allowed_ips": ["10.0.0.2"]}));

        assert_eq!(event.severity, Severity::High);
        assert_eq!(event.source_ip.as_deref(), Some("10.0.0.1"));
        assert_eq!(event.source_system.as_deref(), Some("123"));
        assert_eq!(event.api_key_used.as_deref(), Some("abcd1234..."));
        assert_eq!(event.user_agent.as_deref(), Some("sdrtrunk"));
        assert!(event.metadata.is_some());
        assert!(event.related_call_id.is_none());
    }

    #[test]
    fn test_security_event_serialization() {
        let event = SecurityEvent::new(SecurityEventType::UploadBlocked, "bad magic");
        let serialized = serde_json::to_string(&event).unwrap();
        assert!(serialized.contains("\"upload_blocked\""));
        assert!(serialized.contains("\"medium\""));

        let deserialized: SecurityEvent = serde_json::from_str(&serialized).unwrap();
        assert_eq!(deserialized.event_type, SecurityEventType::UploadBlocked);
        assert_eq!(deserialized.severity, Severity::Medium);
    }

    #[test]
    fn test_search_query_limit_clamping() {
        let query = SearchQuery::default();
        assert_eq!(query.effective_limit(), 50);
        assert_eq!(query.effective_offset(), 0);

        let query = SearchQuery {
            limit: Some(5000),
            offset: Some(-3),
            ..Default::default()
        };
        assert_eq!(query.effective_limit(), 1000);
        assert_eq!(query.effective_offset(), 0);

        let query = SearchQuery {
            limit: Some(0),
            ..Default::default()
        };
        assert_eq!(query.effective_limit(), 1);
    }

    proptest! {
        #[test]
        fn test_transcription_status_roundtrip(status in prop_oneof![
            Just(TranscriptionStatus::Pending),
            Just(TranscriptionStatus::Processing),
            Just(TranscriptionStatus::Completed),
            Just(TranscriptionStatus::Failed),
        ]) {
            let serialized = serde_json::to_string(&status).unwrap();
            let deserialized: TranscriptionStatus = serde_json::from_str(&serialized).unwrap();
            prop_assert_eq!(status, deserialized);
            prop_assert_eq!(TranscriptionStatus::parse(status.as_str()), Some(status));
        }

        #[test]
        fn test_no_transition_escapes_terminal_states(
            from in prop_oneof![
                Just(TranscriptionStatus::Completed),
                Just(TranscriptionStatus::Failed),
            ],
            to in prop_oneof![
                Just(TranscriptionStatus::Pending),
                Just(TranscriptionStatus::Processing),
                Just(TranscriptionStatus::Completed),
                Just(TranscriptionStatus::Failed),
            ],
        ) {
            prop_assert!(!from.can_transition_to(to));
        }

        #[test]
        fn test_event_type_roundtrip(event_type in prop_oneof![
            Just(SecurityEventType::ApiKeyUsed),
            Just(SecurityEventType::InvalidApiKey),
            Just(SecurityEventType::ApiKeyIpViolation),
            Just(SecurityEventType::ApiKeySystemViolation),
            Just(SecurityEventType::RateLimitExceeded),
            Just(SecurityEventType::UploadSuccess),
            Just(SecurityEventType::UploadBlocked),
        ]) {
            prop_assert_eq!(
                SecurityEventType::parse(event_type.as_str()),
                Some(event_type)
            );
        }
    }
}
