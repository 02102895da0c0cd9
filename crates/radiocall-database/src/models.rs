//! Database row models for the radio call ingest pipeline

use chrono::{DateTime, Utc};
use radiocall_core::types::{
    RadioCall, SearchResult, SecurityEvent, SecurityEventType, Severity, SpeakerSegment,
    Transcription, TranscriptionStatus,
};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::ipnetwork::IpNetwork;
use uuid::Uuid;

/// Row model for `radio_calls`
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RadioCallRow {
    /// Call identifier
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

    /// System label
    pub system_label: Option<String>,

    /// Talkgroup label
    pub talkgroup_label: Option<String>,

    /// Talkgroup group
    pub talkgroup_group: Option<String>,

    /// Talker alias
    pub talker_alias: Option<String>,

    /// Audio file path
    pub audio_file_path: String,

    /// Audio duration in seconds
    pub audio_duration_seconds: Option<f64>,

    /// Audio format
    pub audio_format: String,

    /// Transcription status as stored
    pub transcription_status: String,

    /// Terminal state timestamp
    pub transcribed_at: Option<DateTime<Utc>>,

    /// Upload source IP
    pub upload_source_ip: Option<IpNetwork>,

    /// Upload source system
    pub upload_source_system: Option<String>,

    /// Upload API key id
    pub upload_api_key_id: Option<String>,

    /// Upload user agent
    pub upload_user_agent: Option<String>,
}

impl RadioCallRow {
    /// Convert into the domain call type
    #[must_use]
    pub fn into_call(self) -> RadioCall {
        RadioCall {
            call_id: self.call_id,
            timestamp: self.timestamp,
            frequency: self.frequency,
            talkgroup_id: self.talkgroup_id,
            source_radio_id: self.source_radio_id,
            system_id: self.system_id,
            system_label: self.system_label,
            talkgroup_label: self.talkgroup_label,
            talkgroup_group: self.talkgroup_group,
            talker_alias: self.talker_alias,
            audio_file_path: self.audio_file_path,
            audio_duration_seconds: self.audio_duration_seconds,
            audio_format: self.audio_format,
            transcription_status: TranscriptionStatus::parse(&self.transcription_status)
                .unwrap_or_default(),
            transcribed_at: self.transcribed_at,
            upload_source_ip: self.upload_source_ip.map(|ip| ip.ip().to_string()),
            upload_source_system: self.upload_source_system,
            upload_api_key_id: self.upload_api_key_id,
            upload_user_agent: self.upload_user_agent,
        }
    }
}

/// Row model for `transcriptions`
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TranscriptionRow {
    /// Call identifier
    pub call_id: Uuid,

    /// Full transcript text
    pub full_transcript: String,

    /// Detected language
    pub language: Option<String>,

    /// Overall confidence
    pub confidence_score: Option<f64>,

    /// Number of speakers
    pub speaker_count: i32,

    /// Producing model
    pub model_name: Option<String>,

    /// Processing time in seconds
    pub processing_time_seconds: Option<f64>,
}

impl TranscriptionRow {
    /// Convert into the domain transcription type
    #[must_use]
    pub fn into_transcription(self) -> Transcription {
        Transcription {
            call_id: self.call_id,
            full_transcript: self.full_transcript,
            language: self.language,
            confidence_score: self.confidence_score,
            speaker_count: self.speaker_count,
            model_name: self.model_name,
            processing_time_seconds: self.processing_time_seconds,
        }
    }
}

/// Row model for `speaker_segments`
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SpeakerSegmentRow {
    /// Call identifier
    pub call_id: Uuid,

    /// Segment identifier
    pub segment_id: Uuid,

    /// Segment start, seconds
    pub start_time_seconds: f64,

    /// Segment end, seconds
    pub end_time_seconds: f64,

    /// Speaker label
    pub speaker_id: String,

    /// Segment transcript
    pub text: String,

    /// Segment confidence
    pub confidence_score: Option<f64>,
}

impl SpeakerSegmentRow {
    /// Convert into the domain segment type
    #[must_use]
    pub fn into_segment(self) -> SpeakerSegment {
        SpeakerSegment {
            call_id: self.call_id,
            segment_id: self.segment_id,
            start_time_seconds: self.start_time_seconds,
            end_time_seconds: self.end_time_seconds,
            speaker_id: self.speaker_id,
            text: self.text,
            confidence_score: self.confidence_score,
        }
    }
}

/// Row model for `security_events`
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SecurityEventRow {
    /// Event identifier
    pub event_id: Uuid,

    /// When the event occurred
    pub timestamp: DateTime<Utc>,

    /// Event type as stored
    pub event_type: String,

    /// Severity as stored
    pub severity: String,

    /// Source IP
    pub source_ip: Option<IpNetwork>,

    /// Source system
    pub source_system: Option<String>,

    /// Truncated API key
    pub api_key_used: Option<String>,

    /// User agent
    pub user_agent: Option<String>,

    /// Description
    pub description: String,

    /// Free-form context
    pub metadata: Option<serde_json::Value>,

    /// Related call
    pub related_call_id: Option<Uuid>,

    /// Related file
    pub related_file_path: Option<String>,
}

impl SecurityEventRow {
    /// Convert into the domain event type; rows with an unknown type or
    /// severity string are reported as `None`
    #[must_use]
    pub fn into_event(self) -> Option<SecurityEvent> {
        let event_type = SecurityEventType::parse(&self.event_type)?;
        let severity = Severity::parse(&self.severity)?;
        Some(SecurityEvent {
            event_id: self.event_id,
            timestamp: self.timestamp,
            event_type,
            severity,
            source_ip: self.source_ip.map(|ip| ip.ip().to_string()),
            source_system: self.source_system,
            api_key_used: self.api_key_used,
            user_agent: self.user_agent,
            description: self.description,
            metadata: self.metadata,
            related_call_id: self.related_call_id,
            related_file_path: self.related_file_path,
        })
    }
}

/// Row model for the joined transcript search
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SearchResultRow {
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

    /// Audio file path
    pub audio_file_path: String,

    /// Audio duration, seconds
    pub audio_duration_seconds: Option<f64>,

    /// Full transcript
    pub full_transcript: Option<String>,

    /// Speaker count
    pub speaker_count: Option<i32>,

    /// Transcription confidence
    pub confidence_score: Option<f64>,

    /// Full-text rank
    pub search_rank: Option<f64>,
}

impl SearchResultRow {
    /// Convert into the domain search result type
    #[must_use]
    pub fn into_result(self) -> SearchResult {
        SearchResult {
            call_id: self.call_id,
            timestamp: self.timestamp,
            frequency: self.frequency,
            talkgroup_id: self.talkgroup_id,
            talkgroup_label: self.talkgroup_label,
            system_label: self.system_label,
            talker_alias: self.talker_alias,
            audio_file_path: self.audio_file_path,
            audio_duration_seconds: self.audio_duration_seconds,
            full_transcript: self.full_transcript,
            speaker_count: self.speaker_count,
            confidence_score: self.confidence_score,
            search_rank: self.search_rank,
        }
    }
}

/// Parse an optional textual IP into the INET bind type
#[must_use]
pub(crate) fn parse_ip(ip: Option<&str>) -> Option<IpNetwork> {
    ip.and_then(|s| s.parse::<std::net::IpAddr>().ok())
        .map(IpNetwork::from)
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc, clippy::float_cmp)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_call_row() -> RadioCallRow {
        RadioCallRow {
            call_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            frequency: 460_025_000,
            talkgroup_id: Some(1001),
            source_radio_id: Some(42),
            system_id: Some(123),
            system_label: Some("Metro".to_string()),
            talkgroup_label: None,
            talkgroup_group: None,
            talker_alias: None,
            audio_file_path: "/tmp/a.mp3".to_string(),
            audio_duration_seconds: Some(12.5),
            audio_format: "mp3".to_string(),
            transcription_status: "completed".to_string(),
            transcribed_at: Some(Utc::now()),
            upload_source_ip: parse_ip(Some("10.0.0.1")),
            upload_source_system: Some("123".to_string()),
            upload_api_key_id: Some("abcd1234".to_string()),
            upload_user_agent: Some("sdrtrunk".to_string()),
        }
    }

    #[test]
    fn test_call_row_conversion() {
        let row = sample_call_row();
        let call_id = row.call_id;
        let call = row.into_call();

        assert_eq!(call.call_id, call_id);
        assert_eq!(call.transcription_status, TranscriptionStatus::Completed);
        assert_eq!(call.upload_source_ip.as_deref(), Some("10.0.0.1"));
        assert_eq!(call.frequency, 460_025_000);
        assert_eq!(call.audio_duration_seconds, Some(12.5));
    }

    #[test]
    fn test_call_row_unknown_status_defaults_to_pending() {
        let mut row = sample_call_row();
        row.transcription_status = "garbled".to_string();
        assert_eq!(
            row.into_call().transcription_status,
            TranscriptionStatus::Pending
        );
    }

    #[test]
    fn test_security_event_row_conversion() {
        let row = SecurityEventRow {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event_type: "api_key_ip_violation".to_string(),
            severity: "high".to_string(),
            source_ip: parse_ip(Some("10.0.0.1")),
            source_system: Some("123".to_string()),
            api_key_used: Some("abcd1234...".to_string()),
            user_agent: None,
            description: "API key used from unauthorized IP".to_string(),
            metadata: None,
            related_call_id: None,
            related_file_path: None,
        };

        let event = row.into_event().expect("known type and severity");
        assert_eq!(event.event_type, SecurityEventType::ApiKeyIpViolation);
        assert_eq!(event.severity, Severity::High);
        assert_eq!(event.source_ip.as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn test_security_event_row_unknown_type_is_none() {
        let row = SecurityEventRow {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event_type: "unknown_event".to_string(),
            severity: "info".to_string(),
            source_ip: None,
            source_system: None,
            api_key_used: None,
            user_agent: None,
            description: String::new(),
            metadata: None,
            related_call_id: None,
            related_file_path: None,
        };

        assert!(row.into_event().is_none());
    }

    #[test]
    fn test_parse_ip() {
        assert!(parse_ip(Some("10.0.0.1")).is_some());
        assert!(parse_ip(Some("::1")).is_some());
        assert!(parse_ip(Some("not an ip")).is_none());
        assert!(parse_ip(None).is_none());
    }
}
