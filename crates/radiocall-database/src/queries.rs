//! Database query operations for the radio call ingest pipeline

use crate::map_sqlx_error;
use crate::models::{
    RadioCallRow, SearchResultRow, SpeakerSegmentRow, TranscriptionRow, parse_ip,
};
use chrono::{DateTime, Utc};
use radiocall_core::types::{
    RadioCall, RadioCallCreate, SearchQuery, SearchResult, SpeakerSegment, Transcription,
    TranscriptionStatus,
};
use radiocall_core::{Error, Result};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

const INSERT_CALL: &str = r"
    INSERT INTO radio_calls (
        timestamp, call_id, frequency, talkgroup_id, source_radio_id, system_id,
        system_label, talkgroup_label, talkgroup_group, talker_alias,
        audio_file_path, audio_duration_seconds, audio_format,
        transcription_status, upload_source_ip, upload_source_system,
        upload_api_key_id, upload_user_agent
    ) VALUES (
        $1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
        $11, $12, $13, $14, $15, $16, $17, $18
    )
    RETURNING *
";

const INSERT_TRANSCRIPTION: &str = r"
    INSERT INTO transcriptions (
        call_id, full_transcript, language, confidence_score,
        speaker_count, model_name, processing_time_seconds
    ) VALUES ($1, $2, $3, $4, $5, $6, $7)
    RETURNING *
";

const INSERT_SEGMENT: &str = r"
    INSERT INTO speaker_segments (
        call_id, segment_id, start_time_seconds, end_time_seconds,
        speaker_id, text, confidence_score
    ) VALUES ($1, $2, $3, $4, $5, $6, $7)
    RETURNING *
";

/// Everything the atomic commit wrote, as stored
#[derive(Debug, Clone)]
pub struct StoredTranscription {
    /// The call row, status `completed`
    pub call: RadioCall,

    /// The transcription row
    pub transcription: Transcription,

    /// Segment rows in insertion order
    pub segments: Vec<SpeakerSegment>,
}

/// Radio call operations
#[derive(Debug)]
pub struct CallQueries;

impl CallQueries {
    /// Insert a new call row in `pending` state (the alternative ingress
    /// for calls accepted but not yet worked)
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn create(pool: &PgPool, call: &RadioCallCreate) -> Result<RadioCall> {
        let row = sqlx::query_as::<_, RadioCallRow>(INSERT_CALL)
            .bind(call.timestamp)
            .bind(call.call_id)
            .bind(call.frequency)
            .bind(call.talkgroup_id)
            .bind(call.source_radio_id)
            .bind(call.system_id)
            .bind(&call.system_label)
            .bind(&call.talkgroup_label)
            .bind(&call.talkgroup_group)
            .bind(&call.talker_alias)
            .bind(&call.audio_file_path)
            .bind(call.audio_duration_seconds)
            .bind(&call.audio_format)
            .bind(TranscriptionStatus::Pending.as_str())
            .bind(parse_ip(call.upload_source_ip.as_deref()))
            .bind(&call.upload_source_system)
            .bind(&call.upload_api_key_id)
            .bind(&call.upload_user_agent)
            .fetch_one(pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.into_call())
    }

    /// Move a call to a terminal state out of band. The happy path never
    /// calls this; `TranscriptionQueries::store_complete` owns completion.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub async fn update_status(
        pool: &PgPool,
        call_id: Uuid,
        status: TranscriptionStatus,
        at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r"
            UPDATE radio_calls
            SET transcription_status = $2, transcribed_at = $3
            WHERE call_id = $1
            ",
        )
        .bind(call_id)
        .bind(status.as_str())
        .bind(at)
        .execute(pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    /// Point lookup by call id
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no such call exists, or a store error.
    pub async fn get(pool: &PgPool, call_id: Uuid) -> Result<RadioCall> {
        let row = sqlx::query_as::<_, RadioCallRow>("SELECT * FROM radio_calls WHERE call_id = $1")
            .bind(call_id)
            .fetch_optional(pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(RadioCallRow::into_call).ok_or_else(|| Error::NotFound {
            resource: format!("RadioCall {call_id}"),
        })
    }

    /// Filtered, paged call listing ordered newest first
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn search(pool: &PgPool, query: &SearchQuery) -> Result<Vec<RadioCall>> {
        let mut builder: QueryBuilder<'_, Postgres> =
            QueryBuilder::new("SELECT * FROM radio_calls WHERE 1=1");

        if let Some(frequency) = query.frequency {
            builder.push(" AND frequency = ").push_bind(frequency);
        }
        if let Some(talkgroup_id) = query.talkgroup_id {
            builder.push(" AND talkgroup_id = ").push_bind(talkgroup_id);
        }
        if let Some(system_id) = query.system_id {
            builder.push(" AND system_id = ").push_bind(system_id);
        }
        if let Some(start_time) = query.start_time {
            builder.push(" AND timestamp >= ").push_bind(start_time);
        }
        if let Some(end_time) = query.end_time {
            builder.push(" AND timestamp <= ").push_bind(end_time);
        }

        builder
            .push(" ORDER BY timestamp DESC LIMIT ")
            .push_bind(query.effective_limit())
            .push(" OFFSET ")
            .push_bind(query.effective_offset());

        let rows: Vec<RadioCallRow> = builder
            .build_query_as()
            .fetch_all(pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(RadioCallRow::into_call).collect())
    }
}

/// Transcription operations
#[derive(Debug)]
pub struct TranscriptionQueries;

impl TranscriptionQueries {
    /// Point lookup by call id
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no transcription exists, or a store error.
    pub async fn get(pool: &PgPool, call_id: Uuid) -> Result<Transcription> {
        let row = sqlx::query_as::<_, TranscriptionRow>(
            "SELECT * FROM transcriptions WHERE call_id = $1",
        )
        .bind(call_id)
        .fetch_optional(pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(TranscriptionRow::into_transcription)
            .ok_or_else(|| Error::NotFound {
                resource: format!("Transcription {call_id}"),
            })
    }

    /// Store a complete transcription result as one transaction: the call
    /// row (status `processing`), the transcription row, every segment in
    /// order, then the call row's move to `completed`. Commits all or
    /// nothing; this is the point at which the call becomes visible.
    ///
    /// # Errors
    ///
    /// Returns an error if any statement or the commit fails; nothing is
    /// visible in that case.
    pub async fn store_complete(
        pool: &PgPool,
        call: &RadioCallCreate,
        transcription: &Transcription,
        segments: &[SpeakerSegment],
    ) -> Result<StoredTranscription> {
        let mut tx = pool.begin().await.map_err(map_sqlx_error)?;

        sqlx::query(INSERT_CALL)
            .bind(call.timestamp)
            .bind(call.call_id)
            .bind(call.frequency)
            .bind(call.talkgroup_id)
            .bind(call.source_radio_id)
            .bind(call.system_id)
            .bind(&call.system_label)
            .bind(&call.talkgroup_label)
            .bind(&call.talkgroup_group)
            .bind(&call.talker_alias)
            .bind(&call.audio_file_path)
            .bind(call.audio_duration_seconds)
            .bind(&call.audio_format)
            .bind(TranscriptionStatus::Processing.as_str())
            .bind(parse_ip(call.upload_source_ip.as_deref()))
            .bind(&call.upload_source_system)
            .bind(&call.upload_api_key_id)
            .bind(&call.upload_user_agent)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        let transcription_row = sqlx::query_as::<_, TranscriptionRow>(INSERT_TRANSCRIPTION)
            .bind(transcription.call_id)
            .bind(&transcription.full_transcript)
            .bind(&transcription.language)
            .bind(transcription.confidence_score)
            .bind(transcription.speaker_count)
            .bind(&transcription.model_name)
            .bind(transcription.processing_time_seconds)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        let mut stored_segments = Vec::with_capacity(segments.len());
        for segment in segments {
            let row = sqlx::query_as::<_, SpeakerSegmentRow>(INSERT_SEGMENT)
                .bind(segment.call_id)
                .bind(segment.segment_id)
                .bind(segment.start_time_seconds)
                .bind(segment.end_time_seconds)
                .bind(&segment.speaker_id)
                .bind(&segment.text)
                .bind(segment.confidence_score)
                .fetch_one(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
            stored_segments.push(row.into_segment());
        }

        let completed_row = sqlx::query_as::<_, RadioCallRow>(
            r"
            UPDATE radio_calls
            SET transcription_status = $2, transcribed_at = NOW()
            WHERE call_id = $1
            RETURNING *
            ",
        )
        .bind(call.call_id)
        .bind(TranscriptionStatus::Completed.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;

        tracing::info!(
            call_id = %call.call_id,
            segments = stored_segments.len(),
            "Stored complete transcription"
        );

        Ok(StoredTranscription {
            call: completed_row.into_call(),
            transcription: transcription_row.into_transcription(),
            segments: stored_segments,
        })
    }

    /// Full-text transcript search joined with call metadata. When a query
    /// text is present rows are ranked with `ts_rank` and ordered
    /// rank-then-time; otherwise newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn search(pool: &PgPool, query: &SearchQuery) -> Result<Vec<SearchResult>> {
        let mut builder: QueryBuilder<'_, Postgres> = QueryBuilder::new(
            r"
            SELECT rc.call_id, rc.timestamp, rc.frequency, rc.talkgroup_id,
                   rc.talkgroup_label, rc.system_label, rc.talker_alias,
                   rc.audio_file_path, rc.audio_duration_seconds,
                   t.full_transcript, t.speaker_count, t.confidence_score,
            ",
        );

        if let Some(text) = &query.query_text {
            builder
                .push(
                    "ts_rank(to_tsvector('english', t.full_transcript), plainto_tsquery(",
                )
                .push_bind(text.clone())
                .push("))::double precision AS search_rank");
        } else {
            builder.push("NULL::double precision AS search_rank");
        }

        builder.push(
            r"
            FROM radio_calls rc
            JOIN transcriptions t ON rc.call_id = t.call_id
            WHERE 1=1
            ",
        );

        if let Some(text) = &query.query_text {
            builder
                .push(" AND to_tsvector('english', t.full_transcript) @@ plainto_tsquery(")
                .push_bind(text.clone())
                .push(")");
        }
        if let Some(frequency) = query.frequency {
            builder.push(" AND rc.frequency = ").push_bind(frequency);
        }
        if let Some(talkgroup_id) = query.talkgroup_id {
            builder.push(" AND rc.talkgroup_id = ").push_bind(talkgroup_id);
        }
        if let Some(system_id) = query.system_id {
            builder.push(" AND rc.system_id = ").push_bind(system_id);
        }
        if let Some(start_time) = query.start_time {
            builder.push(" AND rc.timestamp >= ").push_bind(start_time);
        }
        if let Some(end_time) = query.end_time {
            builder.push(" AND rc.timestamp <= ").push_bind(end_time);
        }

        if query.query_text.is_some() {
            builder.push(" ORDER BY search_rank DESC, rc.timestamp DESC");
        } else {
            builder.push(" ORDER BY rc.timestamp DESC");
        }

        builder
            .push(" LIMIT ")
            .push_bind(query.effective_limit())
            .push(" OFFSET ")
            .push_bind(query.effective_offset());

        let rows: Vec<SearchResultRow> = builder
            .build_query_as()
            .fetch_all(pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(SearchResultRow::into_result).collect())
    }
}

/// Speaker segment operations
#[derive(Debug)]
pub struct SegmentQueries;

impl SegmentQueries {
    /// All segments for a call, ordered by start time
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn for_call(pool: &PgPool, call_id: Uuid) -> Result<Vec<SpeakerSegment>> {
        let rows = sqlx::query_as::<_, SpeakerSegmentRow>(
            r"
            SELECT * FROM speaker_segments
            WHERE call_id = $1
            ORDER BY start_time_seconds
            ",
        )
        .bind(call_id)
        .fetch_all(pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(SpeakerSegmentRow::into_segment).collect())
    }
}
