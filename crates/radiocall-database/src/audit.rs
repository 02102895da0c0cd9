//! Append-only security audit sink
//!
//! Two variants, selected at construction: store-backed (Postgres) and
//! memory-backed (bounded ring). A store-backed sink that fails to write
//! degrades silently to the ring for the event at hand; audit writes never
//! fail the request they describe, and write failures are reported through
//! the application log only.

use crate::map_sqlx_error;
use crate::models::{SecurityEventRow, parse_ip};
use parking_lot::Mutex;
use radiocall_core::Result;
use radiocall_core::types::{
    IpUploadCount, SecurityEvent, SecurityEventFilter, Severity, UploadSourceAnalysis,
};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

const DEFAULT_RING_CAPACITY: usize = 1024;
const RECENT_EVENTS: i64 = 10;

#[derive(Debug)]
enum Sink {
    Store(PgPool),
    Memory,
}

/// Append-only security event sink
#[derive(Debug)]
pub struct AuditLog {
    sink: Sink,
    ring: Mutex<VecDeque<SecurityEvent>>,
    capacity: usize,
}

impl AuditLog {
    /// Durable sink writing to `security_events`
    #[must_use]
    pub fn store_backed(pool: PgPool) -> Self {
        Self {
            sink: Sink::Store(pool),
            ring: Mutex::new(VecDeque::new()),
            capacity: DEFAULT_RING_CAPACITY,
        }
    }

    /// In-memory sink holding at most `capacity` events, dropping oldest
    #[must_use]
    pub fn memory_backed(capacity: usize) -> Self {
        Self {
            sink: Sink::Memory,
            ring: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    /// Record an event. Never fails the caller: a failed durable write
    /// lands the event in the fallback ring and is logged.
    pub async fn emit(&self, event: SecurityEvent) {
        match event.severity {
            Severity::Info | Severity::Low => tracing::info!(
                event_type = %event.event_type,
                source_ip = event.source_ip.as_deref(),
                source_system = event.source_system.as_deref(),
                "Security event: {}",
                event.description
            ),
            Severity::Medium => tracing::warn!(
                event_type = %event.event_type,
                source_ip = event.source_ip.as_deref(),
                source_system = event.source_system.as_deref(),
                "Security event: {}",
                event.description
            ),
            Severity::High | Severity::Critical => tracing::error!(
                event_type = %event.event_type,
                source_ip = event.source_ip.as_deref(),
                source_system = event.source_system.as_deref(),
                "Security event: {}",
                event.description
            ),
        }

        match &self.sink {
            Sink::Store(pool) => {
                if let Err(e) = Self::insert(pool, &event).await {
                    tracing::warn!("Failed to store security event durably: {e}");
                    self.push_ring(event);
                }
            }
            Sink::Memory => self.push_ring(event),
        }
    }

    fn push_ring(&self, event: SecurityEvent) {
        let mut ring = self.ring.lock();
        if ring.len() >= self.capacity {
            ring.pop_front();
        }
        ring.push_back(event);
    }

    async fn insert(pool: &PgPool, event: &SecurityEvent) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO security_events (
                timestamp, event_id, event_type, severity, source_ip,
                source_system, api_key_used, user_agent, description,
                metadata, related_call_id, related_file_path
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ",
        )
        .bind(event.timestamp)
        .bind(event.event_id)
        .bind(event.event_type.as_str())
        .bind(event.severity.as_str())
        .bind(parse_ip(event.source_ip.as_deref()))
        .bind(&event.source_system)
        .bind(&event.api_key_used)
        .bind(&event.user_agent)
        .bind(&event.description)
        .bind(&event.metadata)
        .bind(event.related_call_id)
        .bind(&event.related_file_path)
        .execute(pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    /// Filtered read, newest first. A store-backed sink that cannot be
    /// read falls back to whatever the ring holds.
    ///
    /// # Errors
    ///
    /// Currently infallible in practice; the signature leaves room for the
    /// store-backed variant to surface read errors it cannot degrade from.
    pub async fn query(&self, filter: &SecurityEventFilter) -> Result<Vec<SecurityEvent>> {
        match &self.sink {
            Sink::Store(pool) => match Self::query_store(pool, filter).await {
                Ok(events) => Ok(events),
                Err(e) => {
                    tracing::warn!("Failed to query security events from store: {e}");
                    Ok(self.query_ring(filter))
                }
            },
            Sink::Memory => Ok(self.query_ring(filter)),
        }
    }

    async fn query_store(
        pool: &PgPool,
        filter: &SecurityEventFilter,
    ) -> Result<Vec<SecurityEvent>> {
        let mut builder: QueryBuilder<'_, Postgres> =
            QueryBuilder::new("SELECT * FROM security_events WHERE 1=1");

        if let Some(event_type) = &filter.event_type {
            builder.push(" AND event_type = ").push_bind(event_type.clone());
        }
        if let Some(severity) = &filter.severity {
            builder.push(" AND severity = ").push_bind(severity.clone());
        }
        if let Some(source_ip) = &filter.source_ip {
            builder
                .push(" AND source_ip = ")
                .push_bind(parse_ip(Some(source_ip)));
        }
        if let Some(source_system) = &filter.source_system {
            builder
                .push(" AND source_system = ")
                .push_bind(source_system.clone());
        }
        if let Some(start_time) = filter.start_time {
            builder.push(" AND timestamp >= ").push_bind(start_time);
        }
        if let Some(end_time) = filter.end_time {
            builder.push(" AND timestamp <= ").push_bind(end_time);
        }

        builder
            .push(" ORDER BY timestamp DESC LIMIT ")
            .push_bind(filter.limit.unwrap_or(100).clamp(1, 1000))
            .push(" OFFSET ")
            .push_bind(filter.offset.unwrap_or(0).max(0));

        let rows: Vec<SecurityEventRow> = builder
            .build_query_as()
            .fetch_all(pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().filter_map(SecurityEventRow::into_event).collect())
    }

    fn query_ring(&self, filter: &SecurityEventFilter) -> Vec<SecurityEvent> {
        let ring = self.ring.lock();
        let mut events: Vec<SecurityEvent> = ring
            .iter()
            .filter(|e| {
                filter
                    .event_type
                    .as_ref()
                    .is_none_or(|t| e.event_type.as_str() == t.as_str())
                    && filter
                        .severity
                        .as_ref()
                        .is_none_or(|s| e.severity.as_str() == s.as_str())
                    && filter
                        .source_ip
                        .as_ref()
                        .is_none_or(|ip| e.source_ip.as_deref() == Some(ip.as_str()))
                    && filter
                        .source_system
                        .as_ref()
                        .is_none_or(|sys| e.source_system.as_deref() == Some(sys.as_str()))
                    && filter.start_time.is_none_or(|t| e.timestamp >= t)
                    && filter.end_time.is_none_or(|t| e.timestamp <= t)
            })
            .cloned()
            .collect();

        events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let offset = filter.offset.unwrap_or(0).max(0) as usize;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let limit = filter.limit.unwrap_or(100).clamp(1, 1000) as usize;

        events.into_iter().skip(offset).take(limit).collect()
    }

    /// Aggregate upload and event activity for one source system. A
    /// composite of independent reads with no transactional contract;
    /// the view is eventually consistent.
    ///
    /// # Errors
    ///
    /// Returns an error if the store-backed reads fail.
    pub async fn analyze_source(&self, system_id: &str) -> Result<UploadSourceAnalysis> {
        match &self.sink {
            Sink::Store(pool) => self.analyze_store(pool, system_id).await,
            Sink::Memory => Ok(self.analyze_ring(system_id)),
        }
    }

    async fn analyze_store(&self, pool: &PgPool, system_id: &str) -> Result<UploadSourceAnalysis> {
        let upload_stats = sqlx::query(
            r"
            SELECT
                COUNT(*) AS total_uploads,
                COUNT(DISTINCT upload_source_ip) AS unique_ips,
                MIN(timestamp) AS first_seen,
                MAX(timestamp) AS last_seen
            FROM radio_calls
            WHERE upload_source_system = $1
            ",
        )
        .bind(system_id)
        .fetch_one(pool)
        .await
        .map_err(map_sqlx_error)?;

        let event_stats = sqlx::query(
            r"
            SELECT
                COUNT(*) AS total_events,
                COUNT(*) FILTER (WHERE severity IN ('high', 'critical')) AS violations,
                COUNT(*) FILTER (WHERE event_type LIKE '%upload%') AS upload_events
            FROM security_events
            WHERE source_system = $1
            ",
        )
        .bind(system_id)
        .fetch_one(pool)
        .await
        .map_err(map_sqlx_error)?;

        let ip_rows = sqlx::query(
            r"
            SELECT upload_source_ip, COUNT(*) AS upload_count
            FROM radio_calls
            WHERE upload_source_system = $1 AND upload_source_ip IS NOT NULL
            GROUP BY upload_source_ip
            ORDER BY upload_count DESC
            ",
        )
        .bind(system_id)
        .fetch_all(pool)
        .await
        .map_err(map_sqlx_error)?;

        let ip_addresses = ip_rows
            .into_iter()
            .map(|row| {
                let ip: sqlx::types::ipnetwork::IpNetwork = row.get("upload_source_ip");
                IpUploadCount {
                    ip: ip.ip().to_string(),
                    upload_count: row.get("upload_count"),
                }
            })
            .collect();

        let recent_events = self
            .query(&SecurityEventFilter {
                source_system: Some(system_id.to_string()),
                limit: Some(RECENT_EVENTS),
                ..Default::default()
            })
            .await?;

        Ok(UploadSourceAnalysis {
            system_id: system_id.to_string(),
            total_uploads: upload_stats.get("total_uploads"),
            unique_ips: upload_stats.get("unique_ips"),
            first_seen: upload_stats.get("first_seen"),
            last_seen: upload_stats.get("last_seen"),
            total_events: event_stats.get("total_events"),
            security_violations: event_stats.get("violations"),
            upload_events: event_stats.get("upload_events"),
            ip_addresses,
            recent_events,
        })
    }

    #[allow(clippy::cast_possible_wrap)]
    fn analyze_ring(&self, system_id: &str) -> UploadSourceAnalysis {
        let ring = self.ring.lock();
        let events: Vec<&SecurityEvent> = ring
            .iter()
            .filter(|e| e.source_system.as_deref() == Some(system_id))
            .collect();

        let uploads: Vec<&&SecurityEvent> = events
            .iter()
            .filter(|e| e.event_type.as_str().contains("upload"))
            .collect();

        let unique_ips: BTreeSet<&str> = events
            .iter()
            .filter_map(|e| e.source_ip.as_deref())
            .collect();

        let mut per_ip: BTreeMap<String, i64> = BTreeMap::new();
        for event in &uploads {
            if let Some(ip) = event.source_ip.as_deref() {
                *per_ip.entry(ip.to_string()).or_insert(0) += 1;
            }
        }
        let mut ip_addresses: Vec<IpUploadCount> = per_ip
            .into_iter()
            .map(|(ip, upload_count)| IpUploadCount { ip, upload_count })
            .collect();
        ip_addresses.sort_by(|a, b| b.upload_count.cmp(&a.upload_count));

        let mut recent: Vec<SecurityEvent> = events.iter().map(|e| (*e).clone()).collect();
        recent.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        recent.truncate(usize::try_from(RECENT_EVENTS).unwrap_or_default());

        UploadSourceAnalysis {
            system_id: system_id.to_string(),
            total_uploads: uploads
                .iter()
                .filter(|e| e.event_type.as_str() == "upload_success")
                .count() as i64,
            unique_ips: unique_ips.len() as i64,
            first_seen: events.iter().map(|e| e.timestamp).min(),
            last_seen: events.iter().map(|e| e.timestamp).max(),
            total_events: events.len() as i64,
            security_violations: events
                .iter()
                .filter(|e| matches!(e.severity, Severity::High | Severity::Critical))
                .count() as i64,
            upload_events: uploads.len() as i64,
            ip_addresses,
            recent_events: recent,
        }
    }

    /// Snapshot of the ring buffer in insertion order
    #[must_use]
    pub fn buffered(&self) -> Vec<SecurityEvent> {
        self.ring.lock().iter().cloned().collect()
    }
}
