//! Task and statistics types for the transcription work queue

use chrono::{DateTime, Utc};
use radiocall_core::types::RadioCallCreate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Task processing status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting in the main queue
    Pending,
    /// A worker holds the task
    Processing,
    /// Processor returned success
    Completed,
    /// Retries exhausted or retry queue full
    Failed,
    /// Waiting in the retry queue
    Retrying,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Retrying => write!(f, "retrying"),
        }
    }
}

/// A transcription task in the queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionTask {
    /// Unique task identifier
    pub task_id: Uuid,

    /// Call metadata the processor will commit
    pub call: RadioCallCreate,

    /// Materialized payload the processor will consume
    pub audio_file_path: PathBuf,

    /// When the task was enqueued
    pub created_at: DateTime<Utc>,

    /// When a worker picked the task up
    pub started_at: Option<DateTime<Utc>>,

    /// When the task reached a terminal state
    pub completed_at: Option<DateTime<Utc>>,

    /// Current status
    pub status: TaskStatus,

    /// Attempts that have failed so far
    pub retry_count: u32,

    /// Failures allowed before the task fails permanently
    pub max_retries: u32,

    /// Most recent failure message
    pub last_error: Option<String>,

    /// Worker currently or last holding the task
    pub worker_id: Option<String>,
}

impl TranscriptionTask {
    /// Create a pending task
    #[must_use]
    pub fn new(call: RadioCallCreate, audio_file_path: PathBuf, max_retries: u32) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            call,
            audio_file_path,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            status: TaskStatus::Pending,
            retry_count: 0,
            max_retries,
            last_error: None,
            worker_id: None,
        }
    }
}

/// Point-in-time queue statistics; one consistent snapshot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueStats {
    /// Tasks accepted by `try_enqueue`
    pub total_enqueued: u64,

    /// Tasks that reached `completed`
    pub total_processed: u64,

    /// Tasks that reached `failed`
    pub total_failed: u64,

    /// Retry attempts scheduled
    pub total_retries: u64,

    /// `try_enqueue` calls rejected on a full queue
    pub queue_full_rejections: u64,

    /// Exponential moving average of processing time, seconds
    pub average_processing_time: f64,

    /// Tasks currently in the main queue
    pub queue_size: usize,

    /// Tasks currently in the retry queue
    pub retry_queue_size: usize,

    /// Tasks tracked as active (queued, processing or retrying)
    pub active_tasks: usize,

    /// Completed task records retained
    pub completed_tasks: usize,

    /// Failed task records retained
    pub failed_tasks: usize,

    /// Spawned worker units (workers plus the retry shuffler)
    pub workers_running: usize,

    /// Whether the queue has been started and not stopped
    pub is_running: bool,
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn sample_call() -> RadioCallCreate {
        RadioCallCreate::new(Utc::now(), 460_025_000, "/tmp/a.mp3".to_string())
    }

    #[test]
    fn test_new_task_is_pending() {
        let task = TranscriptionTask::new(sample_call(), PathBuf::from("/tmp/a.mp3"), 3);

        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.retry_count, 0);
        assert_eq!(task.max_retries, 3);
        assert!(task.started_at.is_none());
        assert!(task.completed_at.is_none());
        assert!(task.last_error.is_none());
        assert!(task.worker_id.is_none());
    }

    #[test]
    fn test_task_ids_are_unique() {
        let a = TranscriptionTask::new(sample_call(), PathBuf::from("/tmp/a.mp3"), 3);
        let b = TranscriptionTask::new(sample_call(), PathBuf::from("/tmp/b.mp3"), 3);
        assert_ne!(a.task_id, b.task_id);
    }

    #[test]
    fn test_task_status_display() {
        assert_eq!(TaskStatus::Pending.to_string(), "pending");
        assert_eq!(TaskStatus::Processing.to_string(), "processing");
        assert_eq!(TaskStatus::Completed.to_string(), "completed");
        assert_eq!(TaskStatus::Failed.to_string(), "failed");
        assert_eq!(TaskStatus::Retrying.to_string(), "retrying");
    }

    #[test]
    fn test_task_serialization_roundtrip() {
        let task = TranscriptionTask::new(sample_call(), PathBuf::from("/tmp/a.mp3"), 3);

        let serialized = serde_json::to_string(&task).unwrap();
        let deserialized: TranscriptionTask = serde_json::from_str(&serialized).unwrap();

        assert_eq!(deserialized.task_id, task.task_id);
        assert_eq!(deserialized.status, TaskStatus::Pending);
        assert_eq!(deserialized.audio_file_path, task.audio_file_path);
        assert_eq!(deserialized.call.call_id, task.call.call_id);
    }
}
