//! Bounded transcription work queue
//!
//! A main FIFO feeds N workers; failed tasks take a retry FIFO of half the
//! main capacity back to the tail. Enqueue is non-blocking so the ingest
//! path observes backpressure as `QueueFull` instead of waiting.

use crate::task::{QueueStats, TaskStatus, TranscriptionTask};
use async_channel::{Receiver, Sender};
use dashmap::DashMap;
use parking_lot::Mutex;
use radiocall_core::config::QueueConfig;
use radiocall_core::types::RadioCallCreate;
use radiocall_core::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// How long a worker waits on the main queue before re-checking shutdown
const DEQUEUE_POLL: Duration = Duration::from_secs(1);

/// How long the shuffler blocks putting a retry back onto the main queue
const SHUFFLE_PUT_WAIT: Duration = Duration::from_secs(5);

/// Linear backoff step and cap, seconds
const BACKOFF_STEP_SECS: u64 = 5;
const BACKOFF_CAP_SECS: u64 = 30;

/// Opaque processor failure
pub type ProcessError = Box<dyn std::error::Error + Send + Sync>;

/// The side effect the queue drives for each task
#[async_trait::async_trait]
pub trait TaskProcessor: Send + Sync {
    /// Process one task; the queue interprets only success vs failure
    async fn process(
        &self,
        audio_path: &Path,
        call: &RadioCallCreate,
    ) -> std::result::Result<(), ProcessError>;

    /// Called exactly once when a task will never be attempted again
    async fn on_permanent_failure(&self, task: &TranscriptionTask) {
        let _ = task;
    }
}

#[derive(Debug, Default)]
struct Counters {
    total_enqueued: u64,
    total_processed: u64,
    total_failed: u64,
    total_retries: u64,
    queue_full_rejections: u64,
    average_processing_time: f64,
    processed_samples: u64,
}

impl Counters {
    /// Seeded exponential moving average: the first sample sets the
    /// average directly, later samples fold in at 0.1 weight
    fn record_processing_time(&mut self, elapsed: f64) {
        if self.processed_samples == 0 {
            self.average_processing_time = elapsed;
        } else {
            self.average_processing_time =
                self.average_processing_time * 0.9 + elapsed * 0.1;
        }
        self.processed_samples += 1;
    }
}

/// Bounded FIFO work queue with a worker pool and retry channel
#[derive(Debug)]
pub struct TranscriptionQueue {
    config: QueueConfig,

    main_tx: Sender<TranscriptionTask>,
    main_rx: Receiver<TranscriptionTask>,
    retry_tx: Sender<TranscriptionTask>,
    retry_rx: Receiver<TranscriptionTask>,

    /// Tasks enqueued, processing or retrying
    active: DashMap<Uuid, TranscriptionTask>,
    /// Terminal success records, reaped by `cleanup_old`
    completed: DashMap<Uuid, TranscriptionTask>,
    /// Terminal failure records, reaped by `cleanup_old`
    failed: DashMap<Uuid, TranscriptionTask>,

    counters: Mutex<Counters>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    cancel: CancellationToken,
    running: AtomicBool,
}

impl TranscriptionQueue {
    /// Create a stopped queue with the configured capacities
    #[must_use]
    pub fn new(config: QueueConfig) -> Self {
        let (main_tx, main_rx) = async_channel::bounded(config.queue_size.max(1));
        let (retry_tx, retry_rx) = async_channel::bounded((config.queue_size / 2).max(1));

        Self {
            config,
            main_tx,
            main_rx,
            retry_tx,
            retry_rx,
            active: DashMap::new(),
            completed: DashMap::new(),
            failed: DashMap::new(),
            counters: Mutex::new(Counters::default()),
            workers: Mutex::new(Vec::new()),
            cancel: CancellationToken::new(),
            running: AtomicBool::new(false),
        }
    }

    /// Enqueue without blocking. A saturated queue is the backpressure
    /// signal the ingest endpoint acts on.
    ///
    /// # Errors
    ///
    /// Returns `QueueFull` when the main queue is at capacity; the
    /// rejection counter is incremented.
    pub fn try_enqueue(&self, call: RadioCallCreate, audio_file_path: PathBuf) -> Result<Uuid> {
        let task = TranscriptionTask::new(call, audio_file_path, self.config.max_retries);
        let task_id = task.task_id;

        match self.main_tx.try_send(task.clone()) {
            Ok(()) => {
                self.active.insert(task_id, task);
                self.counters.lock().total_enqueued += 1;
                tracing::debug!(task_id = %task_id, "Enqueued transcription task");
                Ok(task_id)
            }
            Err(_) => {
                self.counters.lock().queue_full_rejections += 1;
                Err(Error::QueueFull)
            }
        }
    }

    /// Look a task up in the active, completed and failed maps
    ///
    /// # Errors
    ///
    /// Returns `NotFound` when no map holds the task.
    pub fn task_status(&self, task_id: Uuid) -> Result<TranscriptionTask> {
        self.active
            .get(&task_id)
            .or_else(|| self.completed.get(&task_id))
            .or_else(|| self.failed.get(&task_id))
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::NotFound {
                resource: format!("Task {task_id}"),
            })
    }

    /// One consistent snapshot of the queue counters and sizes
    #[must_use]
    pub fn stats(&self) -> QueueStats {
        let counters = self.counters.lock();
        QueueStats {
            total_enqueued: counters.total_enqueued,
            total_processed: counters.total_processed,
            total_failed: counters.total_failed,
            total_retries: counters.total_retries,
            queue_full_rejections: counters.queue_full_rejections,
            average_processing_time: counters.average_processing_time,
            queue_size: self.main_rx.len(),
            retry_queue_size: self.retry_rx.len(),
            active_tasks: self.active.len(),
            completed_tasks: self.completed.len(),
            failed_tasks: self.failed.len(),
            workers_running: self.workers.lock().len(),
            is_running: self.running.load(Ordering::SeqCst),
        }
    }

    /// Start the configured worker pool plus the retry shuffler
    pub fn start(self: &Arc<Self>, processor: Arc<dyn TaskProcessor>) {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::warn!("Task queue is already running");
            return;
        }

        tracing::info!(workers = self.config.workers, "Starting transcription workers");

        let mut handles = self.workers.lock();
        for i in 0..self.config.workers {
            let queue = Arc::clone(self);
            let processor = Arc::clone(&processor);
            let worker_id = format!("worker-{}", i + 1);
            handles.push(tokio::spawn(async move {
                queue.worker_loop(worker_id, processor).await;
            }));
        }

        let queue = Arc::clone(self);
        handles.push(tokio::spawn(async move {
            queue.retry_loop(processor).await;
        }));
    }

    /// Request shutdown and wait for workers to finish the task in hand.
    /// Tasks still queued stay in their `active` records untouched.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        tracing::info!("Stopping transcription task queue");
        self.cancel.cancel();

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!("Worker failed to shut down cleanly: {e}");
            }
        }

        tracing::info!("Transcription task queue stopped");
    }

    /// Evict completed and failed records older than `max_age`
    pub fn cleanup_old(&self, max_age: Duration) -> usize {
        let cutoff = chrono::Utc::now()
            - chrono::Duration::from_std(max_age).unwrap_or_else(|_| chrono::Duration::hours(24));

        let mut evicted = 0;
        for map in [&self.completed, &self.failed] {
            let old: Vec<Uuid> = map
                .iter()
                .filter(|entry| entry.completed_at.is_some_and(|at| at < cutoff))
                .map(|entry| entry.task_id)
                .collect();
            for task_id in old {
                map.remove(&task_id);
                evicted += 1;
            }
        }

        if evicted > 0 {
            tracing::info!(evicted, "Cleaned up old task records");
        }
        evicted
    }

    async fn worker_loop(self: Arc<Self>, worker_id: String, processor: Arc<dyn TaskProcessor>) {
        tracing::info!(worker = %worker_id, "Transcription worker started");

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                recv = tokio::time::timeout(DEQUEUE_POLL, self.main_rx.recv()) => {
                    match recv {
                        Err(_elapsed) => {}
                        Ok(Err(_closed)) => break,
                        Ok(Ok(task)) => self.process_task(task, &worker_id, &processor).await,
                    }
                }
            }
        }

        tracing::info!(worker = %worker_id, "Transcription worker stopped");
    }

    async fn process_task(
        &self,
        mut task: TranscriptionTask,
        worker_id: &str,
        processor: &Arc<dyn TaskProcessor>,
    ) {
        task.status = TaskStatus::Processing;
        task.started_at = Some(chrono::Utc::now());
        task.worker_id = Some(worker_id.to_string());
        self.active.insert(task.task_id, task.clone());

        let start = Instant::now();
        match processor.process(&task.audio_file_path, &task.call).await {
            Ok(()) => {
                task.status = TaskStatus::Completed;
                task.completed_at = Some(chrono::Utc::now());

                {
                    let mut counters = self.counters.lock();
                    counters.total_processed += 1;
                    counters.record_processing_time(start.elapsed().as_secs_f64());
                }

                self.active.remove(&task.task_id);
                tracing::info!(
                    task_id = %task.task_id,
                    worker = %worker_id,
                    elapsed_s = start.elapsed().as_secs_f64(),
                    "Task completed"
                );
                self.completed.insert(task.task_id, task);
            }
            Err(e) => {
                task.retry_count += 1;
                task.last_error = Some(e.to_string());

                if task.retry_count <= task.max_retries {
                    task.status = TaskStatus::Retrying;
                    self.counters.lock().total_retries += 1;
                    self.active.insert(task.task_id, task.clone());

                    tracing::warn!(
                        task_id = %task.task_id,
                        retry = task.retry_count,
                        max_retries = task.max_retries,
                        "Task failed, will retry: {e}"
                    );

                    // Linear backoff, capped
                    let delay = (u64::from(task.retry_count) * BACKOFF_STEP_SECS)
                        .min(BACKOFF_CAP_SECS);
                    tokio::time::sleep(Duration::from_secs(delay)).await;

                    if self.retry_tx.try_send(task.clone()).is_err() {
                        tracing::error!(task_id = %task.task_id, "Retry queue full");
                        self.mark_failed(task, processor).await;
                    }
                } else {
                    self.mark_failed(task, processor).await;
                }
            }
        }
    }

    async fn mark_failed(&self, mut task: TranscriptionTask, processor: &Arc<dyn TaskProcessor>) {
        task.status = TaskStatus::Failed;
        task.completed_at = Some(chrono::Utc::now());

        self.counters.lock().total_failed += 1;
        self.active.remove(&task.task_id);
        self.failed.insert(task.task_id, task.clone());

        tracing::error!(
            task_id = %task.task_id,
            retries = task.retry_count,
            error = task.last_error.as_deref().unwrap_or(""),
            "Task permanently failed"
        );

        processor.on_permanent_failure(&task).await;
    }

    async fn retry_loop(self: Arc<Self>, processor: Arc<dyn TaskProcessor>) {
        tracing::info!("Retry processor started");

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                recv = tokio::time::timeout(DEQUEUE_POLL, self.retry_rx.recv()) => {
                    match recv {
                        Err(_elapsed) => {}
                        Ok(Err(_closed)) => break,
                        Ok(Ok(task)) => {
                            // Blocking put back onto the main tail, bounded wait
                            match tokio::time::timeout(
                                SHUFFLE_PUT_WAIT,
                                self.main_tx.send(task.clone()),
                            )
                            .await
                            {
                                Ok(Ok(())) => {}
                                _ => {
                                    if self.retry_tx.try_send(task.clone()).is_err() {
                                        self.mark_failed(task, &processor).await;
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }

        tracing::info!("Retry processor stopped");
    }
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicUsize;

    fn small_config(queue_size: usize, workers: usize, max_retries: u32) -> QueueConfig {
        QueueConfig {
            queue_size,
            workers,
            max_retries,
            ..Default::default()
        }
    }

    fn sample_call() -> RadioCallCreate {
        RadioCallCreate::new(Utc::now(), 460_025_000, "/tmp/a.mp3".to_string())
    }

    /// Fails the first `fail_times` attempts, then succeeds
    struct FlakyProcessor {
        fail_times: usize,
        attempts: AtomicUsize,
        permanent_failures: AtomicUsize,
    }

    impl FlakyProcessor {
        fn new(fail_times: usize) -> Self {
            Self {
                fail_times,
                attempts: AtomicUsize::new(0),
                permanent_failures: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl TaskProcessor for FlakyProcessor {
        async fn process(
            &self,
            _audio_path: &Path,
            _call: &RadioCallCreate,
        ) -> std::result::Result<(), ProcessError> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.fail_times {
                Err(format!("injected failure {attempt}").into())
            } else {
                Ok(())
            }
        }

        async fn on_permanent_failure(&self, _task: &TranscriptionTask) {
            self.permanent_failures.fetch_add(1, Ordering::SeqCst);
        }
    }

    async fn wait_for_terminal(queue: &TranscriptionQueue, task_id: Uuid) -> TranscriptionTask {
        for _ in 0..10_000 {
            if let Ok(task) = queue.task_status(task_id)
                && matches!(task.status, TaskStatus::Completed | TaskStatus::Failed)
            {
                return task;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task never reached a terminal state");
    }

    #[tokio::test]
    async fn test_enqueue_and_process_success() {
        let queue = Arc::new(TranscriptionQueue::new(small_config(16, 1, 3)));
        let processor = Arc::new(FlakyProcessor::new(0));
        queue.start(Arc::clone(&processor) as Arc<dyn TaskProcessor>);

        let task_id = queue
            .try_enqueue(sample_call(), PathBuf::from("/tmp/a.mp3"))
            .unwrap();

        let task = wait_for_terminal(&queue, task_id).await;
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.retry_count, 0);
        assert!(task.started_at.is_some());
        assert!(task.completed_at.is_some());
        assert_eq!(task.worker_id.as_deref(), Some("worker-1"));

        let stats = queue.stats();
        assert_eq!(stats.total_enqueued, 1);
        assert_eq!(stats.total_processed, 1);
        assert_eq!(stats.total_failed, 0);
        assert_eq!(stats.active_tasks, 0);
        assert_eq!(stats.completed_tasks, 1);
        assert!(stats.is_running);

        queue.stop().await;
        assert!(!queue.stats().is_running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_then_success() {
        let queue = Arc::new(TranscriptionQueue::new(small_config(16, 1, 3)));
        let processor = Arc::new(FlakyProcessor::new(1));
        queue.start(Arc::clone(&processor) as Arc<dyn TaskProcessor>);

        let task_id = queue
            .try_enqueue(sample_call(), PathBuf::from("/tmp/a.mp3"))
            .unwrap();

        let task = wait_for_terminal(&queue, task_id).await;
        assert_eq!(task.status, TaskStatus::Completed);
        // A completed task never exceeds its retry budget
        assert!(task.retry_count <= task.max_retries);
        assert_eq!(task.retry_count, 1);

        let stats = queue.stats();
        assert_eq!(stats.total_retries, 1);
        assert_eq!(stats.total_processed, 1);
        assert_eq!(stats.total_failed, 0);

        queue.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhaustion_marks_failed() {
        let queue = Arc::new(TranscriptionQueue::new(small_config(16, 1, 2)));
        let processor = Arc::new(FlakyProcessor::new(usize::MAX));
        queue.start(Arc::clone(&processor) as Arc<dyn TaskProcessor>);

        let task_id = queue
            .try_enqueue(sample_call(), PathBuf::from("/tmp/a.mp3"))
            .unwrap();

        let task = wait_for_terminal(&queue, task_id).await;
        assert_eq!(task.status, TaskStatus::Failed);
        // A permanently failed task carries exactly max_retries + 1 attempts
        assert_eq!(task.retry_count, task.max_retries + 1);
        assert!(task.last_error.is_some());

        let stats = queue.stats();
        assert_eq!(stats.total_failed, 1);
        assert_eq!(stats.total_retries, 2);
        assert_eq!(stats.failed_tasks, 1);
        assert_eq!(
            processor.permanent_failures.load(Ordering::SeqCst),
            1,
            "permanent failure hook fires exactly once"
        );

        queue.stop().await;
    }

    #[tokio::test]
    async fn test_queue_full_rejection() {
        let queue = Arc::new(TranscriptionQueue::new(small_config(1, 1, 3)));
        // Workers never started: the single slot stays occupied

        queue
            .try_enqueue(sample_call(), PathBuf::from("/tmp/a.mp3"))
            .unwrap();
        let err = queue
            .try_enqueue(sample_call(), PathBuf::from("/tmp/b.mp3"))
            .unwrap_err();
        assert!(matches!(err, Error::QueueFull));

        let stats = queue.stats();
        assert_eq!(stats.total_enqueued, 1);
        assert_eq!(stats.queue_full_rejections, 1);
        assert_eq!(stats.queue_size, 1);
    }

    #[tokio::test]
    async fn test_task_status_lookup() {
        let queue = Arc::new(TranscriptionQueue::new(small_config(4, 1, 3)));

        let task_id = queue
            .try_enqueue(sample_call(), PathBuf::from("/tmp/a.mp3"))
            .unwrap();

        let task = queue.task_status(task_id).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);

        let missing = queue.task_status(Uuid::new_v4());
        assert!(matches!(missing, Err(Error::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_cleanup_old_evicts_terminal_records() {
        let queue = Arc::new(TranscriptionQueue::new(small_config(16, 1, 3)));
        let processor = Arc::new(FlakyProcessor::new(0));
        queue.start(Arc::clone(&processor) as Arc<dyn TaskProcessor>);

        let task_id = queue
            .try_enqueue(sample_call(), PathBuf::from("/tmp/a.mp3"))
            .unwrap();
        wait_for_terminal(&queue, task_id).await;
        queue.stop().await;

        // Everything is younger than a day
        assert_eq!(queue.cleanup_old(Duration::from_secs(24 * 3600)), 0);
        assert_eq!(queue.stats().completed_tasks, 1);

        // A zero horizon evicts every terminal record
        assert_eq!(queue.cleanup_old(Duration::ZERO), 1);
        assert_eq!(queue.stats().completed_tasks, 0);
        assert!(queue.task_status(task_id).is_err());
    }

    #[tokio::test]
    async fn test_stop_finishes_task_in_hand() {
        struct SlowProcessor;

        #[async_trait::async_trait]
        impl TaskProcessor for SlowProcessor {
            async fn process(
                &self,
                _audio_path: &Path,
                _call: &RadioCallCreate,
            ) -> std::result::Result<(), ProcessError> {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok(())
            }
        }

        let queue = Arc::new(TranscriptionQueue::new(small_config(16, 1, 3)));
        queue.start(Arc::new(SlowProcessor));

        let task_id = queue
            .try_enqueue(sample_call(), PathBuf::from("/tmp/a.mp3"))
            .unwrap();

        // Give the worker time to pick the task up, then stop
        tokio::time::sleep(Duration::from_millis(30)).await;
        queue.stop().await;

        let task = queue.task_status(task_id).unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
    }

    #[tokio::test]
    async fn test_stop_leaves_queued_tasks_active() {
        let queue = Arc::new(TranscriptionQueue::new(small_config(16, 1, 3)));

        // Not started; enqueued tasks stay pending in the active map
        let task_id = queue
            .try_enqueue(sample_call(), PathBuf::from("/tmp/a.mp3"))
            .unwrap();
        queue.stop().await;

        let task = queue.task_status(task_id).unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_double_start_is_harmless() {
        let queue = Arc::new(TranscriptionQueue::new(small_config(4, 2, 3)));
        let processor: Arc<dyn TaskProcessor> = Arc::new(FlakyProcessor::new(0));

        queue.start(Arc::clone(&processor));
        let workers_after_first = queue.stats().workers_running;
        queue.start(processor);

        // workers + retry shuffler, unchanged by the second start
        assert_eq!(workers_after_first, 3);
        assert_eq!(queue.stats().workers_running, 3);

        queue.stop().await;
    }

    #[tokio::test]
    async fn test_ema_seeds_with_first_sample() {
        let mut counters = Counters::default();
        counters.record_processing_time(2.0);
        assert!((counters.average_processing_time - 2.0).abs() < f64::EPSILON);

        counters.record_processing_time(4.0);
        // 2.0 * 0.9 + 4.0 * 0.1
        assert!((counters.average_processing_time - 2.2).abs() < 1e-9);
    }
}
