use super::errors::Result;
use crate::models::{Resolution, TranscodingJob};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Message describing one queued job. Also the JSON payload mirrored to the
/// broker queue for external observability.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobMessage {
    pub job_id: Uuid,
    pub video_id: Uuid,
    pub resolution: Resolution,
}

/// Heap entry: lower priority number first, FIFO within a priority.
#[derive(Debug)]
struct QueuedJob {
    message: JobMessage,
    priority: u8,
    seq: u64,
}

impl PartialEq for QueuedJob {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for QueuedJob {}

impl Ord for QueuedJob {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; invert so the smallest (priority, seq)
        // pops first.
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueuedJob {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// JobQueue admits transcoding jobs and hands them to the dispatcher in
/// priority order: low resolution first, FIFO within a resolution.
///
/// Execution is always in-process. When a broker is attached, each admission
/// is additionally mirrored onto a Redis list so external tooling can watch
/// the queue; mirror failures are logged and swallowed.
pub struct JobQueue {
    heap: Mutex<BinaryHeap<QueuedJob>>,
    notify: Notify,
    seq: AtomicU64,
    broker: Option<ConnectionManager>,
    queue_name: String,
}

impl JobQueue {
    pub fn new(queue_name: String) -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            notify: Notify::new(),
            seq: AtomicU64::new(0),
            broker: None,
            queue_name,
        }
    }

    pub fn with_broker(mut self, broker: Option<ConnectionManager>) -> Self {
        self.broker = broker;
        self
    }

    /// Admits one job.
    pub fn submit(&self, job: &TranscodingJob) {
        let message = JobMessage {
            job_id: job.id,
            video_id: job.video_id,
            resolution: job.resolution,
        };

        let entry = QueuedJob {
            message: message.clone(),
            priority: job.resolution.priority(),
            seq: self.seq.fetch_add(1, AtomicOrdering::Relaxed),
        };
        self.heap.lock().expect("queue lock poisoned").push(entry);
        self.notify.notify_one();

        info!(
            job_id = %message.job_id,
            video_id = %message.video_id,
            resolution = %message.resolution,
            "Enqueued transcoding job"
        );

        if let Some(manager) = &self.broker {
            let mut connection = manager.clone();
            let queue_name = self.queue_name.clone();
            tokio::spawn(async move {
                if let Err(e) = mirror_to_broker(&mut connection, &queue_name, &message).await {
                    warn!(error = %e, "Queue mirror to broker failed");
                }
            });
        }
    }

    /// Next job in priority order, waiting if the queue is empty.
    pub async fn next(&self) -> JobMessage {
        loop {
            if let Some(entry) = self.heap.lock().expect("queue lock poisoned").pop() {
                debug!(job_id = %entry.message.job_id, "Dequeued transcoding job");
                return entry.message;
            }
            self.notify.notified().await;
        }
    }

    /// Jobs currently waiting for dispatch.
    pub fn len(&self) -> usize {
        self.heap.lock().expect("queue lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

async fn mirror_to_broker(
    connection: &mut ConnectionManager,
    queue_name: &str,
    message: &JobMessage,
) -> Result<()> {
    let payload = serde_json::to_string(message)?;
    connection
        .rpush::<_, _, ()>(queue_name, payload)
        .await?;
    Ok(())
}

/// Sliding-window limiter on job starts: at most `max_starts` within
/// `window`. `acquire` waits until a start slot is available.
pub struct StartRateLimiter {
    starts: tokio::sync::Mutex<VecDeque<Instant>>,
    max_starts: usize,
    window: Duration,
}

impl StartRateLimiter {
    pub fn new(max_starts: usize, window: Duration) -> Self {
        Self {
            starts: tokio::sync::Mutex::new(VecDeque::new()),
            max_starts,
            window,
        }
    }

    pub async fn acquire(&self) {
        loop {
            let wait_until = {
                let mut starts = self.starts.lock().await;
                let now = Instant::now();
                while let Some(&oldest) = starts.front() {
                    if now.duration_since(oldest) >= self.window {
                        starts.pop_front();
                    } else {
                        break;
                    }
                }
                if starts.len() < self.max_starts {
                    starts.push_back(now);
                    return;
                }
                *starts.front().expect("non-empty window") + self.window
            };
            tokio::time::sleep_until(wait_until).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn job(resolution: Resolution) -> TranscodingJob {
        TranscodingJob::new(Uuid::new_v4(), resolution, PathBuf::from("/tmp/in.mp4"))
    }

    #[tokio::test]
    async fn test_priority_order_low_first() {
        let queue = JobQueue::new("transcoding-jobs".to_string());
        queue.submit(&job(Resolution::High));
        queue.submit(&job(Resolution::Low));
        queue.submit(&job(Resolution::Medium));

        assert_eq!(queue.next().await.resolution, Resolution::Low);
        assert_eq!(queue.next().await.resolution, Resolution::Medium);
        assert_eq!(queue.next().await.resolution, Resolution::High);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_fifo_within_priority() {
        let queue = JobQueue::new("transcoding-jobs".to_string());
        let first = job(Resolution::Low);
        let second = job(Resolution::Low);
        queue.submit(&first);
        queue.submit(&second);

        assert_eq!(queue.next().await.job_id, first.id);
        assert_eq!(queue.next().await.job_id, second.id);
    }

    #[tokio::test]
    async fn test_next_waits_for_submission() {
        let queue = std::sync::Arc::new(JobQueue::new("transcoding-jobs".to_string()));
        let waiter = queue.clone();
        let handle = tokio::spawn(async move { waiter.next().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        queue.submit(&job(Resolution::Medium));
        let message = handle.await.unwrap();
        assert_eq!(message.resolution, Resolution::Medium);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limiter_blocks_fourth_start() {
        let limiter = StartRateLimiter::new(3, Duration::from_secs(60));
        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;

        let before = Instant::now();
        limiter.acquire().await;
        // Paused time auto-advances: the fourth start had to wait out the
        // window.
        assert!(Instant::now().duration_since(before) >= Duration::from_secs(59));
    }

    #[test]
    fn test_job_message_serialization() {
        let message = JobMessage {
            job_id: Uuid::new_v4(),
            video_id: Uuid::new_v4(),
            resolution: Resolution::High,
        };
        let json = serde_json::to_string(&message).unwrap();
        let back: JobMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back.job_id, message.job_id);
        assert_eq!(back.resolution, Resolution::High);
    }
}
