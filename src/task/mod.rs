pub mod commands;
pub mod options;
pub mod record;
pub mod snapshot;
pub mod state;
pub mod stats;
mod worker;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;
use tokio::task::JoinHandle;

pub use commands::Command;
pub use options::{OutputFormat, TaskOptions, TaskOptionsInput};
pub use record::{SegmentRecord, SegmentStatus};
pub use snapshot::TaskSnapshot;
pub use state::TaskStatus;
pub use stats::Stats;

use crate::error::EngineError;
use crate::safety::UrlSafety;

/// The mutable portion of a task (spec §3). Guarded by [`Task::state`];
/// mutated only by the task's own worker, read by [`Task::snapshot`] under
/// the same lock (spec §5: "Segment records are read by the snapshot
/// serialiser under the task lock; they are mutated only by the task's
/// worker").
pub(crate) struct TaskState {
    pub status: TaskStatus,
    pub message: String,
    pub ffmpeg_missing: bool,
    pub segments: Vec<SegmentRecord>,
    pub cursor: usize,
    pub media_sequence: u64,
    pub key_cache: HashMap<String, [u8; 16]>,
    pub temp_path: PathBuf,
    pub ts_path: PathBuf,
    pub output_path: Option<PathBuf>,
    pub created_at: SystemTime,
    pub started_at: Option<SystemTime>,
    pub completed_at: Option<SystemTime>,
    pub total_bytes: u64,
    pub stats: Stats,
    /// In-memory buffer used when `stream_to_disk == false` (spec §9 open
    /// question: statistics still update per segment even though the bytes
    /// are only flushed to disk at the very end).
    pub buffered: Vec<Vec<u8>>,
}

/// One download task, owned by the [`crate::manager::TaskManager`] registry.
pub struct Task {
    pub id: String,
    pub options: TaskOptions,
    pub(crate) state: Arc<Mutex<TaskState>>,
    cmd_tx: flume::Sender<Command>,
    cmd_rx: flume::Receiver<Command>,
    worker: Mutex<Option<JoinHandle<()>>>,
    pub(crate) safety: Arc<dyn UrlSafety>,
    pub(crate) client: reqwest::Client,
    /// Mirrors a pending `Cancel` so the worker can notice it mid-sleep
    /// during a retry backoff without consuming the command from the
    /// channel (spec §5: cancellation is checked "between retry attempts").
    pub(crate) cancelled: AtomicBool,
}

impl Task {
    pub fn new(
        id: String,
        options: TaskOptions,
        download_dir: &std::path::Path,
        safety: Arc<dyn UrlSafety>,
        client: reqwest::Client,
    ) -> Self {
        let (cmd_tx, cmd_rx) = flume::unbounded();
        let temp_path = download_dir.join(format!("{id}.download"));
        let ts_path = download_dir.join(format!("{}.ts", options.title));

        let state = TaskState {
            status: TaskStatus::Ready,
            message: String::new(),
            ffmpeg_missing: false,
            segments: Vec::new(),
            cursor: 0,
            media_sequence: 0,
            key_cache: HashMap::new(),
            temp_path,
            ts_path,
            output_path: None,
            created_at: SystemTime::now(),
            started_at: None,
            completed_at: None,
            total_bytes: 0,
            stats: Stats::new(),
            buffered: Vec::new(),
        };

        Self {
            id,
            options,
            state: Arc::new(Mutex::new(state)),
            cmd_tx,
            cmd_rx,
            worker: Mutex::new(None),
            safety,
            client,
            cancelled: AtomicBool::new(false),
        }
    }

    /// `start`: spawns the worker if the task is `ready`; resumes if
    /// `paused`; a no-op on a live or terminal task (spec §4.4). Takes an
    /// owned `Arc<Task>` (rather than `&self`) since the spawned worker
    /// needs its own strong reference to outlive this call.
    pub fn start(self: Arc<Self>, download_dir: PathBuf) {
        let mut worker = self.worker.lock();
        let status = self.state.lock().status;

        if status == TaskStatus::Paused {
            let _ = self.cmd_tx.send(Command::Start);
            return;
        }
        if status != TaskStatus::Ready || worker.is_some() {
            return; // live or terminal: idempotent no-op
        }

        self.state.lock().status = TaskStatus::Preparing;
        let task = Arc::clone(&self);
        *worker = Some(tokio::spawn(async move {
            worker::run(task, download_dir).await;
        }));
    }

    pub fn pause(&self) {
        let _ = self.cmd_tx.send(Command::Pause);
    }

    pub fn resume(&self) {
        let _ = self.cmd_tx.send(Command::Start);
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
        let _ = self.cmd_tx.send(Command::Cancel);
    }

    pub fn force_save(&self) {
        let _ = self.cmd_tx.send(Command::ForceSave);
    }

    /// Returns `Err(OutOfRange)` if `index` is not a valid segment index in
    /// the *current* (post-range-filter) segment list.
    pub fn retry_segment(&self, index: usize) -> Result<(), EngineError> {
        let len = self.state.lock().segments.len();
        if index >= len {
            return Err(EngineError::Validation(format!(
                "segment index {index} out of range (0..{len})"
            )));
        }
        let _ = self.cmd_tx.send(Command::RetrySegment(index));
        Ok(())
    }

    pub(crate) fn commands(&self) -> flume::Receiver<Command> {
        self.cmd_rx.clone()
    }

    /// Joins the worker with a short timeout; used by the manager on
    /// delete. A task with no live worker returns immediately.
    pub async fn join_worker(&self, timeout: Duration) {
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            let _ = tokio::time::timeout(timeout, handle).await;
        }
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        let st = self.state.lock();
        let total_segments = st.segments.len();
        let downloaded_segments = st
            .segments
            .iter()
            .filter(|s| s.status == SegmentStatus::Completed)
            .count();
        let progress = if total_segments > 0 {
            downloaded_segments as f64 / total_segments as f64
        } else {
            0.0
        };

        TaskSnapshot {
            id: self.id.clone(),
            title: self.options.title.clone(),
            output_format: self.options.output_format,
            start_segment: self.options.start_segment,
            end_segment: self.options.end_segment,
            stream_to_disk: self.options.stream_to_disk,
            decrypt: self.options.decrypt,
            status: st.status,
            message: st.message.clone(),
            created_at: to_millis(st.created_at),
            started_at: st.started_at.map(to_millis),
            completed_at: st.completed_at.map(to_millis),
            segments: st.segments.clone(),
            total_segments,
            downloaded_segments,
            progress,
            total_bytes: st.total_bytes,
            speed_bps: st.stats.speed_bps(),
            eta_seconds: st.stats.eta_seconds(),
            output_path: st
                .output_path
                .as_ref()
                .map(|p| p.to_string_lossy().to_string()),
            ffmpeg_missing: st.ffmpeg_missing,
        }
    }
}

fn to_millis(t: SystemTime) -> u64 {
    t.duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
