use serde::Serialize;

use super::options::OutputFormat;
use super::record::SegmentRecord;
use super::state::TaskStatus;

/// Read-only projection of a [`super::Task`]'s fields (spec §6 "Task
/// snapshot").
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSnapshot {
    pub id: String,
    pub title: String,
    pub output_format: OutputFormat,
    pub start_segment: Option<usize>,
    pub end_segment: Option<usize>,
    pub stream_to_disk: bool,
    pub decrypt: bool,
    pub status: TaskStatus,
    pub message: String,
    pub created_at: u64,
    pub started_at: Option<u64>,
    pub completed_at: Option<u64>,
    pub segments: Vec<SegmentRecord>,
    pub total_segments: usize,
    pub downloaded_segments: usize,
    pub progress: f64,
    pub total_bytes: u64,
    pub speed_bps: Option<f64>,
    pub eta_seconds: Option<f64>,
    pub output_path: Option<String>,
    pub ffmpeg_missing: bool,
}
