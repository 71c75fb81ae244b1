use serde::Serialize;

use crate::playlist::KeyMethod;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentStatus {
    Pending,
    Downloading,
    Completed,
    Failed,
}

/// One in-range segment, in playlist order (spec §3).
#[derive(Debug, Clone, Serialize)]
pub struct SegmentRecord {
    /// Dense 0-based index within the in-range segment list.
    pub index: usize,
    /// The segment's original 0-based position in the full playlist,
    /// before `start_segment`/`end_segment` filtering — IV derivation
    /// depends on this, not on `index`.
    #[serde(skip)]
    pub playlist_position: usize,
    pub url: String,
    pub duration: f64,
    #[serde(skip)]
    pub key_uri: Option<String>,
    #[serde(skip)]
    pub iv: Option<[u8; 16]>,
    #[serde(skip)]
    pub method: Option<KeyMethod>,
    pub status: SegmentStatus,
    pub size: u64,
    pub retries: u32,
    pub error: Option<String>,
}

impl SegmentRecord {
    pub fn new(index: usize, playlist_position: usize, url: String, duration: f64) -> Self {
        Self {
            index,
            playlist_position,
            url,
            duration,
            key_uri: None,
            iv: None,
            method: None,
            status: SegmentStatus::Pending,
            size: 0,
            retries: 0,
            error: None,
        }
    }
}
