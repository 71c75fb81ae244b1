//! The segment-pipeline worker: one spawned per [`super::Task`], owning
//! exclusive write access to its [`super::TaskState`] (spec §4.3/§4.4/§5).
//!
//! Grounded on the teacher's `player::manager::start::start_playback` /
//! `PlayerContext` loop — a single spawned task driving a state machine to
//! completion while polling an `Arc<AtomicBool>` stop signal — generalized
//! from one boolean to a full `Command` channel (start/pause/cancel/
//! force-save/retry-segment) since this pipeline has more than one way to
//! stop early.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, SystemTime};

use tokio::io::AsyncWriteExt;

use super::{Command, SegmentStatus, Task, TaskStatus};
use crate::error::EngineError;
use crate::playlist::KeyMethod;

/// Drives one task from `preparing` through to a terminal status. Returns
/// once the task is `completed`, `error`, `stopped`, or `forced` — never
/// panics on a task-local failure, only on a poisoned lock (which would mean
/// another worker already panicked holding it).
pub(super) async fn run(task: Arc<Task>, _download_dir: std::path::PathBuf) {
    if let Err(err) = prepare(&task).await {
        finalize_error(&task, err).await;
        return;
    }
    {
        let mut st = task.state.lock();
        st.status = TaskStatus::Downloading;
        st.started_at = Some(SystemTime::now());
    }

    let rx = task.commands();
    let mut paused = false;

    loop {
        while let Ok(cmd) = rx.try_recv() {
            match cmd {
                Command::Cancel => {
                    finalize_stopped(&task).await;
                    return;
                }
                Command::ForceSave => {
                    finalize_forced(&task).await;
                    return;
                }
                Command::Pause => {
                    paused = true;
                    task.state.lock().status = TaskStatus::Paused;
                }
                Command::Start => {
                    paused = false;
                    let mut st = task.state.lock();
                    if st.status == TaskStatus::Paused {
                        st.status = TaskStatus::Downloading;
                    }
                }
                Command::RetrySegment(index) => apply_retry_segment(&task, index).await,
            }
        }

        if paused {
            match rx.recv_async().await {
                Ok(Command::Cancel) | Err(_) => {
                    finalize_stopped(&task).await;
                    return;
                }
                Ok(Command::ForceSave) => {
                    finalize_forced(&task).await;
                    return;
                }
                Ok(Command::Start) => {
                    paused = false;
                    task.state.lock().status = TaskStatus::Downloading;
                }
                Ok(Command::Pause) => {}
                Ok(Command::RetrySegment(index)) => apply_retry_segment(&task, index).await,
            }
            continue;
        }

        let (cursor, total) = {
            let st = task.state.lock();
            (st.cursor, st.segments.len())
        };
        if cursor >= total {
            finalize_completed(&task).await;
            return;
        }

        match process_segment(&task, cursor).await {
            Ok(SegmentOutcome::Committed) | Ok(SegmentOutcome::RetryNow) => {}
            Ok(SegmentOutcome::Cancelled) => {
                finalize_stopped(&task).await;
                return;
            }
            Err(err) => {
                finalize_error(&task, err).await;
                return;
            }
        }
    }
}

/// Fetches and parses the playlist, safety-filtering both the submitted URL
/// and the effective URL reqwest followed redirects to (spec §4.1: "Invoked
/// at: initial URL submission, the resolved variant URL").
async fn prepare(task: &Arc<Task>) -> Result<(), EngineError> {
    let original_url = task.options.url.clone();
    if !task.safety.is_safe(&original_url).await {
        return Err(EngineError::UnsafeUrl(original_url));
    }

    let resp = task
        .client
        .get(&task.options.url)
        .headers(crate::http::merged_headers(&task.options.headers))
        .send()
        .await
        .map_err(network_error)?;
    if resp.status().as_u16() >= 400 {
        return Err(EngineError::Network {
            status: Some(resp.status().as_u16()),
            cause: resp.status().to_string(),
        });
    }

    let effective_url = resp.url().to_string();
    if effective_url != task.options.url && !task.safety.is_safe(&effective_url).await {
        return Err(EngineError::UnsafeUrl(effective_url));
    }

    let text = resp.text().await.map_err(network_error)?;
    let playlist = crate::playlist::parse(&text, &effective_url)?;
    let segments = select_range(&playlist, &task.options)?;

    let mut st = task.state.lock();
    st.media_sequence = playlist.media_sequence;
    if !task.options.stream_to_disk {
        st.buffered = vec![Vec::new(); segments.len()];
    }
    st.segments = segments;
    Ok(())
}

fn select_range(
    playlist: &crate::playlist::MediaPlaylist,
    opts: &super::TaskOptions,
) -> Result<Vec<super::SegmentRecord>, EngineError> {
    let total = playlist.segments.len();
    let start_idx = opts.start_segment.map(|s| s - 1).unwrap_or(0);
    if start_idx >= total {
        return Err(EngineError::Validation(format!(
            "start_segment beyond playlist length ({total})"
        )));
    }
    let end_idx = opts
        .end_segment
        .map(|e| e.saturating_sub(1))
        .unwrap_or(total - 1)
        .min(total - 1);

    let mut out = Vec::new();
    for (dense_index, seg) in playlist.segments[start_idx..=end_idx].iter().enumerate() {
        let mut record =
            super::SegmentRecord::new(dense_index, seg.position, seg.url.clone(), seg.duration);
        if let Some(key) = &seg.key {
            record.method = Some(key.method);
            record.key_uri = key.uri.clone();
            if let Some(iv_hex) = &key.iv_hex {
                record.iv = Some(
                    crate::playlist::util::parse_iv_hex(iv_hex)
                        .map_err(EngineError::UnsupportedEncryption)?,
                );
            }
        }
        out.push(record);
    }
    Ok(out)
}

enum SegmentOutcome {
    Committed,
    RetryNow,
    Cancelled,
}

/// One attempt at the segment at `cursor`. On a recoverable failure this
/// increments its retry count and, unless exhausted, sleeps for a second
/// (interruptibly) before returning `RetryNow` so the caller loops back
/// around rather than recursing.
async fn process_segment(task: &Arc<Task>, cursor: usize) -> Result<SegmentOutcome, EngineError> {
    let (url, key_uri, iv, method, playlist_position) = {
        let mut st = task.state.lock();
        let seg = &mut st.segments[cursor];
        seg.status = SegmentStatus::Downloading;
        (
            seg.url.clone(),
            seg.key_uri.clone(),
            seg.iv,
            seg.method,
            seg.playlist_position,
        )
    };

    match fetch_and_decrypt(task, &url, key_uri.as_deref(), iv, method, playlist_position).await {
        Ok(bytes) => {
            commit_segment(task, cursor, bytes).await?;
            Ok(SegmentOutcome::Committed)
        }
        Err(err) if err.is_recoverable() => {
            let exceeded = {
                let mut st = task.state.lock();
                let seg = &mut st.segments[cursor];
                seg.retries += 1;
                seg.status = SegmentStatus::Failed;
                seg.error = Some(err.to_string());
                seg.retries > task.options.max_retries
            };
            if exceeded {
                return Err(err);
            }
            if wait_unless_cancelled(task, Duration::from_secs(1)).await {
                Ok(SegmentOutcome::Cancelled)
            } else {
                Ok(SegmentOutcome::RetryNow)
            }
        }
        Err(err) => Err(err),
    }
}

async fn fetch_and_decrypt(
    task: &Arc<Task>,
    url: &str,
    key_uri: Option<&str>,
    iv_override: Option<[u8; 16]>,
    method: Option<KeyMethod>,
    playlist_position: usize,
) -> Result<Vec<u8>, EngineError> {
    if !task.safety.is_safe(url).await {
        return Err(EngineError::UnsafeUrl(url.to_string()));
    }

    let resp = task
        .client
        .get(url)
        .headers(crate::http::merged_headers(&task.options.headers))
        .send()
        .await
        .map_err(network_error)?;
    if resp.status().as_u16() >= 400 {
        return Err(EngineError::Network {
            status: Some(resp.status().as_u16()),
            cause: resp.status().to_string(),
        });
    }
    let bytes = resp.bytes().await.map_err(network_error)?.to_vec();

    let method = method.unwrap_or(KeyMethod::None);
    // Checked before the `decrypt` short-circuit: spec §4.2 says unconditionally
    // that any method other than NONE/AES-128 is an error at download time,
    // with no carve-out for `decrypt == false` passing ciphertext through.
    if matches!(method, KeyMethod::Other) {
        return Err(EngineError::UnsupportedEncryption(
            "segment key METHOD is neither NONE nor AES-128".to_string(),
        ));
    }
    if !task.options.decrypt || matches!(method, KeyMethod::None) {
        return Ok(bytes);
    }

    let key_uri = key_uri.ok_or_else(|| {
        EngineError::UnsupportedEncryption("AES-128 segment carries no key URI".to_string())
    })?;
    let key = resolve_key(task, key_uri).await?;
    let media_sequence = task.state.lock().media_sequence;
    let iv = iv_override.unwrap_or_else(|| crate::crypto::implicit_iv(media_sequence, playlist_position as u64));

    crate::crypto::decrypt_segment(&bytes, &key, &iv)
}

async fn resolve_key(task: &Arc<Task>, key_uri: &str) -> Result<[u8; 16], EngineError> {
    if let Some(key) = task.state.lock().key_cache.get(key_uri).copied() {
        return Ok(key);
    }
    if !task.safety.is_safe(key_uri).await {
        return Err(EngineError::UnsafeUrl(key_uri.to_string()));
    }
    let resp = task
        .client
        .get(key_uri)
        .headers(crate::http::merged_headers(&task.options.headers))
        .send()
        .await
        .map_err(network_error)?;
    if resp.status().as_u16() >= 400 {
        return Err(EngineError::Network {
            status: Some(resp.status().as_u16()),
            cause: resp.status().to_string(),
        });
    }
    let bytes = resp.bytes().await.map_err(network_error)?;
    let key: [u8; 16] = bytes
        .as_ref()
        .try_into()
        .map_err(|_| EngineError::Decryption(format!("key length {} != 16", bytes.len())))?;
    task.state.lock().key_cache.insert(key_uri.to_string(), key);
    Ok(key)
}

fn network_error(e: reqwest::Error) -> EngineError {
    EngineError::Network {
        status: e.status().map(|s| s.as_u16()),
        cause: e.to_string(),
    }
}

/// Commits a decoded segment: appends to the on-disk temp file immediately
/// when `stream_to_disk`, otherwise buffers it (still updating size/stats —
/// spec §9 open question), then advances the cursor and stats.
async fn commit_segment(task: &Arc<Task>, cursor: usize, bytes: Vec<u8>) -> Result<(), EngineError> {
    let len = bytes.len() as u64;

    if task.options.stream_to_disk {
        let temp_path = task.state.lock().temp_path.clone();
        append_and_fsync(&temp_path, &bytes).await?;
    }

    let mut st = task.state.lock();
    if !task.options.stream_to_disk {
        st.buffered[cursor] = bytes;
    }
    st.segments[cursor].size = len;
    st.segments[cursor].status = SegmentStatus::Completed;
    st.segments[cursor].error = None;
    st.total_bytes += len;
    st.cursor = cursor + 1;
    let remaining = (st.segments.len() - st.cursor) as u64;
    st.stats.record_segment_complete(len, remaining);
    Ok(())
}

async fn append_and_fsync(path: &std::path::Path, bytes: &[u8]) -> Result<(), EngineError> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    file.sync_all().await?;
    Ok(())
}

/// Rewinds the task to re-download `index`. Segments from `index` up to (but
/// excluding) the current cursor are reset to `pending`; any bytes already
/// appended to the temp file past that point are truncated away.
async fn apply_retry_segment(task: &Arc<Task>, index: usize) {
    let truncate_offset = {
        let mut st = task.state.lock();
        if index >= st.segments.len() {
            return;
        }
        if index >= st.cursor {
            st.segments[index].status = SegmentStatus::Pending;
            st.segments[index].retries = 0;
            st.segments[index].error = None;
            return;
        }

        let offset: u64 = st.segments[..index].iter().map(|s| s.size).sum();
        for seg in st.segments[index..st.cursor].iter_mut() {
            seg.status = SegmentStatus::Pending;
            seg.size = 0;
            seg.retries = 0;
            seg.error = None;
        }
        st.total_bytes = offset;
        st.cursor = index;
        if !task.options.stream_to_disk {
            st.buffered.truncate(index);
            st.buffered.resize(st.segments.len(), Vec::new());
        }
        offset
    };

    let temp_path = task.state.lock().temp_path.clone();
    if task.options.stream_to_disk {
        if let Ok(file) = tokio::fs::OpenOptions::new().write(true).open(&temp_path).await {
            let _ = file.set_len(truncate_offset).await;
        }
    }
}

/// Polls `task.cancelled` for up to `dur`, in 100ms slices, returning `true`
/// the instant it is observed set.
async fn wait_unless_cancelled(task: &Arc<Task>, dur: Duration) -> bool {
    let step = Duration::from_millis(100);
    let mut waited = Duration::ZERO;
    while waited < dur {
        if task.cancelled.load(Ordering::Relaxed) {
            return true;
        }
        let this_step = step.min(dur - waited);
        tokio::time::sleep(this_step).await;
        waited += this_step;
    }
    task.cancelled.load(Ordering::Relaxed)
}

/// Writes out any segments accumulated in memory (`stream_to_disk == false`)
/// through the same append-and-fsync path used for the streaming case.
async fn flush_buffered(task: &Arc<Task>) -> Result<(), EngineError> {
    if task.options.stream_to_disk {
        return Ok(());
    }
    let (temp_path, chunks) = {
        let st = task.state.lock();
        (st.temp_path.clone(), st.buffered[..st.cursor].to_vec())
    };
    for chunk in chunks {
        append_and_fsync(&temp_path, &chunk).await?;
    }
    Ok(())
}

async fn finalize_completed(task: &Arc<Task>) {
    if let Err(err) = flush_buffered(task).await {
        finalize_error(task, err).await;
        return;
    }

    let (temp_path, ts_path) = {
        let st = task.state.lock();
        (st.temp_path.clone(), st.ts_path.clone())
    };
    if let Err(e) = tokio::fs::rename(&temp_path, &ts_path).await {
        finalize_error(task, EngineError::Io(e.to_string())).await;
        return;
    }

    {
        let mut st = task.state.lock();
        st.output_path = Some(ts_path.clone());
        st.status = TaskStatus::Completed;
        st.completed_at = Some(SystemTime::now());
        st.message = "下载完成".to_string();
    }

    if task.options.output_format == super::OutputFormat::Mp4 {
        crate::remux::remux(task, &ts_path).await;
    }
}

async fn finalize_forced(task: &Arc<Task>) {
    if let Err(err) = flush_buffered(task).await {
        tracing::warn!(task_id = %task.id, error = %err, "failed to flush buffered segments before force-save");
    }

    let (temp_path, partial_path) = {
        let st = task.state.lock();
        let partial_path = st
            .temp_path
            .with_file_name(format!("{}.partial.ts", task.options.title));
        (st.temp_path.clone(), partial_path)
    };
    let _ = tokio::fs::rename(&temp_path, &partial_path).await;

    let mut st = task.state.lock();
    st.output_path = Some(partial_path);
    st.status = TaskStatus::Forced;
    st.completed_at = Some(SystemTime::now());
    st.message = "已保存部分下载内容".to_string();
}

async fn finalize_stopped(task: &Arc<Task>) {
    let temp_path = task.state.lock().temp_path.clone();
    let _ = tokio::fs::remove_file(&temp_path).await;

    let mut st = task.state.lock();
    st.status = TaskStatus::Stopped;
    st.completed_at = Some(SystemTime::now());
    st.message = "已取消".to_string();
}

async fn finalize_error(task: &Arc<Task>, err: EngineError) {
    let temp_path = task.state.lock().temp_path.clone();
    let _ = tokio::fs::remove_file(&temp_path).await;

    let mut st = task.state.lock();
    st.status = TaskStatus::Error;
    st.completed_at = Some(SystemTime::now());
    st.message = err.to_string();
}
