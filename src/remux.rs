//! Optional `ffmpeg -c copy` remux from `.ts` to `.mp4` (spec §4.7).
//!
//! Grounded on the pack's `concatenate_segments` ffmpeg adapter (other
//! example `bert42-fansly-downloader-rs`): shell out via
//! `tokio::process::Command`, treat a `NotFound` spawn error as "ffmpeg isn't
//! installed" rather than a hard failure, and pass `-y -c copy` to remux
//! without re-encoding. A non-zero exit is fatal (spec §4.7 step 3 / §7): it
//! flips an already-`completed` task to `error`, unlike the missing-binary
//! case.

use std::path::Path;
use std::process::Stdio;

use tokio::io::AsyncReadExt;
use tokio::process::Command;

use crate::error::EngineError;
use crate::task::{Task, TaskStatus};

/// Remuxes `ts_path` into a sibling `.mp4`, replacing `ts_path` on success.
/// A missing `ffmpeg` binary sets `TaskState::ffmpeg_missing` and leaves the
/// `.ts` output in place rather than failing the task (spec §4.7 step 1 is
/// non-fatal). A non-zero exit, by contrast, is fatal per spec §4.7 step 3 /
/// §7 and flips the task to `error`.
pub(crate) async fn remux(task: &Task, ts_path: &Path) {
    let mp4_path = ts_path.with_extension("mp4");

    let mut child = match Command::new("ffmpeg")
        .args(["-y", "-i"])
        .arg(ts_path)
        .args(["-c", "copy"])
        .arg(&mp4_path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
    {
        Ok(child) => child,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            task.state.lock().ffmpeg_missing = true;
            return;
        }
        Err(e) => {
            record_remux_failure(task, EngineError::Remuxer(e.to_string()));
            return;
        }
    };

    // Drain stderr to EOF *before* `wait()`: ffmpeg can write more than fits
    // in the pipe buffer, and if we only read once it can block writing while
    // we block waiting, deadlocking the worker. Only the first 200 bytes are
    // kept (spec §4.7 step 3).
    let mut stderr_tail = Vec::new();
    if let Some(mut stderr) = child.stderr.take() {
        let mut buf = [0u8; 4096];
        loop {
            match stderr.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    if stderr_tail.len() < 200 {
                        let remaining = 200 - stderr_tail.len();
                        stderr_tail.extend_from_slice(&buf[..n.min(remaining)]);
                    }
                }
                Err(_) => break,
            }
        }
    }

    match child.wait().await {
        Ok(status) if status.success() => {
            let _ = tokio::fs::remove_file(ts_path).await;
            let mut st = task.state.lock();
            st.output_path = Some(mp4_path);
        }
        Ok(status) => {
            record_remux_failure(
                task,
                EngineError::Remuxer(format!(
                    "ffmpeg exited with {status}: {}",
                    String::from_utf8_lossy(&stderr_tail)
                )),
            );
        }
        Err(e) => record_remux_failure(task, EngineError::Remuxer(e.to_string())),
    }
}

/// A non-zero exit or remuxer I/O failure is fatal (spec §4.7/§7): the task
/// flips to `error`, and `output_path` is cleared to keep the "`output_path`
/// exists iff `completed` or `forced`" invariant (spec §3) intact now that
/// status is neither.
fn record_remux_failure(task: &Task, err: EngineError) {
    let mut st = task.state.lock();
    st.status = TaskStatus::Error;
    st.message = format!("转封装失败: {err}");
    st.output_path = None;
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::PermissionsExt;
    use std::sync::Arc;

    use super::*;
    use crate::safety::AllowAllSafety;
    use crate::task::{TaskOptions, TaskOptionsInput};

    /// Writes an executable shell script at `dir/ffmpeg` and returns `dir` so
    /// it can be prepended onto `PATH`, standing in for the real binary.
    fn write_fake_ffmpeg(dir: &std::path::Path, script: &str) {
        let path = dir.join("ffmpeg");
        std::fs::write(&path, script).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
    }

    fn completed_task_with_ts(dir: &std::path::Path) -> (Task, std::path::PathBuf) {
        let input = TaskOptionsInput {
            url: "https://host/a.m3u8".to_string(),
            title: "remuxtest".to_string(),
            ..Default::default()
        };
        let options = TaskOptions::new(input).unwrap();
        let task = Task::new(
            "remux-test-task".to_string(),
            options,
            dir,
            Arc::new(AllowAllSafety),
            reqwest::Client::new(),
        );
        let ts_path = dir.join("remuxtest.ts");
        std::fs::write(&ts_path, b"fake transport stream bytes").unwrap();
        {
            let mut st = task.state.lock();
            st.status = TaskStatus::Completed;
            st.output_path = Some(ts_path.clone());
        }
        (task, ts_path)
    }

    /// This is the only test in the crate that mutates `PATH`, so it's safe
    /// to run alongside the rest of the unit-test binary without a lock.
    #[tokio::test]
    async fn non_zero_exit_flips_completed_task_to_error() {
        let work_dir = tempfile::tempdir().unwrap();
        let bin_dir = tempfile::tempdir().unwrap();
        write_fake_ffmpeg(bin_dir.path(), "#!/bin/sh\necho 'boom: unsupported codec' >&2\nexit 1\n");

        let (task, ts_path) = completed_task_with_ts(work_dir.path());

        let original_path = std::env::var_os("PATH");
        let mut search_dirs = vec![bin_dir.path().to_path_buf()];
        if let Some(existing) = &original_path {
            search_dirs.extend(std::env::split_paths(existing));
        }
        let patched_path = std::env::join_paths(search_dirs).unwrap();
        unsafe {
            std::env::set_var("PATH", &patched_path);
        }

        remux(&task, &ts_path).await;

        unsafe {
            match &original_path {
                Some(v) => std::env::set_var("PATH", v),
                None => std::env::remove_var("PATH"),
            }
        }

        let st = task.state.lock();
        assert_eq!(st.status, TaskStatus::Error);
        assert!(st.output_path.is_none(), "output_path must clear once status is error");
        assert!(st.message.contains("boom"));
        assert!(!st.ffmpeg_missing);
    }
}
