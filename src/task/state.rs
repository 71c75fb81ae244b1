use serde::Serialize;

/// Task lifecycle states (spec §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Ready,
    Preparing,
    Downloading,
    Paused,
    Completed,
    Error,
    Stopped,
    Forced,
}

impl TaskStatus {
    /// A terminal status never transitions out once entered (spec §5,
    /// §8 invariant).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Error | TaskStatus::Stopped | TaskStatus::Forced
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Ready => "ready",
            TaskStatus::Preparing => "preparing",
            TaskStatus::Downloading => "downloading",
            TaskStatus::Paused => "paused",
            TaskStatus::Completed => "completed",
            TaskStatus::Error => "error",
            TaskStatus::Stopped => "stopped",
            TaskStatus::Forced => "forced",
        };
        f.write_str(s)
    }
}
