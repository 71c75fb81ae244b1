use thiserror::Error;

/// Tagged error hierarchy for everything that can go wrong inside a task's
/// worker. The `message` surfaced on a [`crate::task::TaskSnapshot`] is this
/// error's `Display` rendering; the variant itself drives control flow
/// (e.g. whether a segment failure is retried).
#[derive(Debug, Error, Clone)]
pub enum EngineError {
    #[error("{0}")]
    Validation(String),

    #[error("内部网络: {0}")]
    UnsafeUrl(String),

    #[error("{0}")]
    PlaylistRejected(String),

    #[error("HTTP {status}: {cause}", status = .status.map(|s| s.to_string()).unwrap_or_else(|| "error".into()))]
    Network {
        status: Option<u16>,
        cause: String,
    },

    #[error("unsupported encryption: {0}")]
    UnsupportedEncryption(String),

    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("remux failed: {0}")]
    Remuxer(String),
}

impl EngineError {
    /// Recoverable errors are the ones the segment pipeline retries
    /// (spec §7: "Network" and "Decryption" are retried up to `max_retries`).
    pub fn is_recoverable(&self) -> bool {
        matches!(self, EngineError::Network { .. } | EngineError::Decryption(_))
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::Io(e.to_string())
    }
}

/// Errors returned across the task-manager boundary. Per spec §7, the
/// manager's own operations never propagate an [`EngineError`] — a task's
/// internal failure is only observable via its snapshot's `status`/`message`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ManagerError {
    #[error("task not found: {0}")]
    NotFound(String),

    #[error("segment index out of range: {0}")]
    OutOfRange(usize),

    #[error("{0}")]
    Validation(String),
}
