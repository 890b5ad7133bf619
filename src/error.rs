use thiserror::Error;

pub type Result<T> = std::result::Result<T, WatchError>;

#[derive(Debug, Error)]
pub enum WatchError {
    /// Rejected before any process or file is touched.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A `/proc`, `/sys` or mount-point read failed. Only the affected
    /// source skips its cycle.
    #[error("{resource} unavailable: {reason}")]
    ResourceUnavailable { resource: String, reason: String },

    #[error("process failed to start: {0}")]
    ProcessStart(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("system call failed: {0}")]
    Sys(#[from] nix::errno::Errno),
}

impl WatchError {
    pub fn unavailable(resource: impl Into<String>, reason: impl ToString) -> Self {
        WatchError::ResourceUnavailable {
            resource: resource.into(),
            reason: reason.to_string(),
        }
    }
}
