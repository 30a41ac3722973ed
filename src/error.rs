use thiserror::Error;

#[derive(Error, Debug)]
pub enum G2GError {
    #[error(
        "GitLab request for {resource} still failing after {attempts} attempts (last status: {}): {message}",
        display_status(.status)
    )]
    TransientFetch {
        resource: String,
        status: Option<u16>,
        attempts: u32,
        message: String,
    },

    #[error("GitLab request for {resource} failed with status {status}: {message}")]
    FatalFetch {
        resource: String,
        status: u16,
        message: String,
    },

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Run cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A graph store rejected (part of) a write unit.
///
/// `descriptor` names the node or edge whose statement failed, or the
/// transaction step (`begin`, `commit`) when no single descriptor is at fault.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("failed to write {descriptor}: {message}")]
pub struct WriteError {
    pub descriptor: String,
    pub message: String,
    pub retryable: bool,
}

impl WriteError {
    pub fn new(descriptor: impl ToString, message: impl ToString, retryable: bool) -> Self {
        Self {
            descriptor: descriptor.to_string(),
            message: message.to_string(),
            retryable,
        }
    }
}

fn display_status(status: &Option<u16>) -> String {
    status.map_or_else(|| "none".to_string(), |s| s.to_string())
}

pub type Result<T> = std::result::Result<T, G2GError>;
