use thiserror::Error;

/// Download failures.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("status code {status}")]
    Status { status: u16 },

    #[error("download timed out")]
    Timeout,

    #[error("invalid header {name}: {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("{0}")]
    Transport(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(e.to_string())
        }
    }
}
