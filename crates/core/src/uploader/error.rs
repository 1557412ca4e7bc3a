use thiserror::Error;

/// Failures while delivering a track.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("track already exists")]
    AlreadyExists,

    #[error("{step} returned status {status}")]
    Status { step: &'static str, status: u16 },

    #[error("upload timed out")]
    Timeout,

    #[error("{0}")]
    Transport(String),

    #[error("invalid response from destination: {0}")]
    InvalidResponse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for UploadError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::InvalidResponse(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}
