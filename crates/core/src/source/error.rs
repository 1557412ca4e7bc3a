use thiserror::Error;

/// Failures talking to the upstream content API.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The shared session could not be established.
    #[error("upstream client unavailable: {0}")]
    Unavailable(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("upstream returned status {status} for {path}")]
    Status { status: u16, path: String },

    #[error("upstream request timed out")]
    Timeout,

    #[error("{0}")]
    Transport(String),

    #[error("invalid upstream response: {0}")]
    InvalidResponse(String),

    #[error("no playable stream for {0}")]
    NoStream(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }
}

impl From<reqwest::Error> for SourceError {
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
