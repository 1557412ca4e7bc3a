use serde::{Deserialize, Serialize};

/// Connection settings for the destination service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploaderConfig {
    /// API root of the destination service.
    pub base_url: String,

    /// Bearer token, sent when present.
    #[serde(default)]
    pub token: Option<String>,

    /// Timeout for each request in seconds, file transfer included.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    300
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            token: None,
            timeout_secs: default_timeout(),
        }
    }
}

impl UploaderConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}
