use serde::{Deserialize, Serialize};

/// Connection settings for the upstream content API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// API root, e.g. `https://upstream.example/api`.
    pub base_url: String,

    /// User-Agent sent to the API and forwarded to stream downloads.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Referer forwarded to stream downloads. Falls back to `base_url`.
    #[serde(default)]
    pub referer: Option<String>,

    /// Session cookie for authenticated lookups.
    #[serde(default)]
    pub cookie: Option<String>,

    /// Timeout for each API call in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_user_agent() -> String {
    concat!("vidtune/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_timeout() -> u64 {
    30
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            user_agent: default_user_agent(),
            referer: None,
            cookie: None,
            timeout_secs: default_timeout(),
        }
    }
}

impl SourceConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.cookie = Some(cookie.into());
        self
    }

    /// Referer to present when downloading streams.
    pub fn effective_referer(&self) -> &str {
        self.referer
            .as_deref()
            .filter(|r| !r.is_empty())
            .unwrap_or(&self.base_url)
    }
}
