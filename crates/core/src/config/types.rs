use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::converter::ConverterConfig;
use crate::fetcher::FetcherConfig;
use crate::orchestrator::BatchConfig;
use crate::source::SourceConfig;
use crate::uploader::UploaderConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    pub source: SourceConfig,
    #[serde(default)]
    pub download: FetcherConfig,
    #[serde(default)]
    pub converter: ConverterConfig,
    pub uploader: UploaderConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub batch: BatchConfig,
    pub source: SanitizedSourceConfig,
    pub download: FetcherConfig,
    pub converter: ConverterConfig,
    pub uploader: SanitizedUploaderConfig,
}

/// Source config with the session cookie hidden
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedSourceConfig {
    pub base_url: String,
    pub user_agent: String,
    pub referer: Option<String>,
    pub cookie_configured: bool,
    pub timeout_secs: u64,
}

/// Uploader config with the API token hidden
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedUploaderConfig {
    pub base_url: String,
    pub token_configured: bool,
    pub timeout_secs: u64,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            batch: config.batch.clone(),
            source: SanitizedSourceConfig {
                base_url: config.source.base_url.clone(),
                user_agent: config.source.user_agent.clone(),
                referer: config.source.referer.clone(),
                cookie_configured: config
                    .source
                    .cookie
                    .as_ref()
                    .is_some_and(|c| !c.is_empty()),
                timeout_secs: config.source.timeout_secs,
            },
            download: config.download.clone(),
            converter: config.converter.clone(),
            uploader: SanitizedUploaderConfig {
                base_url: config.uploader.base_url.clone(),
                token_configured: config
                    .uploader
                    .token
                    .as_ref()
                    .is_some_and(|t| !t.is_empty()),
                timeout_secs: config.uploader.timeout_secs,
            },
        }
    }
}
