//! Read-only configuration consumed by the acquisition pipeline.
//!
//! [`Config`] mirrors the persisted plugin configuration. Loading a JSON
//! document is supported; saving it back is left to the embedding runtime.
//!
//! ```rust
//! use jmfetch::config::ConfigBuilder;
//!
//! let config = ConfigBuilder::default()
//!     .base_dir("./downloads")
//!     .max_pages_per_file(150usize)
//!     .password("secret")
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.concurrency, 10);
//! assert!(config.encryption_password().is_some());
//! ```

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;

/// Hosts the site has historically served from, in preference order.
pub const DEFAULT_MIRRORS: &[&str] = &[
    "18comic.vip",
    "18comic.org",
    "jmcomic.me",
    "jmcomic1.me",
    "jmcomic2.me",
];

/// Image host used when a chapter page names none.
pub const DEFAULT_IMAGE_HOST: &str = "cdn-msp.jmcomic.org";

const DISCOVERY_TEMPLATE: &str = "https://jmcmomic.github.io/go/{}.html";

/// Pipeline configuration.
///
/// Every field has a default, so partial JSON documents deserialize cleanly.
/// Call [`Config::normalized`] after loading from an untrusted document.
#[derive(Debug, Clone, Serialize, Deserialize, Builder)]
#[builder(setter(into), default)]
#[serde(default)]
pub struct Config {
    /// Directory holding one sub-directory per work.
    pub base_dir: PathBuf,

    /// Maximum images per output document. `0` puts everything in one file.
    pub max_pages_per_file: usize,

    /// JPEG recompression quality. `0` or `>= 100` disables recompression.
    pub image_quality: u8,

    /// Document password. Empty disables encryption.
    pub password: String,

    /// Maximum concurrent image downloads.
    pub concurrency: usize,

    /// Known-good mirror hostnames. Empty selects [`DEFAULT_MIRRORS`].
    pub mirrors: Vec<String>,

    /// URL scheme for site and image hosts.
    pub scheme: String,

    /// Fallback image host.
    pub default_image_host: String,

    pub request_timeout_secs: u64,
    pub probe_timeout_secs: u64,

    /// Retries for page image fetches. Site pages are never retried on the
    /// same mirror.
    pub max_retries: u32,

    /// Minimum delay between two requests of the same client. `0` disables it.
    pub request_delay_ms: u64,

    /// Highest search page the max-page bisection will consider.
    pub search_page_ceiling: u32,

    pub max_page_ttl_secs: u64,

    /// Pages listing current mirror hostnames, scanned by mirror probing.
    pub discovery_urls: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("./downloads"),
            max_pages_per_file: 200,
            image_quality: 0,
            password: String::new(),
            concurrency: 10,
            mirrors: Vec::new(),
            scheme: "https".to_string(),
            default_image_host: DEFAULT_IMAGE_HOST.to_string(),
            request_timeout_secs: 60,
            probe_timeout_secs: 10,
            max_retries: 2,
            request_delay_ms: 0,
            search_page_ceiling: 3000,
            max_page_ttl_secs: 24 * 60 * 60,
            discovery_urls: (300..=308)
                .map(|n| DISCOVERY_TEMPLATE.replace("{}", &n.to_string()))
                .collect(),
        }
    }
}

impl Config {
    /// Parses a JSON document, filling missing fields with defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        Ok(config.normalized())
    }

    /// Reads and parses a JSON configuration file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path).await?;
        Self::from_json_str(&raw)
    }

    /// Clamps out-of-range values into their usable ranges.
    pub fn normalized(mut self) -> Self {
        self.image_quality = self.image_quality.min(100);
        self.concurrency = self.concurrency.max(1);
        if self.scheme.is_empty() {
            self.scheme = "https".to_string();
        }
        if self.default_image_host.is_empty() {
            self.default_image_host = DEFAULT_IMAGE_HOST.to_string();
        }
        self.search_page_ceiling = self.search_page_ceiling.max(1);
        self
    }

    /// Quality to recompress pages at, or `None` when recompression is disabled.
    pub fn recompress_quality(&self) -> Option<u8> {
        match self.image_quality {
            0 | 100..=u8::MAX => None,
            q => Some(q),
        }
    }

    /// The document password, or `None` when encryption is disabled.
    pub fn encryption_password(&self) -> Option<&str> {
        (!self.password.is_empty()).then_some(self.password.as_str())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn max_page_ttl(&self) -> Duration {
        Duration::from_secs(self.max_page_ttl_secs)
    }

    /// Configured mirrors, or the built-in list when none are configured.
    pub fn mirror_hosts(&self) -> Vec<String> {
        if self.mirrors.is_empty() {
            DEFAULT_MIRRORS.iter().map(|h| h.to_string()).collect()
        } else {
            self.mirrors.clone()
        }
    }
}
