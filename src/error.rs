//! Error types and result handling for jmfetch operations.
//!
//! Every public operation returns a [`Result<T>`], an alias for
//! `std::result::Result<T, Error>`.
//!
//! # Error Categories
//!
//! - **Mirror failures**: every candidate host failed for one fetch
//!   ([`Error::AllMirrorsFailed`])
//! - **Structural failures**: the markup held nothing usable
//!   ([`Error::NotFound`], [`Error::NoChaptersFound`])
//! - **Download failures**: at least one image of a chapter failed
//!   ([`Error::PartialDownload`])
//! - **Assembly failures**: nothing to assemble, or a write/encrypt step failed
//!   ([`Error::NoImages`], [`Error::Assembly`], [`Error::Encryption`])
//! - **Transport and IO**: network, HTTP status, rate limiting, file system,
//!   decoding and PDF errors
//!
//! # Examples
//!
//! ```rust,no_run
//! use jmfetch::prelude::*;
//! use jmfetch::error::{Error, Result};
//!
//! # async fn example() -> Result<()> {
//! let source = JmSource::new(&Config::default())?;
//!
//! match source.fetch_work("350234").await {
//!     Ok(work) => println!("{} pages", work.total_pages),
//!     Err(Error::AllMirrorsFailed { attempts, last }) => {
//!         println!("{attempts} mirrors failed, last error: {last}")
//!     }
//!     Err(Error::NoChaptersFound(id)) => println!("nothing to download for {id}"),
//!     Err(e) => println!("Other error: {e}"),
//! }
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results with jmfetch errors.
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error type for all jmfetch operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Network-related errors from the HTTP client (timeouts, DNS, TLS).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Markup or data that could not be parsed as expected.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Source-specific errors, including non-success HTTP statuses.
    ///
    /// * `src` - The source or host that produced the error
    /// * `message` - What went wrong
    #[error("Source error [{src}]: {message}")]
    Source { src: String, message: String },

    /// A requested work or resource does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Every mirror was tried in order and every one failed.
    ///
    /// `last` is the error returned by the final candidate.
    #[error("All {attempts} mirrors failed, last error: {last}")]
    AllMirrorsFailed { attempts: usize, last: Box<Error> },

    /// The detail page parsed but no chapter page could be fetched.
    #[error("No chapters found for work {0}")]
    NoChaptersFound(String),

    /// At least one image in a chapter failed, so the whole chapter is rejected.
    ///
    /// `first` is the first failure in page order.
    #[error("Chapter {chapter}: {failed} of {total} images failed, first error: {first}")]
    PartialDownload {
        chapter: String,
        failed: usize,
        total: usize,
        first: Box<Error>,
    },

    /// Assembly was asked to build documents from an empty image list.
    #[error("No images to assemble")]
    NoImages,

    /// Writing or encrypting one output file failed.
    #[error("Failed to assemble {}: {source}", path.display())]
    Assembly {
        path: PathBuf,
        #[source]
        source: Box<Error>,
    },

    /// The document cipher could not be set up.
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// The source throttled requests after every retry was spent.
    #[error("Rate limited, retry after {retry_after:?} seconds")]
    RateLimit { retry_after: Option<u64> },

    /// File system and IO operation errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization and deserialization errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Image decoding and encoding errors.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// PDF construction, loading and saving errors.
    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    /// A blocking or spawned task panicked or was cancelled.
    #[error("Join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// Generic error messages.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Creates a parse error with the given message.
    ///
    /// ```rust
    /// use jmfetch::Error;
    ///
    /// let error = Error::parse("page_arr is not a string array");
    /// assert!(error.to_string().contains("page_arr"));
    /// ```
    pub fn parse(msg: impl Into<String>) -> Self {
        Error::Parse(msg.into())
    }

    /// Creates a source-specific error with source ID and message.
    pub fn source(src: impl Into<String>, msg: impl Into<String>) -> Self {
        Error::Source {
            src: src.into(),
            message: msg.into(),
        }
    }

    /// Creates a not found error with the given message.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    /// Creates a rate limit error with optional retry-after time.
    pub fn rate_limit(retry_after: Option<u64>) -> Self {
        Error::RateLimit { retry_after }
    }

    /// Wraps a per-file failure with the output path it belongs to.
    pub fn assembly(path: impl Into<PathBuf>, source: Error) -> Self {
        Error::Assembly {
            path: path.into(),
            source: Box::new(source),
        }
    }

    /// Returns `true` when the site answered but had nothing usable:
    /// the work is missing, or none of its chapters could be read.
    pub fn is_absent(&self) -> bool {
        matches!(self, Error::NotFound(_) | Error::NoChaptersFound(_))
    }
}
