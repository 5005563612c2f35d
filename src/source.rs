//! The [`Source`] trait: what the download pipeline needs from a comic site.
//!
//! The pipeline only ever talks to a site through this trait, so the
//! downloader and assembler can be driven by the real site implementation
//! ([`JmSource`](crate::sources::jm::JmSource)) or by an in-memory stand-in.
//!
//! # Examples
//!
//! ```rust
//! use jmfetch::prelude::*;
//! use jmfetch::error::Result;
//!
//! # async fn example() -> Result<()> {
//! let config = Config::default();
//! let source = JmSource::new(&config)?;
//!
//! let work = source.fetch_work("350234").await?;
//! let hits = source.search_works("romance", 1).await?;
//! println!("{} has {} pages, {} search hits", work.title, work.total_pages, hits.len());
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use bytes::Bytes;

use crate::{
    error::Result,
    types::{Chapter, Work, WorkSummary},
};

/// A site that serves works, search results and page images.
///
/// Implementations must be shareable across tasks: the downloader calls
/// [`fetch_image`](Source::fetch_image) from many concurrent futures.
///
/// # Examples
///
/// ```rust
/// use async_trait::async_trait;
/// use bytes::Bytes;
/// use jmfetch::prelude::*;
/// use jmfetch::error::Result;
///
/// struct Offline;
///
/// #[async_trait]
/// impl Source for Offline {
///     fn id(&self) -> &'static str { "offline" }
///     fn name(&self) -> &'static str { "Offline" }
///
///     async fn fetch_work(&self, id: &str) -> Result<Work> {
///         Err(jmfetch::Error::not_found(id))
///     }
///
///     async fn search_works(&self, _query: &str, _page: u32) -> Result<Vec<WorkSummary>> {
///         Ok(vec![])
///     }
///
///     async fn fetch_image(&self, _chapter: &Chapter, url: &str) -> Result<Bytes> {
///         Err(jmfetch::Error::not_found(url))
///     }
/// }
/// ```
#[async_trait]
pub trait Source: Send + Sync {
    /// Short lowercase identifier used in logs and errors.
    fn id(&self) -> &'static str;

    /// Human-readable site name.
    fn name(&self) -> &'static str;

    /// Fetches the full metadata of work `id`, including every chapter's
    /// ordered page list.
    ///
    /// # Errors
    ///
    /// * [`Error::NotFound`](crate::Error::NotFound) - the work does not exist
    /// * [`Error::AllMirrorsFailed`](crate::Error::AllMirrorsFailed) - the site is unreachable
    /// * [`Error::NoChaptersFound`](crate::Error::NoChaptersFound) - no chapter page could be read
    async fn fetch_work(&self, id: &str) -> Result<Work>;

    /// Returns one page of search results for `query`. Pages start at 1.
    async fn search_works(&self, query: &str, page: u32) -> Result<Vec<WorkSummary>>;

    /// Downloads the raw bytes of one page image of `chapter`.
    async fn fetch_image(&self, chapter: &Chapter, url: &str) -> Result<Bytes>;
}
