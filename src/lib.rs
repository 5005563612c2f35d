//! # jmfetch - Mirror-aware comic acquisition library
//!
//! jmfetch fetches multi-chapter works from the JM comic site, undoes the
//! strip scrambling the site applies to newer pages, and assembles the pages
//! into page-bounded, optionally encrypted PDF documents.
//!
//! ## Features
//!
//! - **Mirror Failover**: every site request walks an ordered mirror list and
//!   only fails when all mirrors have failed
//! - **Mirror Probing**: parallel health checks plus discovery of new mirrors
//! - **Scramble Resolution**: bit-exact strip counts per page
//! - **Image Reconstruction**: exact inverse of the strip permutation
//! - **Bounded Downloads**: one concurrency cap per work, chapter-level
//!   all-or-nothing results and resume from a previous run
//! - **PDF Assembly**: chunked output, aspect-preserving page sizes, optional
//!   JPEG recompression and AES-256 encryption
//! - **Search**: result parsing, cached last-page estimation and random picks
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use jmfetch::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> jmfetch::Result<()> {
//!     let config = ConfigBuilder::default()
//!         .base_dir("./downloads")
//!         .max_pages_per_file(150usize)
//!         .build()
//!         .map_err(|e| jmfetch::Error::Other(e.to_string()))?;
//!
//!     let source = Arc::new(JmSource::new(&config)?);
//!     let work = source.fetch_work("350234").await?;
//!
//!     let images = Downloader::new(source.clone(), &config)
//!         .download_work(&work)
//!         .await?;
//!
//!     let files = Assembler::new(&config).assemble(&work, &images).await?;
//!     println!("{} -> {} file(s)", work.title, files.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`config`]: pipeline configuration
//! - [`source`]: the [`Source`] trait the pipeline consumes
//! - [`sources`]: the JM site implementation and its extraction strategies
//! - [`mirror`]: mirror list, failover and probing
//! - [`scramble`] / [`reconstruct`]: strip counts and strip reordering
//! - [`download`]: batch downloader
//! - [`assemble`]: pagination and PDF assembly
//! - [`search`]: max-page bisection and cache
//! - [`net`]: HTTP client, rate limiting and markup helpers
//! - [`error`]: error handling
//!
//! The library logs through `tracing` and never installs a subscriber.

pub mod assemble;
pub mod config;
pub mod download;
pub mod error;
pub mod mirror;
pub mod net;
pub mod reconstruct;
pub mod scramble;
pub mod search;
pub mod source;
pub mod sources;
pub mod types;

/// Prelude module for convenient imports.
///
/// ```rust
/// use jmfetch::prelude::*;
///
/// let config = Config::default();
/// assert_eq!(segment_count("220980", "100000", "00001.jpg"), 0);
/// # let _ = config;
/// ```
pub mod prelude {
    pub use crate::{
        assemble::Assembler,
        config::{Config, ConfigBuilder},
        download::Downloader,
        mirror::{MirrorSet, ProbeReport},
        reconstruct::reconstruct,
        scramble::segment_count,
        source::Source,
        sources::JmSource,
        types::{AcquiredImage, Chapter, Work, WorkSummary},
    };
}

// Re-export main types at crate root for direct access
pub use assemble::Assembler;
pub use config::Config;
pub use download::Downloader;
pub use error::{Error, Result};
pub use source::Source;
pub use sources::JmSource;
pub use types::{AcquiredImage, Chapter, Work, WorkSummary};
