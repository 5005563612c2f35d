//! Core data types for works, chapters and acquired images.
//!
//! - [`Work`] - A multi-chapter comic with its metadata
//! - [`Chapter`] - One chapter with its ordered page filenames and image URLs
//! - [`WorkSummary`] - A search hit
//! - [`AcquiredImage`] - A reconstructed page persisted on disk
//!
//! # Examples
//!
//! ```rust
//! use jmfetch::types::{Chapter, Work};
//!
//! let chapter = Chapter {
//!     id: "350234".to_string(),
//!     title: "Chapter 1".to_string(),
//!     scramble_id: "220980".to_string(),
//!     filenames: vec!["00001.webp".to_string()],
//!     image_urls: vec!["https://cdn.example/media/photos/350234/00001.webp".to_string()],
//!     image_host: "cdn.example".to_string(),
//!     site_host: "18comic.vip".to_string(),
//! };
//!
//! let work = Work::new("350234", "Title", "Author", vec!["tag".to_string()], vec![chapter]);
//! assert_eq!(work.total_pages, 1);
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A comic with all its chapters.
///
/// Built once by the metadata extractor and treated as immutable for the
/// rest of an acquisition run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Work {
    /// Site-assigned identifier
    pub id: String,

    pub title: String,

    /// First credited author, empty when the page names none
    #[serde(default)]
    pub author: String,

    /// Tags in page order, duplicates removed
    #[serde(default)]
    pub tags: Vec<String>,

    /// Sum of the page counts of every chapter
    pub total_pages: usize,

    /// Chapters in ascending numeric id order
    pub chapters: Vec<Chapter>,
}

impl Work {
    /// Creates a work, deriving `total_pages` from the chapters and dropping
    /// duplicate tags.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        author: impl Into<String>,
        tags: Vec<String>,
        chapters: Vec<Chapter>,
    ) -> Self {
        let mut unique_tags: Vec<String> = Vec::with_capacity(tags.len());
        for tag in tags {
            if !unique_tags.contains(&tag) {
                unique_tags.push(tag);
            }
        }

        Self {
            id: id.into(),
            title: title.into(),
            author: author.into(),
            tags: unique_tags,
            total_pages: chapters.iter().map(Chapter::page_count).sum(),
            chapters,
        }
    }
}

/// One chapter of a work.
///
/// `image_urls` and `filenames` are 1:1 and ordered by the page number
/// embedded in each filename.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    /// Numeric chapter identifier, as a string
    pub id: String,

    /// Display title
    pub title: String,

    /// Scramble epoch marker in effect for this chapter
    pub scramble_id: String,

    /// Page filenames in reading order
    #[serde(default)]
    pub filenames: Vec<String>,

    /// Fully qualified image URLs, same order as `filenames`
    #[serde(default)]
    pub image_urls: Vec<String>,

    /// Host serving this chapter's images
    pub image_host: String,

    /// Mirror the chapter page was read from, empty when unknown
    #[serde(default)]
    pub site_host: String,
}

impl Chapter {
    pub fn page_count(&self) -> usize {
        self.image_urls.len()
    }

    /// Filename of page `index`, falling back to the last URL path segment.
    pub fn filename_at(&self, index: usize) -> Option<String> {
        if let Some(name) = self.filenames.get(index) {
            return Some(name.clone());
        }

        let url = self.image_urls.get(index)?;
        url::Url::parse(url)
            .ok()
            .and_then(|u| u.path_segments()?.last().map(str::to_string))
            .filter(|name| !name.is_empty())
    }
}

/// A work as listed on a search result page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkSummary {
    pub id: String,
    pub title: String,
}

/// A reconstructed page persisted under the work directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcquiredImage {
    /// Position within the whole work, dense from 0 on a full acquisition
    pub index: usize,

    /// Position within the source chapter; `None` for images picked up from a
    /// previous run
    pub chapter_index: Option<usize>,

    /// Where the reconstructed bytes were written
    pub path: PathBuf,

    /// Reconstructed bytes
    #[serde(skip)]
    pub data: Vec<u8>,

    /// Original page filename (the stored filename for resumed images)
    pub filename: String,
}
