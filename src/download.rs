//! Batch download of a work's page images.
//!
//! [`Downloader`] fetches every image of a [`Work`], reconstructs scrambled
//! pages and writes them as `{base_dir}/{work_id}/{index:04}{ext}`. One
//! semaphore caps in-flight image requests for the whole call.
//!
//! Chapters are all-or-nothing: if any image of a chapter fails, the work
//! fails with [`Error::PartialDownload`] so no incomplete document is built
//! from it.
//!
//! A work directory that already holds at least `total_pages` images is
//! trusted as-is, and the images are returned without touching the network.
//!
//! # Examples
//!
//! ```rust,no_run
//! use jmfetch::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> jmfetch::Result<()> {
//! let config = Config::default();
//! let source = Arc::new(JmSource::new(&config)?);
//!
//! let work = source.fetch_work("350234").await?;
//! let downloader = Downloader::new(source, &config);
//! let images = downloader.download_work(&work).await?;
//! println!("{} pages in {}", images.len(), downloader.work_dir(&work).display());
//! # Ok(())
//! # }
//! ```

use futures::future::join_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Semaphore;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::reconstruct::reconstruct;
use crate::scramble::segment_count;
use crate::source::Source;
use crate::types::{AcquiredImage, Chapter, Work};

/// Extensions recognised when scanning a work directory from a previous run.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif"];

/// Downloads and reconstructs page images through a [`Source`].
pub struct Downloader {
    source: Arc<dyn Source>,
    base_dir: PathBuf,
    concurrency: usize,
}

impl Downloader {
    /// Creates a downloader writing under `config.base_dir` with
    /// `config.concurrency` parallel requests.
    pub fn new(source: Arc<dyn Source>, config: &Config) -> Self {
        Self {
            source,
            base_dir: config.base_dir.clone(),
            concurrency: config.concurrency.max(1),
        }
    }

    /// Directory holding the images and documents of `work`.
    pub fn work_dir(&self, work: &Work) -> PathBuf {
        self.base_dir.join(sanitize_filename(&work.id))
    }

    /// Downloads every page of `work`, chapter by chapter.
    ///
    /// On success the images carry dense global indices `0..total_pages` in
    /// chapter order.
    ///
    /// # Errors
    ///
    /// * [`Error::PartialDownload`] - an image of some chapter failed; carries
    ///   the first failure in page order
    /// * [`Error::Io`] - the work directory could not be created or scanned
    pub async fn download_work(&self, work: &Work) -> Result<Vec<AcquiredImage>> {
        let dir = self.work_dir(work);
        fs::create_dir_all(&dir).await?;

        let existing = scan_existing(&dir).await?;
        if !existing.is_empty() && existing.len() >= work.total_pages {
            tracing::info!(
                work_id = %work.id,
                images = existing.len(),
                "reusing images from a previous run"
            );
            return Ok(existing);
        }

        let semaphore = Semaphore::new(self.concurrency);
        let mut images = Vec::with_capacity(work.total_pages);
        let mut next_index = 0;

        for chapter in &work.chapters {
            let first_index = next_index;
            next_index += chapter.page_count();

            let mut acquired = self
                .download_chapter(chapter, first_index, &dir, &semaphore)
                .await?;
            tracing::info!(
                work_id = %work.id,
                chapter = %chapter.id,
                images = acquired.len(),
                "chapter downloaded"
            );
            images.append(&mut acquired);
        }

        Ok(images)
    }

    async fn download_chapter(
        &self,
        chapter: &Chapter,
        first_index: usize,
        dir: &Path,
        semaphore: &Semaphore,
    ) -> Result<Vec<AcquiredImage>> {
        let total = chapter.page_count();
        let results = join_all((0..total).map(|position| {
            self.download_image(chapter, position, first_index + position, dir, semaphore)
        }))
        .await;

        let mut images = Vec::with_capacity(total);
        let mut failed = 0;
        let mut first_error = None;

        for result in results {
            match result {
                Ok(image) => images.push(image),
                Err(e) => {
                    failed += 1;
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            None => Ok(images),
            Some(first) => {
                tracing::warn!(chapter = %chapter.id, failed, total, error = %first, "chapter rejected");
                Err(Error::PartialDownload {
                    chapter: chapter.id.clone(),
                    failed,
                    total,
                    first: Box::new(first),
                })
            }
        }
    }

    async fn download_image(
        &self,
        chapter: &Chapter,
        position: usize,
        index: usize,
        dir: &Path,
        semaphore: &Semaphore,
    ) -> Result<AcquiredImage> {
        let _permit = semaphore
            .acquire()
            .await
            .map_err(|e| Error::Other(e.to_string()))?;

        let url = &chapter.image_urls[position];
        let filename = chapter.filename_at(position).unwrap_or_default();

        let bytes = self.source.fetch_image(chapter, url).await?;
        let segments = segment_count(&chapter.scramble_id, &chapter.id, &filename);
        tracing::debug!(%url, index, segments, "image fetched");

        let data = if segments > 0 {
            tokio::task::spawn_blocking(move || reconstruct(&bytes, segments)).await?
        } else {
            bytes.to_vec()
        };

        let extension = extract_extension(&filename).unwrap_or_else(|| "jpg".to_string());
        let path = dir.join(format!("{:04}.{}", index, extension));
        fs::write(&path, &data).await?;

        Ok(AcquiredImage {
            index,
            chapter_index: Some(position),
            path,
            data,
            filename,
        })
    }

    /// Removes the work directory and everything in it.
    pub async fn cleanup(&self, work: &Work) -> Result<()> {
        match fs::remove_dir_all(self.work_dir(work)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Loads images left in `dir` by a previous run, ordered by the number in
/// their file stem. Files without a numeric stem are ignored.
pub async fn scan_existing(dir: &Path) -> Result<Vec<AcquiredImage>> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut images = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_image = extract_extension(&path.to_string_lossy())
            .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()));
        if !is_image || !entry.file_type().await?.is_file() {
            continue;
        }

        let Some(index) = stem_index(&path) else {
            continue;
        };

        images.push(AcquiredImage {
            index,
            chapter_index: None,
            filename: entry.file_name().to_string_lossy().into_owned(),
            data: fs::read(&path).await?,
            path,
        });
    }

    images.sort_by_key(|image| image.index);
    Ok(images)
}

fn stem_index(path: &Path) -> Option<usize> {
    let stem = path.file_stem()?.to_str()?;
    let digits: String = stem.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// Sanitizes a filename by replacing characters most file systems reject.
///
/// ```rust
/// use jmfetch::download::sanitize_filename;
///
/// assert_eq!(sanitize_filename("350234"), "350234");
/// assert_eq!(sanitize_filename("a/b:c"), "a_b_c");
/// ```
pub fn sanitize_filename(name: &str) -> String {
    let invalid_chars = ['/', '\\', ':', '*', '?', '"', '<', '>', '|'];
    let mut sanitized: String = name
        .chars()
        .map(|c| if invalid_chars.contains(&c) { '_' } else { c })
        .collect::<String>()
        .trim()
        .to_string();

    if sanitized.len() > 200 {
        let mut cut = 200;
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized.truncate(cut);
    }

    if sanitized.is_empty() || sanitized == "." || sanitized == ".." {
        sanitized = "untitled".to_string();
    }

    sanitized
}

/// Lowercase extension of a filename or URL, ignoring query and fragment.
///
/// ```rust
/// use jmfetch::download::extract_extension;
///
/// assert_eq!(extract_extension("00001.webp"), Some("webp".to_string()));
/// assert_eq!(extract_extension("https://cdn/x/00002.JPG?v=1"), Some("jpg".to_string()));
/// assert_eq!(extract_extension("00003"), None);
/// ```
pub fn extract_extension(name: &str) -> Option<String> {
    let clean = name.split('?').next()?.split('#').next()?;
    let last = clean.rsplit(['/', '\\']).next()?;

    let dot = last.rfind('.')?;
    let ext = &last[dot + 1..];
    (!ext.is_empty() && ext.len() <= 10).then(|| ext.to_lowercase())
}
