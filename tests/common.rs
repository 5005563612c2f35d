//! Common test utilities and fixtures
//!
//! Shared functionality used across all test modules.

use async_trait::async_trait;
use bytes::Bytes;
use image::{ImageFormat, Rgb, RgbImage};
use jmfetch::prelude::*;
use jmfetch::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Marker below which chapters are served unscrambled.
#[allow(dead_code)]
pub const MARKER: &str = "220980";

/// A chapter id served unscrambled under [`MARKER`].
#[allow(dead_code)]
pub const PLAIN_CHAPTER: &str = "100000";

/// A chapter id cut into 10 strips under [`MARKER`].
#[allow(dead_code)]
pub const TEN_STRIP_CHAPTER: &str = "250000";

/// Configuration pointed at local test servers and a scratch directory.
#[allow(dead_code)]
pub fn test_config(base_dir: &Path, mirrors: Vec<String>) -> Config {
    Config {
        base_dir: base_dir.to_path_buf(),
        mirrors,
        scheme: "http".to_string(),
        max_retries: 0,
        request_timeout_secs: 5,
        probe_timeout_secs: 2,
        discovery_urls: Vec::new(),
        ..Config::default()
    }
}

/// Solid-color PNG.
#[allow(dead_code)]
pub fn png_bytes(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
    encode(&RgbImage::from_pixel(width, height, Rgb(color)), ImageFormat::Png)
}

/// Image made of horizontal bands; band `i` has gray level `i * 25`.
#[allow(dead_code)]
pub fn banded_image(width: u32, band_height: u32, bands: u32) -> RgbImage {
    RgbImage::from_fn(width, band_height * bands, |_, y| {
        let level = ((y / band_height) * 25).min(255) as u8;
        Rgb([level, level, level])
    })
}

#[allow(dead_code)]
pub fn encode(image: &RgbImage, format: ImageFormat) -> Vec<u8> {
    let mut buf = Vec::new();
    image
        .write_to(&mut std::io::Cursor::new(&mut buf), format)
        .unwrap();
    buf
}

/// A chapter whose image URLs point at the fake image host.
#[allow(dead_code)]
pub fn chapter(id: &str, scramble_id: &str, filenames: &[&str]) -> Chapter {
    Chapter {
        id: id.to_string(),
        title: String::new(),
        scramble_id: scramble_id.to_string(),
        filenames: filenames.iter().map(|f| f.to_string()).collect(),
        image_urls: filenames
            .iter()
            .map(|f| format!("http://fake.host/media/photos/{}/{}", id, f))
            .collect(),
        image_host: "fake.host".to_string(),
        site_host: "fake.site".to_string(),
    }
}

/// In-memory [`Source`] serving images by URL and counting fetches.
#[allow(dead_code)]
#[derive(Default)]
pub struct FakeSource {
    images: HashMap<String, Vec<u8>>,
    failing: HashSet<String>,
    fetches: AtomicUsize,
}

#[allow(dead_code)]
impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `bytes` for every image of `chapter`.
    pub fn serve_chapter(mut self, chapter: &Chapter, bytes: &[u8]) -> Self {
        for url in &chapter.image_urls {
            self.images.insert(url.clone(), bytes.to_vec());
        }
        self
    }

    /// Makes `url` answer with a server error.
    pub fn fail(mut self, url: &str) -> Self {
        self.failing.insert(url.to_string());
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Source for FakeSource {
    fn id(&self) -> &'static str {
        "fake"
    }

    fn name(&self) -> &'static str {
        "Fake"
    }

    async fn fetch_work(&self, id: &str) -> Result<Work> {
        Err(Error::not_found(id))
    }

    async fn search_works(&self, _query: &str, _page: u32) -> Result<Vec<WorkSummary>> {
        Ok(Vec::new())
    }

    async fn fetch_image(&self, _chapter: &Chapter, url: &str) -> Result<Bytes> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        if self.failing.contains(url) {
            return Err(Error::source("fake", format!("HTTP 500 Internal Server Error for {}", url)));
        }

        self.images
            .get(url)
            .map(|bytes| Bytes::from(bytes.clone()))
            .ok_or_else(|| Error::not_found(url))
    }
}

/// Two chapters: three plain pages, then two pages cut into ten strips.
///
/// Every page of the second chapter is the served form of [`banded_image`].
#[allow(dead_code)]
pub fn two_chapter_work() -> (Work, FakeSource) {
    let plain = chapter(PLAIN_CHAPTER, MARKER, &["00001.jpg", "00002.jpg", "00003.jpg"]);
    let strips = chapter(TEN_STRIP_CHAPTER, MARKER, &["00001.jpg", "00002.jpg"]);

    let served = jmfetch::reconstruct::scramble_pixels(&banded_image(64, 20, 10), 10);

    let source = FakeSource::new()
        .serve_chapter(&plain, &png_bytes(120, 160, [200, 30, 30]))
        .serve_chapter(&strips, &encode(&served, ImageFormat::Png));

    let work = Work::new("424242", "Two Chapters", "Someone", vec![], vec![plain, strips]);
    (work, source)
}
