//! Pagination and assembly of downloaded pages into PDF documents.
//!
//! [`Assembler`] splits an image list into contiguous chunks of at most
//! `max_pages_per_file` images and writes one document per chunk next to the
//! images:
//!
//! - one chunk: `{work_id}.pdf`
//! - several chunks: `{work_id}-part1.pdf`, `{work_id}-part2.pdf`, ...
//!
//! Every page is normalized to a baseline RGB JPEG and placed on a page
//! sized to the image's aspect ratio, at most 1240×1754 units (A4 at
//! 150 DPI) and never below 100 units on either side. Pages that cannot be
//! decoded are skipped with a warning. With a password configured, each
//! finished file is encrypted in place with AES-256.
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
//! let work = source.fetch_work("350234").await?;
//!
//! let images = Downloader::new(source, &config).download_work(&work).await?;
//! for path in Assembler::new(&config).assemble(&work, &images).await? {
//!     println!("wrote {}", path.display());
//! }
//! # Ok(())
//! # }
//! ```

use lopdf::content::{Content, Operation};
use lopdf::encryption::crypt_filters::{Aes256CryptFilter, CryptFilter};
use lopdf::{
    Document, EncryptionState, EncryptionVersion, Object, Permissions, Stream, StringFormat,
    dictionary,
};
use rand::Rng;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;

use crate::config::Config;
use crate::download::sanitize_filename;
use crate::error::{Error, Result};
use crate::reconstruct::encode_jpeg;
use crate::types::{AcquiredImage, Work};

/// Largest page width, in PDF units.
pub const MAX_PAGE_WIDTH: f64 = 1240.0;

/// Largest page height, in PDF units.
pub const MAX_PAGE_HEIGHT: f64 = 1754.0;

/// Smallest page side, in PDF units.
pub const MIN_PAGE_SIDE: f64 = 100.0;

/// Files at or below this size are considered unfinished and rebuilt.
pub const MIN_BUILT_SIZE: u64 = 1024;

/// JPEG quality used to normalize pages when recompression is off.
const NORMALIZE_QUALITY: u8 = 100;

/// Page size for an image of `width`×`height` pixels.
///
/// Scales down to fit the maximum page box, keeping the aspect ratio, and
/// never scales up. Each side is then raised to at least [`MIN_PAGE_SIDE`].
///
/// ```rust
/// use jmfetch::assemble::page_size;
///
/// assert_eq!(page_size(800, 1000), (800.0, 1000.0));
/// assert_eq!(page_size(2480, 3508), (1240.0, 1754.0));
/// assert_eq!(page_size(40, 60), (100.0, 100.0));
/// ```
pub fn page_size(width: u32, height: u32) -> (f64, f64) {
    let (w, h) = (width as f64, height as f64);
    let mut scale = 1.0;

    if w > MAX_PAGE_WIDTH {
        scale = MAX_PAGE_WIDTH / w;
    }
    if h * scale > MAX_PAGE_HEIGHT {
        scale = MAX_PAGE_HEIGHT / h;
    }

    ((w * scale).max(MIN_PAGE_SIDE), (h * scale).max(MIN_PAGE_SIDE))
}

/// Output file name for chunk `index` (0-based) of `total`.
///
/// ```rust
/// use jmfetch::assemble::chunk_file_name;
///
/// assert_eq!(chunk_file_name("350234", 0, 1), "350234.pdf");
/// assert_eq!(chunk_file_name("350234", 1, 3), "350234-part2.pdf");
/// ```
pub fn chunk_file_name(work_id: &str, index: usize, total: usize) -> String {
    let base = sanitize_filename(work_id);
    if total <= 1 {
        format!("{}.pdf", base)
    } else {
        format!("{}-part{}.pdf", base, index + 1)
    }
}

/// A page ready to embed: normalized JPEG bytes plus geometry.
#[derive(Debug, Clone)]
pub struct PreparedPage {
    pub pixel_width: u32,
    pub pixel_height: u32,
    pub page_width: f64,
    pub page_height: f64,
    pub jpeg: Vec<u8>,
}

/// Decodes one image and re-encodes it as an RGB JPEG.
pub fn prepare_page(data: &[u8], quality: Option<u8>) -> Result<PreparedPage> {
    let rgb = image::load_from_memory(data)?.to_rgb8();
    let (pixel_width, pixel_height) = rgb.dimensions();
    let jpeg = encode_jpeg(&rgb, quality.unwrap_or(NORMALIZE_QUALITY))?;
    let (page_width, page_height) = page_size(pixel_width, pixel_height);

    Ok(PreparedPage {
        pixel_width,
        pixel_height,
        page_width,
        page_height,
        jpeg,
    })
}

/// Builds an unencrypted document with one page per prepared image.
pub fn build_document(pages: &[PreparedPage]) -> Result<Document> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());

    for page in pages {
        let image = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => page.pixel_width as i64,
                "Height" => page.pixel_height as i64,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8_i64,
                "Filter" => "DCTDecode",
            },
            page.jpeg.clone(),
        )
        .with_compression(false);
        let image_id = doc.add_object(image);

        let (w, h) = (page.page_width as f32, page.page_height as f32);
        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![
                        Object::Real(w),
                        Object::Integer(0),
                        Object::Integer(0),
                        Object::Real(h),
                        Object::Integer(0),
                        Object::Integer(0),
                    ],
                ),
                Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
                Operation::new("Q", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));

        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![
                Object::Integer(0),
                Object::Integer(0),
                Object::Real(w),
                Object::Real(h),
            ],
            "Contents" => content_id,
            "Resources" => dictionary! {
                "XObject" => dictionary! {
                    "Im0" => image_id,
                },
            },
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let id: [u8; 16] = rand::thread_rng().r#gen();
    doc.trailer.set(
        "ID",
        vec![
            Object::String(id.to_vec(), StringFormat::Hexadecimal),
            Object::String(id.to_vec(), StringFormat::Hexadecimal),
        ],
    );

    Ok(doc)
}

/// Encrypts the document at `path` with AES-256, replacing the plaintext file.
///
/// The same password opens the file as owner and as user. The encrypted
/// copy is written beside the original and renamed over it.
pub fn encrypt_in_place(path: &Path, password: &str) -> Result<()> {
    let mut doc = Document::load(path)?;

    let mut file_key = [0u8; 32];
    rand::thread_rng().fill(&mut file_key);

    let filter: Arc<dyn CryptFilter> = Arc::new(Aes256CryptFilter);
    let version = EncryptionVersion::V5 {
        encrypt_metadata: true,
        crypt_filters: BTreeMap::from([(b"StdCF".to_vec(), filter)]),
        file_encryption_key: &file_key,
        stream_filter: b"StdCF".to_vec(),
        string_filter: b"StdCF".to_vec(),
        owner_password: password,
        user_password: password,
        permissions: Permissions::all(),
    };

    let state = EncryptionState::try_from(version).map_err(|e| Error::Encryption(e.to_string()))?;
    doc.encrypt(&state)
        .map_err(|e| Error::Encryption(e.to_string()))?;

    let mut staged = path.as_os_str().to_owned();
    staged.push(".encrypted");
    let staged = PathBuf::from(staged);

    doc.save(&staged)?;
    std::fs::remove_file(path)?;
    std::fs::rename(&staged, path)?;
    Ok(())
}

/// Builds PDF documents from acquired images.
#[derive(Debug, Clone)]
pub struct Assembler {
    base_dir: PathBuf,
    max_pages_per_file: usize,
    quality: Option<u8>,
    password: Option<String>,
}

impl Assembler {
    pub fn new(config: &Config) -> Self {
        Self {
            base_dir: config.base_dir.clone(),
            max_pages_per_file: config.max_pages_per_file,
            quality: config.recompress_quality(),
            password: config.encryption_password().map(str::to_string),
        }
    }

    /// Directory the documents of `work` are written to.
    pub fn output_dir(&self, work: &Work) -> PathBuf {
        self.base_dir.join(sanitize_filename(&work.id))
    }

    /// Writes the documents for `images`, in order, and returns their paths.
    ///
    /// Documents already present and larger than [`MIN_BUILT_SIZE`] are kept
    /// and returned without being rebuilt.
    ///
    /// # Errors
    ///
    /// * [`Error::NoImages`] - `images` is empty
    /// * [`Error::Assembly`] - writing or encrypting one file failed, or none
    ///   of its pages could be decoded
    pub async fn assemble(&self, work: &Work, images: &[AcquiredImage]) -> Result<Vec<PathBuf>> {
        if images.is_empty() {
            return Err(Error::NoImages);
        }

        let dir = self.output_dir(work);
        fs::create_dir_all(&dir).await?;

        let per_file = match self.max_pages_per_file {
            0 => images.len(),
            n => n,
        };
        let chunks: Vec<&[AcquiredImage]> = images.chunks(per_file).collect();
        let mut paths = Vec::with_capacity(chunks.len());

        for (index, chunk) in chunks.iter().enumerate() {
            let path = dir.join(chunk_file_name(&work.id, index, chunks.len()));

            if already_built(&path).await {
                tracing::info!(path = %path.display(), "document already built, skipping");
                paths.push(path);
                continue;
            }

            self.build_file(&path, chunk.to_vec())
                .await
                .map_err(|e| Error::assembly(&path, e))?;

            tracing::info!(
                work_id = %work.id,
                path = %path.display(),
                pages = chunk.len(),
                encrypted = self.password.is_some(),
                "document assembled"
            );
            paths.push(path);
        }

        Ok(paths)
    }

    async fn build_file(&self, path: &Path, images: Vec<AcquiredImage>) -> Result<()> {
        let path = path.to_path_buf();
        let quality = self.quality;
        let password = self.password.clone();

        tokio::task::spawn_blocking(move || {
            let prepared: Vec<Result<PreparedPage>> = images
                .par_iter()
                .map(|image| {
                    if image.data.is_empty() {
                        let data = std::fs::read(&image.path)?;
                        prepare_page(&data, quality)
                    } else {
                        prepare_page(&image.data, quality)
                    }
                })
                .collect();

            let mut pages = Vec::with_capacity(prepared.len());
            for (image, page) in images.iter().zip(prepared) {
                match page {
                    Ok(page) => pages.push(page),
                    Err(e) => tracing::warn!(
                        index = image.index,
                        file = %image.filename,
                        error = %e,
                        "skipping page that cannot be embedded"
                    ),
                }
            }

            if pages.is_empty() {
                return Err(Error::NoImages);
            }
            let skipped = images.len() - pages.len();
            if skipped > 0 {
                tracing::warn!(path = %path.display(), skipped, "document built with pages missing");
            }

            let mut doc = build_document(&pages)?;
            doc.save(&path)?;

            if let Some(password) = password.as_deref() {
                encrypt_in_place(&path, password)?;
            }
            Ok(())
        })
        .await?
    }

    /// Removes the generated documents of `work`, leaving the images in place.
    pub async fn cleanup(&self, work: &Work) -> Result<()> {
        let dir = self.output_dir(work);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("pdf")) {
                fs::remove_file(&path).await?;
            }
        }
        Ok(())
    }
}

async fn already_built(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .is_ok_and(|meta| meta.is_file() && meta.len() > MIN_BUILT_SIZE)
}
