//! Image reconstruction: puts the horizontal strips of a scrambled page back
//! in their original order.
//!
//! A page of height `H` cut into `n` strips has `base = H / n` rows per
//! strip. The top strip of the original also carries the `H % n` leftover
//! rows. The site serves the strips bottom-to-top, so the original top strip
//! sits at the bottom of the served image.
//!
//! [`reconstruct`] never fails: unscrambled or undecodable input is returned
//! as-is. [`try_reconstruct`] exposes the underlying outcome for callers that
//! want to tell the cases apart.
//!
//! ```rust
//! use image::{Rgb, RgbImage};
//! use jmfetch::reconstruct::{scramble_pixels, unscramble_pixels};
//!
//! let original = RgbImage::from_fn(4, 23, |_, y| Rgb([y as u8, 0, 0]));
//! let served = scramble_pixels(&original, 6);
//! assert_eq!(unscramble_pixels(&served, 6), original);
//! ```

use image::{ImageFormat, RgbImage, codecs::jpeg::JpegEncoder};

use crate::error::Result;

/// JPEG quality used when re-encoding a reconstructed page.
pub const OUTPUT_QUALITY: u8 = 95;

/// One strip move: `height` rows read from `src_y` in the served image land
/// at `dst_y` in the original.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StripMove {
    pub src_y: u32,
    pub dst_y: u32,
    pub height: u32,
}

/// Strip moves for an image of `height` rows cut into `segments` strips.
///
/// Zero-height strips are left out, so a page shorter than `segments` rows
/// collapses into a single identity move.
pub fn strip_layout(height: u32, segments: u32) -> Vec<StripMove> {
    if segments == 0 || height == 0 {
        return Vec::new();
    }

    let base = height / segments;
    let rem = height % segments;

    (0..segments)
        .map(|i| {
            if i == 0 {
                StripMove {
                    src_y: height - base - rem,
                    dst_y: 0,
                    height: base + rem,
                }
            } else {
                StripMove {
                    src_y: height - rem - (i + 1) * base,
                    dst_y: i * base + rem,
                    height: base,
                }
            }
        })
        .filter(|m| m.height > 0)
        .collect()
}

/// Restores the original image from a served one.
pub fn unscramble_pixels(served: &RgbImage, segments: u32) -> RgbImage {
    apply_moves(served, segments, |m| (m.src_y, m.dst_y))
}

/// Cuts an original image into strips the way the site serves it.
pub fn scramble_pixels(original: &RgbImage, segments: u32) -> RgbImage {
    apply_moves(original, segments, |m| (m.dst_y, m.src_y))
}

fn apply_moves(
    input: &RgbImage,
    segments: u32,
    endpoints: impl Fn(&StripMove) -> (u32, u32),
) -> RgbImage {
    let (width, height) = input.dimensions();
    let stride = width as usize * 3;
    let mut output = RgbImage::new(width, height);
    let src: &[u8] = input.as_raw();

    {
        let dst: &mut [u8] = &mut output;
        for strip in strip_layout(height, segments) {
            let (from, to) = endpoints(&strip);
            let len = strip.height as usize * stride;
            let from = from as usize * stride;
            let to = to as usize * stride;
            dst[to..to + len].copy_from_slice(&src[from..from + len]);
        }
    }

    output
}

/// Reconstructs `bytes`, reporting why nothing was done.
///
/// Returns `Ok(None)` when `segments` is `0` or `1` and the image needs no work.
///
/// # Errors
///
/// Returns [`Error::Image`](crate::Error::Image) when the bytes do not decode
/// or the result cannot be encoded.
pub fn try_reconstruct(bytes: &[u8], segments: u32) -> Result<Option<Vec<u8>>> {
    if segments <= 1 {
        return Ok(None);
    }

    let served = image::load_from_memory(bytes)?.to_rgb8();
    let original = unscramble_pixels(&served, segments);

    Ok(Some(encode_jpeg(&original, OUTPUT_QUALITY)?))
}

/// Reconstructs `bytes`, falling back to the input on any failure.
pub fn reconstruct(bytes: &[u8], segments: u32) -> Vec<u8> {
    match try_reconstruct(bytes, segments) {
        Ok(Some(rebuilt)) => rebuilt,
        Ok(None) => bytes.to_vec(),
        Err(e) => {
            tracing::warn!(segments, error = %e, "reconstruction failed, keeping served image");
            bytes.to_vec()
        }
    }
}

/// Encodes an RGB image as baseline JPEG.
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100)).encode_image(image)?;
    Ok(buf)
}

/// Whether `bytes` start with a JPEG signature.
pub fn is_jpeg(bytes: &[u8]) -> bool {
    image::guess_format(bytes).is_ok_and(|f| f == ImageFormat::Jpeg)
}
