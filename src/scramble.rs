//! Scramble resolution: how many horizontal strips a served image was cut into.
//!
//! The site cuts newer images into strips and serves them in reverse order.
//! Which images are affected, and into how many strips, depends on the
//! chapter id, the chapter's scramble marker and an MD5 digest of
//! `{chapter_id}{filename}`.
//!
//! ```rust
//! use jmfetch::scramble::segment_count;
//!
//! // Chapters older than their marker are served as-is.
//! assert_eq!(segment_count("220980", "100000", "00001.jpg"), 0);
//!
//! // Between the marker and the first hashed epoch every image uses 10 strips.
//! assert_eq!(segment_count("220980", "250000", "00001.jpg"), 10);
//! ```

/// Marker assumed when neither the chapter nor the album page names one.
pub const LEGACY_SCRAMBLE_ID: &str = "220980";

/// Chapters below this id use a fixed strip count.
pub const HASHED_EPOCH: u64 = 268_850;

/// Chapters at or above this id hash into 8 buckets instead of 10.
pub const NARROW_EPOCH: u64 = 421_926;

/// Strip count used between the scramble marker and [`HASHED_EPOCH`].
pub const FIXED_SEGMENTS: u32 = 10;

/// Number of strips image `filename` of chapter `chapter_id` was cut into.
///
/// `0` means the image is served unscrambled. Non-numeric ids count as `0`.
/// Hashed results are always even and fall in `2..=20`.
pub fn segment_count(scramble_id: &str, chapter_id: &str, filename: &str) -> u32 {
    let aid = parse_id(chapter_id);
    let marker = parse_id(scramble_id);

    if aid < marker {
        return 0;
    }
    if aid < HASHED_EPOCH {
        return FIXED_SEGMENTS;
    }

    let buckets = if aid >= NARROW_EPOCH { 8 } else { 10 };
    let digest = format!("{:x}", md5::compute(format!("{}{}", aid, filename)));
    let last = digest.bytes().last().map(u32::from).unwrap_or_default();

    (last % buckets) * 2 + 2
}

fn parse_id(value: &str) -> u64 {
    value.trim().parse().unwrap_or(0)
}
