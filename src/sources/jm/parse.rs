//! Extraction strategies for album, chapter and search pages.
//!
//! Each field has an ordered list of strategies. A strategy is a plain
//! function from [`Markup`] to `Option<T>`; the first one that yields a value
//! wins. Nothing in here touches the network, so every pattern can be tested
//! against captured markup.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;

use crate::net::html;
use crate::scramble::LEGACY_SCRAMBLE_ID;
use crate::types::{Chapter, WorkSummary};

static SCRAMBLE_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"var\s+scramble_id\s*=\s*(\d+);").expect("valid regex"));

static CHAPTER_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"data-album="(\d+)"[^>]*>[\s\S]*?(?:第\s*\d+\s*[话話]|(?i:chapter)\s*\d+)"#)
        .expect("valid regex")
});

static BLANK_HOST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"src="https?://([^"/]+)/media/albums/blank"#).expect("valid regex"));

static PHOTO_HOST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"data-original="https?://([\w.:-]+)/media/photos/"#).expect("valid regex")
});

static PAGE_ARR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"var\s+page_arr\s*=\s*(\[.*?\]);").expect("valid regex"));

static PHOTO_FILE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"data-original="[^"]*?/media/photos/\d+/([^"?]+)"#).expect("valid regex")
});

static PAGE_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\.(?:jpg|jpeg|png|webp|gif)").expect("valid regex"));

static SEARCH_CARD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<a[^>]+href="/album/(\d+)"[^>]*>[\s\S]*?<span[^>]*>([^<]+)</span>"#)
        .expect("valid regex")
});

static SEARCH_LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/album/(\d+)[^>]*>[\s\S]*?<[^>]+>([^<]{3,})</").expect("valid regex")
});

/// A fetched page, kept both raw (for pattern scans) and parsed (for selectors).
pub struct Markup<'a> {
    pub raw: &'a str,
    pub document: Html,
}

impl<'a> Markup<'a> {
    pub fn new(raw: &'a str) -> Self {
        Self {
            raw,
            document: html::parse(raw),
        }
    }
}

/// One way of pulling a field out of a page.
pub type Strategy<T> = fn(&Markup<'_>) -> Option<T>;

/// Runs `strategies` in order and returns the first hit.
pub fn first_match<T>(markup: &Markup<'_>, strategies: &[Strategy<T>]) -> Option<T> {
    strategies.iter().find_map(|strategy| strategy(markup))
}

pub const TITLE: &[Strategy<String>] = &[title_from_heading, title_from_title_tag];
pub const AUTHOR: &[Strategy<String>] = &[author_from_link];
pub const TAGS: &[Strategy<Vec<String>>] = &[tags_from_genre_block];
pub const SCRAMBLE: &[Strategy<String>] = &[scramble_from_script];
pub const CHAPTER_IDS: &[Strategy<Vec<String>>] = &[chapter_ids_from_links];
pub const IMAGE_HOST: &[Strategy<String>] = &[host_from_blank_image, host_from_photo];
pub const FILENAMES: &[Strategy<Vec<String>>] = &[filenames_from_page_arr, filenames_from_photos];
pub const SEARCH: &[Strategy<Vec<WorkSummary>>] = &[search_from_cards, search_from_links];

pub fn title_from_heading(markup: &Markup<'_>) -> Option<String> {
    html::select_text(&markup.document, "#book-name")
}

pub fn title_from_title_tag(markup: &Markup<'_>) -> Option<String> {
    html::page_title(&markup.document)
}

pub fn author_from_link(markup: &Markup<'_>) -> Option<String> {
    html::select_text(
        &markup.document,
        r#"span[itemprop="author"][data-type="author"] a"#,
    )
    .and_then(|text| text.split_whitespace().next().map(str::to_string))
}

pub fn tags_from_genre_block(markup: &Markup<'_>) -> Option<Vec<String>> {
    let tags = dedupe(html::select_all_text(
        &markup.document,
        r#"span[itemprop="genre"][data-type="tags"] a"#,
    ));
    (!tags.is_empty()).then_some(tags)
}

pub fn scramble_from_script(markup: &Markup<'_>) -> Option<String> {
    SCRAMBLE_ID
        .captures(markup.raw)
        .map(|cap| cap[1].to_string())
}

pub fn chapter_ids_from_links(markup: &Markup<'_>) -> Option<Vec<String>> {
    let ids = dedupe(
        CHAPTER_LINK
            .captures_iter(markup.raw)
            .map(|cap| cap[1].to_string())
            .collect(),
    );
    (!ids.is_empty()).then_some(ids)
}

pub fn host_from_blank_image(markup: &Markup<'_>) -> Option<String> {
    BLANK_HOST.captures(markup.raw).map(|cap| cap[1].to_string())
}

pub fn host_from_photo(markup: &Markup<'_>) -> Option<String> {
    PHOTO_HOST.captures(markup.raw).map(|cap| cap[1].to_string())
}

pub fn filenames_from_page_arr(markup: &Markup<'_>) -> Option<Vec<String>> {
    let array = PAGE_ARR.captures(markup.raw)?;
    let names: Vec<String> = serde_json::from_str(&array[1]).ok()?;
    (!names.is_empty()).then_some(names)
}

pub fn filenames_from_photos(markup: &Markup<'_>) -> Option<Vec<String>> {
    let names = dedupe(
        PHOTO_FILE
            .captures_iter(markup.raw)
            .map(|cap| cap[1].to_string())
            .collect(),
    );
    (!names.is_empty()).then_some(names)
}

pub fn search_from_cards(markup: &Markup<'_>) -> Option<Vec<WorkSummary>> {
    collect_hits(&SEARCH_CARD, markup.raw, 1)
}

pub fn search_from_links(markup: &Markup<'_>) -> Option<Vec<WorkSummary>> {
    collect_hits(&SEARCH_LINK, markup.raw, 2)
}

fn collect_hits(pattern: &Regex, raw: &str, min_len: usize) -> Option<Vec<WorkSummary>> {
    let mut hits: Vec<WorkSummary> = Vec::new();
    for cap in pattern.captures_iter(raw) {
        let id = cap[1].to_string();
        let title = cap[2].trim().to_string();
        if title.len() > min_len && !hits.iter().any(|hit| hit.id == id) {
            hits.push(WorkSummary { id, title });
        }
    }
    (!hits.is_empty()).then_some(hits)
}

fn dedupe(values: Vec<String>) -> Vec<String> {
    let mut unique: Vec<String> = Vec::with_capacity(values.len());
    for value in values {
        if !unique.contains(&value) {
            unique.push(value);
        }
    }
    unique
}

/// Page number embedded right before a filename's extension, `0` when absent.
pub fn page_number(filename: &str) -> u64 {
    PAGE_NUMBER
        .captures(filename)
        .and_then(|cap| cap[1].parse().ok())
        .unwrap_or(0)
}

/// Sorts filenames by embedded page number, keeping scan order for ties.
pub fn sort_by_page_number(filenames: &mut [String]) {
    filenames.sort_by_key(|name| page_number(name));
}

/// Sorts chapter ids numerically. Non-numeric ids sort first.
pub fn sort_chapter_ids(ids: &mut [String]) {
    ids.sort_by_key(|id| id.parse::<u64>().unwrap_or(0));
}

/// Fields read from an album detail page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumPage {
    pub title: String,
    pub author: String,
    pub tags: Vec<String>,

    /// Album-level scramble marker, used when a chapter page names none
    pub scramble_id: Option<String>,

    /// Chapter ids in ascending numeric order; the album id itself for
    /// single-chapter works
    pub chapter_ids: Vec<String>,
}

/// Reads an album detail page.
pub fn parse_album(raw: &str, work_id: &str) -> AlbumPage {
    let markup = Markup::new(raw);

    let mut chapter_ids =
        first_match(&markup, CHAPTER_IDS).unwrap_or_else(|| vec![work_id.to_string()]);
    sort_chapter_ids(&mut chapter_ids);

    AlbumPage {
        title: first_match(&markup, TITLE).unwrap_or_else(|| format!("Comic {}", work_id)),
        author: first_match(&markup, AUTHOR).unwrap_or_default(),
        tags: first_match(&markup, TAGS).unwrap_or_default(),
        scramble_id: first_match(&markup, SCRAMBLE),
        chapter_ids,
    }
}

/// Where chapter image URLs point when the page does not say.
#[derive(Debug, Clone)]
pub struct ChapterDefaults<'a> {
    pub scheme: &'a str,
    pub image_host: &'a str,
    pub scramble_id: Option<&'a str>,
}

/// Reads a chapter page into a [`Chapter`] with its ordered image URLs.
///
/// The title and site host are left empty; the caller fills them in once it
/// knows which chapters loaded and from which mirror.
pub fn parse_chapter(raw: &str, chapter_id: &str, defaults: &ChapterDefaults<'_>) -> Chapter {
    let markup = Markup::new(raw);

    let scramble_id = first_match(&markup, SCRAMBLE)
        .or_else(|| defaults.scramble_id.map(str::to_string))
        .unwrap_or_else(|| LEGACY_SCRAMBLE_ID.to_string());

    let image_host =
        first_match(&markup, IMAGE_HOST).unwrap_or_else(|| defaults.image_host.to_string());

    let mut filenames = first_match(&markup, FILENAMES).unwrap_or_default();
    sort_by_page_number(&mut filenames);

    let image_urls = filenames
        .iter()
        .map(|name| {
            format!(
                "{}://{}/media/photos/{}/{}",
                defaults.scheme, image_host, chapter_id, name
            )
        })
        .collect();

    Chapter {
        id: chapter_id.to_string(),
        title: String::new(),
        scramble_id,
        filenames,
        image_urls,
        image_host,
        site_host: String::new(),
    }
}

/// Reads a search result page.
pub fn parse_search(raw: &str) -> Vec<WorkSummary> {
    first_match(&Markup::new(raw), SEARCH).unwrap_or_default()
}
