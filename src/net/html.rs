//! Markup helpers for the album, chapter and search pages.
//!
//! Thin wrappers over `scraper` CSS selection. Invalid selectors behave like
//! selectors that match nothing.
//!
//! # Examples
//!
//! ```rust
//! use jmfetch::net::html;
//!
//! let document = html::parse(r#"
//!     <h1 id="book-name">Sample Work</h1>
//!     <span itemprop="genre" data-type="tags"><a>tag-a</a><a>tag-b</a></span>
//! "#);
//!
//! assert_eq!(html::select_text(&document, "#book-name").as_deref(), Some("Sample Work"));
//! assert_eq!(
//!     html::select_all_text(&document, r#"span[data-type="tags"] a"#),
//!     vec!["tag-a", "tag-b"],
//! );
//! ```

use scraper::{Html, Selector};

/// Parses a full HTML document.
pub fn parse(html: &str) -> Html {
    Html::parse_document(html)
}

/// Trimmed text of the first element matching `selector`.
///
/// Returns `None` when nothing matches or the text is blank.
pub fn select_text(html: &Html, selector: &str) -> Option<String> {
    Selector::parse(selector).ok().and_then(|sel| {
        html.select(&sel)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|text| !text.is_empty())
    })
}

/// Trimmed, non-blank text of every element matching `selector`, in document order.
pub fn select_all_text(html: &Html, selector: &str) -> Vec<String> {
    Selector::parse(selector)
        .ok()
        .map(|sel| {
            html.select(&sel)
                .map(|el| el.text().collect::<String>().trim().to_string())
                .filter(|text| !text.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Text of the `<title>` element, cut before the first site-name separator.
///
/// Only separators after the first character count, so a title that starts
/// with a dash is kept whole.
pub fn page_title(html: &Html) -> Option<String> {
    let full = select_text(html, "title")?;
    let cut = [" - ", " | "]
        .iter()
        .filter_map(|sep| full.find(sep))
        .filter(|&idx| idx > 0)
        .min();

    let title = match cut {
        Some(idx) => full[..idx].trim().to_string(),
        None => full,
    };

    (!title.is_empty()).then_some(title)
}
