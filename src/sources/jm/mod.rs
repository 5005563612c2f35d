//! The JM comic site.
//!
//! [`JmSource`] owns everything that talks to the site: the HTTP clients,
//! the mirror list and the max-page cache. It is cheap to share behind an
//! `Arc` and every method takes `&self`.
//!
//! # Examples
//!
//! ```rust,no_run
//! use jmfetch::prelude::*;
//!
//! # async fn example() -> jmfetch::Result<()> {
//! let source = JmSource::new(&Config::default())?;
//!
//! // Refresh the mirror list before a long session.
//! let report = source.probe_mirrors().await;
//! source.update_mirrors(report.usable());
//!
//! let work = source.fetch_work("350234").await?;
//! for chapter in &work.chapters {
//!     println!("{}: {} pages", chapter.title, chapter.page_count());
//! }
//!
//! let pick = source.random_work("romance").await?;
//! println!("random pick: {} ({})", pick.title, pick.id);
//! # Ok(())
//! # }
//! ```

pub mod parse;

use async_trait::async_trait;
use bytes::Bytes;
use rand::Rng;

use crate::config::{Config, DEFAULT_MIRRORS};
use crate::error::{Error, Result};
use crate::mirror::{self, MirrorSet, ProbeReport};
use crate::net::{HttpClient, header_map};
use crate::search::{MaxPageCache, bisect_last_page};
use crate::source::Source;
use crate::types::{Chapter, Work, WorkSummary};

use self::parse::ChapterDefaults;

const PAGE_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,image/apng,*/*;q=0.8";
const IMAGE_ACCEPT: &str = "image/webp,image/apng,image/*,*/*;q=0.8";
const ACCEPT_LANGUAGE: &str = "zh-CN,zh;q=0.9,en;q=0.8";

/// Page count assumed by [`JmSource::random_work`] when estimation fails.
const RANDOM_FALLBACK_PAGES: u32 = 100;

/// Client for the JM comic site and its mirrors.
pub struct JmSource {
    /// Site pages: one attempt per mirror, failover does the rest
    page_client: HttpClient,
    /// Page images: bounded retry
    image_client: HttpClient,
    probe_client: HttpClient,
    discovery_client: HttpClient,
    mirrors: MirrorSet,
    max_pages: MaxPageCache,
    scheme: String,
    default_image_host: String,
    search_page_ceiling: u32,
    discovery_urls: Vec<String>,
}

impl JmSource {
    /// Builds the source from `config`.
    ///
    /// # Errors
    ///
    /// Fails only if the HTTP clients cannot be constructed.
    pub fn new(config: &Config) -> Result<Self> {
        let image_client = HttpClient::new("jm", config.request_timeout())?
            .with_rate_limit(config.request_delay_ms)
            .with_max_retries(config.max_retries)
            .with_header("Accept", PAGE_ACCEPT)
            .with_header("Accept-Language", ACCEPT_LANGUAGE);
        let page_client = image_client.clone().with_max_retries(0);

        let probe_client = HttpClient::for_probing("jm-probe", config.probe_timeout())?
            .with_header("Accept", PAGE_ACCEPT)
            .with_header("Accept-Language", ACCEPT_LANGUAGE);

        let discovery_timeout = config.probe_timeout().min(std::time::Duration::from_secs(5));
        let discovery_client = HttpClient::for_probing("jm-discovery", discovery_timeout)?;

        Ok(Self {
            page_client,
            image_client,
            probe_client,
            discovery_client,
            mirrors: MirrorSet::new(config.mirror_hosts()),
            max_pages: MaxPageCache::new(config.max_page_ttl()),
            scheme: config.scheme.clone(),
            default_image_host: config.default_image_host.clone(),
            search_page_ceiling: config.search_page_ceiling,
            discovery_urls: config.discovery_urls.clone(),
        })
    }

    fn site_url(&self, host: &str, path: &str) -> String {
        format!("{}://{}{}", self.scheme, host, path)
    }

    fn referer(&self, host: &str) -> String {
        self.site_url(host, "/")
    }

    async fn get_page(&self, host: &str, path: &str) -> Result<String> {
        let url = self.site_url(host, path);
        let referer = self.referer(host);
        tracing::debug!(%url, "fetching page");
        self.page_client
            .get_text_with(&url, &header_map(&[("Referer", referer.as_str())]))
            .await
    }

    /// Reads the album page and every chapter page of `id` from one mirror.
    ///
    /// Chapters that fail to load are skipped. A mirror on which none of
    /// them loads fails with [`Error::NoChaptersFound`], so the caller moves
    /// on to the next mirror.
    async fn load_work(&self, host: &str, id: &str) -> Result<Work> {
        let raw = self.get_page(host, &format!("/album/{}", id)).await?;
        let album = parse::parse_album(&raw, id);
        tracing::debug!(
            work_id = %id,
            host = %host,
            chapters = album.chapter_ids.len(),
            "album page parsed"
        );

        let defaults = ChapterDefaults {
            scheme: &self.scheme,
            image_host: &self.default_image_host,
            scramble_id: album.scramble_id.as_deref(),
        };

        let mut chapters = Vec::with_capacity(album.chapter_ids.len());
        for (position, chapter_id) in album.chapter_ids.iter().enumerate() {
            let raw = match self.get_page(host, &format!("/photo/{}", chapter_id)).await {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::warn!(work_id = %id, host = %host, chapter = %chapter_id, error = %e, "skipping chapter");
                    continue;
                }
            };

            let mut chapter = parse::parse_chapter(&raw, chapter_id, &defaults);
            chapter.title = format!("Chapter {}", position + 1);
            chapter.site_host = host.to_string();
            chapters.push(chapter);
        }

        if chapters.is_empty() {
            return Err(Error::NoChaptersFound(id.to_string()));
        }

        Ok(Work::new(id, album.title, album.author, album.tags, chapters))
    }

    /// Current mirror list, active host first.
    pub fn mirrors(&self) -> Vec<String> {
        self.mirrors.hosts()
    }

    /// Replaces the mirror list, typically with [`ProbeReport::usable`].
    /// An empty list restores the built-in mirrors.
    pub fn update_mirrors(&self, hosts: Vec<String>) {
        self.mirrors.replace(hosts);
    }

    /// Restores the built-in mirror list.
    pub fn reset_mirrors(&self) {
        self.mirrors.reset();
    }

    /// Checks every known and discoverable mirror in parallel.
    ///
    /// Candidates are the built-in mirrors, the current list and any host
    /// advertised on the discovery pages. The mirror list itself is left
    /// untouched; pass [`ProbeReport::usable`] to
    /// [`update_mirrors`](JmSource::update_mirrors) to apply the result.
    pub async fn probe_mirrors(&self) -> ProbeReport {
        let discovered = mirror::discover_hosts(&self.discovery_client, &self.discovery_urls).await;
        tracing::debug!(count = discovered.len(), "discovered mirror candidates");

        let candidates = mirror::merge_candidates([
            DEFAULT_MIRRORS.iter().map(|h| h.to_string()).collect(),
            self.mirrors.hosts(),
            discovered,
        ]);

        let report = mirror::probe_hosts(&self.probe_client, &self.scheme, candidates).await;
        tracing::info!(
            candidates = report.candidates.len(),
            usable = report.usable().len(),
            "mirror probe finished"
        );
        report
    }

    /// Estimates the number of search result pages for `query`.
    ///
    /// Returns `0` when the first page is empty; that answer is not cached.
    /// Otherwise bisects up to the configured ceiling, counting failed
    /// requests as empty pages, and caches the result.
    ///
    /// # Errors
    ///
    /// Only a failure to fetch the first page is reported.
    pub async fn estimate_max_page(&self, query: &str) -> Result<u32> {
        if let Some(cached) = self.max_pages.get(query) {
            tracing::debug!(query, cached, "max page cache hit");
            return Ok(cached);
        }

        if self.search_works(query, 1).await?.is_empty() {
            return Ok(0);
        }

        let last = bisect_last_page(self.search_page_ceiling, |page| async move {
            self.search_works(query, page)
                .await
                .map(|hits| !hits.is_empty())
                .unwrap_or(false)
        })
        .await;

        tracing::info!(query, last, "estimated max search page");
        self.max_pages.insert(query, last);
        Ok(last)
    }

    /// Picks a random work among the search results for `query`.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when neither a random page nor the first page
    /// has any results.
    pub async fn random_work(&self, query: &str) -> Result<WorkSummary> {
        let max_page = match self.estimate_max_page(query).await {
            Ok(pages) if pages > 0 => pages,
            _ => RANDOM_FALLBACK_PAGES,
        };

        let page = rand::thread_rng().gen_range(1..=max_page);
        let mut hits = self.search_works(query, page).await?;

        if hits.is_empty() {
            tracing::debug!(query, page, "random page empty, using first page");
            hits = self.search_works(query, 1).await?;
        }

        if hits.is_empty() {
            return Err(Error::not_found(format!("no works match '{}'", query)));
        }

        let pick = rand::thread_rng().gen_range(0..hits.len());
        Ok(hits.swap_remove(pick))
    }
}

#[async_trait]
impl Source for JmSource {
    fn id(&self) -> &'static str {
        "jm"
    }

    fn name(&self) -> &'static str {
        "JM Comic"
    }

    async fn fetch_work(&self, id: &str) -> Result<Work> {
        let hosts = self.mirrors.hosts();
        let (host, work) =
            mirror::failover(&hosts, |host| async move { self.load_work(&host, id).await })
                .await?;

        tracing::info!(
            work_id = %work.id,
            host = %host,
            chapters = work.chapters.len(),
            pages = work.total_pages,
            "work metadata loaded"
        );
        Ok(work)
    }

    async fn search_works(&self, query: &str, page: u32) -> Result<Vec<WorkSummary>> {
        let hosts = self.mirrors.hosts();
        let path = format!(
            "/search/photos?search_query={}&page={}",
            urlencoding::encode(query),
            page
        );

        let (_, raw) = mirror::failover(&hosts, |host| {
            let path = path.as_str();
            async move { self.get_page(&host, path).await }
        })
        .await?;

        Ok(parse::parse_search(&raw))
    }

    async fn fetch_image(&self, chapter: &Chapter, url: &str) -> Result<Bytes> {
        let host = if chapter.site_host.is_empty() {
            self.mirrors.active_base()
        } else {
            chapter.site_host.clone()
        };
        let referer = self.referer(&host);
        let headers = header_map(&[("Accept", IMAGE_ACCEPT), ("Referer", referer.as_str())]);
        self.image_client.get_with(url, &headers).await
    }
}
