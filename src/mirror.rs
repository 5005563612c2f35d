//! Mirror resolution, failover and probing.
//!
//! [`MirrorSet`] holds the ordered candidate hosts; the first one is active.
//! It never touches the network itself. Callers that need a page from the
//! site go through [`failover`], which walks the candidates in order and
//! only fails once every one of them has failed.
//!
//! Probing is separate: [`probe_hosts`] checks a candidate list in parallel
//! and returns a [`ProbeReport`] whose [`usable`](ProbeReport::usable) hosts
//! can be fed back into [`MirrorSet::replace`].
//!
//! # Examples
//!
//! ```rust
//! use jmfetch::mirror::MirrorSet;
//!
//! let mirrors = MirrorSet::default();
//! assert_eq!(mirrors.active_base(), "18comic.vip");
//!
//! mirrors.replace(vec!["mirror.example".to_string()]);
//! assert_eq!(mirrors.active_base(), "mirror.example");
//!
//! mirrors.reset();
//! assert_eq!(mirrors.active_base(), "18comic.vip");
//! ```

use futures::future::join_all;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use reqwest::StatusCode;
use std::collections::BTreeMap;
use std::future::Future;

use crate::config::DEFAULT_MIRRORS;
use crate::error::{Error, Result};
use crate::net::HttpClient;

static DISCOVERED_HOST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?:https?://)?([a-zA-Z0-9][a-zA-Z0-9-]*\.(?:vip|org|me|work|xyz|monster|cc|net))",
    )
    .expect("valid host regex")
});

/// Ordered list of interchangeable site hosts.
#[derive(Debug)]
pub struct MirrorSet {
    hosts: RwLock<Vec<String>>,
}

impl Default for MirrorSet {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl MirrorSet {
    /// Creates a set from `hosts`, or from the built-in list when `hosts` is empty.
    pub fn new(hosts: Vec<String>) -> Self {
        Self {
            hosts: RwLock::new(Self::or_defaults(hosts)),
        }
    }

    fn or_defaults(hosts: Vec<String>) -> Vec<String> {
        let hosts: Vec<String> = hosts
            .into_iter()
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .collect();

        if hosts.is_empty() {
            DEFAULT_MIRRORS.iter().map(|h| h.to_string()).collect()
        } else {
            hosts
        }
    }

    /// The host tried first.
    pub fn active_base(&self) -> String {
        self.hosts.read().first().cloned().unwrap_or_default()
    }

    /// Snapshot of every candidate, in preference order.
    pub fn hosts(&self) -> Vec<String> {
        self.hosts.read().clone()
    }

    /// Replaces the candidate list wholesale. An empty list restores the defaults.
    pub fn replace(&self, hosts: Vec<String>) {
        let hosts = Self::or_defaults(hosts);
        tracing::info!(count = hosts.len(), active = %hosts[0], "mirror list replaced");
        *self.hosts.write() = hosts;
    }

    /// Restores the built-in list.
    pub fn reset(&self) {
        self.replace(Vec::new());
    }
}

/// Runs `fetch` against each host in order until one succeeds.
///
/// Returns the winning host together with its result so follow-up requests
/// can stay on the same mirror. Any error moves on to the next host.
///
/// # Errors
///
/// * [`Error::NotFound`] / [`Error::NoChaptersFound`] - every host answered
///   but had nothing usable; the last such error is returned as-is
/// * [`Error::AllMirrorsFailed`] - every host failed; `last` is the final error
pub async fn failover<T, F, Fut>(hosts: &[String], mut fetch: F) -> Result<(String, T)>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last = None;
    let mut all_absent = true;

    for host in hosts {
        match fetch(host.clone()).await {
            Ok(value) => return Ok((host.clone(), value)),
            Err(e) => {
                tracing::warn!(host = %host, error = %e, "mirror failed, trying next");
                all_absent &= e.is_absent();
                last = Some(e);
            }
        }
    }

    match last {
        None => Err(Error::Other("no mirrors configured".to_string())),
        Some(e) if all_absent => Err(e),
        Some(e) => Err(Error::AllMirrorsFailed {
            attempts: hosts.len(),
            last: Box::new(e),
        }),
    }
}

/// Outcome of probing one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MirrorStatus {
    /// Answered 200 or 302
    Usable(u16),
    /// Answered with any other status
    Rejected(u16),
    /// The request itself failed
    Unreachable(String),
}

impl MirrorStatus {
    pub fn is_usable(&self) -> bool {
        matches!(self, MirrorStatus::Usable(_))
    }

    fn from_status(status: StatusCode) -> Self {
        if status == StatusCode::OK || status == StatusCode::FOUND {
            MirrorStatus::Usable(status.as_u16())
        } else {
            MirrorStatus::Rejected(status.as_u16())
        }
    }
}

/// Result of a probe run over a candidate list.
#[derive(Debug, Clone, Default)]
pub struct ProbeReport {
    /// Hosts in the order they were considered
    pub candidates: Vec<String>,

    pub statuses: BTreeMap<String, MirrorStatus>,
}

impl ProbeReport {
    /// Usable hosts in candidate order.
    pub fn usable(&self) -> Vec<String> {
        self.candidates
            .iter()
            .filter(|host| self.statuses.get(*host).is_some_and(MirrorStatus::is_usable))
            .cloned()
            .collect()
    }
}

/// Joins candidate lists, keeping the first occurrence of each host.
pub fn merge_candidates<I>(lists: I) -> Vec<String>
where
    I: IntoIterator<Item = Vec<String>>,
{
    let mut merged: Vec<String> = Vec::new();
    for host in lists.into_iter().flatten() {
        let host = host.trim().to_string();
        if !host.is_empty() && !merged.contains(&host) {
            merged.push(host);
        }
    }
    merged
}

/// Hostnames advertised on a mirror directory page.
pub fn extract_hosts(text: &str) -> Vec<String> {
    let mut hosts: Vec<String> = Vec::new();
    for cap in DISCOVERED_HOST.captures_iter(text) {
        let host = cap[1].to_lowercase();
        if host.starts_with("jm365.work") || hosts.contains(&host) {
            continue;
        }
        hosts.push(host);
    }
    hosts
}

/// Fetches every discovery page and collects the hosts they advertise.
///
/// Pages that fail to load are skipped.
pub async fn discover_hosts(client: &HttpClient, urls: &[String]) -> Vec<String> {
    let pages = join_all(urls.iter().map(|url| async move {
        match client.get_text(url).await {
            Ok(text) => extract_hosts(&text),
            Err(e) => {
                tracing::debug!(%url, error = %e, "discovery page unavailable");
                Vec::new()
            }
        }
    }))
    .await;

    merge_candidates(pages)
}

/// Probes every candidate concurrently with one request each.
pub async fn probe_hosts(client: &HttpClient, scheme: &str, candidates: Vec<String>) -> ProbeReport {
    let results = join_all(candidates.iter().map(|host| async move {
        let url = format!("{}://{}/", scheme, host);
        let status = match client.status(&url).await {
            Ok(status) => MirrorStatus::from_status(status),
            Err(e) => MirrorStatus::Unreachable(e.to_string()),
        };
        tracing::debug!(host = %host, ?status, "probed mirror");
        (host.clone(), status)
    }))
    .await;

    ProbeReport {
        candidates,
        statuses: results.into_iter().collect(),
    }
}
