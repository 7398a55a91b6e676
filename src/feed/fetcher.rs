//! Feed fetcher with security measures.
//!
//! This module fetches and parses RSS/Atom feeds with SSRF protection,
//! bounded timeouts and a response size limit.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use feed_rs::model::Link;
use feed_rs::parser;
use reqwest::redirect::Policy;
use reqwest::Client;
use tracing::debug;
use url::{Host, Url};

use super::types::{FeedEntry, FetchedFeed};
use crate::config::FetchConfig;
use crate::{FeedwatchError, Result};

/// User agent string for feed fetching.
const USER_AGENT: &str = "feedwatch/0.1 (+feed change notifier)";

/// Hostname suffixes that never point at a public feed.
const FORBIDDEN_SUFFIXES: &[&str] = &[
    ".local",
    ".localhost",
    ".internal",
    ".intranet",
    ".corp",
    ".home",
    ".lan",
];

/// Source of feed documents.
#[async_trait]
pub trait FeedFetcher: Send + Sync {
    /// Fetch the feed at `url`.
    ///
    /// Transport failures and non-success HTTP statuses are
    /// [`FeedwatchError::FetchFailed`]. A body that is not a feed is not an
    /// error; it comes back with [`FetchedFeed::parse_error`] set.
    async fn fetch(&self, url: &str) -> Result<FetchedFeed>;
}

/// HTTP feed fetcher.
pub struct HttpFetcher {
    client: Client,
    max_feed_size: u64,
    allow_private_hosts: bool,
}

impl HttpFetcher {
    /// Create a fetcher from configuration.
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .read_timeout(Duration::from_secs(config.read_timeout_secs))
            .timeout(Duration::from_secs(config.total_timeout_secs))
            .redirect(redirect_policy(config.max_redirects, config.allow_private_hosts))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FeedwatchError::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            max_feed_size: config.max_feed_size_bytes,
            allow_private_hosts: config.allow_private_hosts,
        })
    }

    fn too_large(&self, url: &str, size: u64) -> FeedwatchError {
        fetch_failed(
            url,
            format!(
                "feed too large: {} bytes (max {} bytes)",
                size, self.max_feed_size
            ),
        )
    }
}

#[async_trait]
impl FeedFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedFeed> {
        if !self.allow_private_hosts {
            validate_url(url).map_err(|e| fetch_failed(url, e.to_string()))?;
        }

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_failed(url, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(fetch_failed(url, format!("HTTP error: {status}")));
        }

        if let Some(content_length) = response.content_length() {
            if content_length > self.max_feed_size {
                return Err(self.too_large(url, content_length));
            }
        }

        // Content-Length may be absent or wrong; the cap applies while reading.
        let mut bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| fetch_failed(url, format!("failed to read response: {e}")))?
        {
            let size = (bytes.len() + chunk.len()) as u64;
            if size > self.max_feed_size {
                return Err(self.too_large(url, size));
            }
            bytes.extend_from_slice(&chunk);
        }

        debug!("Fetched {} bytes from {}", bytes.len(), url);
        Ok(parse_feed(&bytes))
    }
}

fn fetch_failed(url: &str, reason: impl Into<String>) -> FeedwatchError {
    FeedwatchError::FetchFailed {
        url: url.to_string(),
        reason: reason.into(),
    }
}

/// Redirect policy: at most `max_redirects` hops, each one checked like the
/// initial URL unless private hosts are allowed.
fn redirect_policy(max_redirects: usize, allow_private_hosts: bool) -> Policy {
    if allow_private_hosts {
        return Policy::limited(max_redirects);
    }
    Policy::custom(move |attempt| {
        let checked = check_redirect(attempt.url(), attempt.previous().len(), max_redirects);
        match checked {
            Ok(()) => attempt.follow(),
            Err(e) => attempt.error(e),
        }
    })
}

/// Check one redirect hop. `hops` is the number of URLs already visited.
fn check_redirect(target: &Url, hops: usize, max_redirects: usize) -> Result<()> {
    if hops > max_redirects {
        return Err(FeedwatchError::Validation(format!(
            "too many redirects (max {max_redirects})"
        )));
    }
    validate_target(target)
}

/// Validate a URL for SSRF protection.
///
/// Only http and https are accepted, and the host must not be a private,
/// loopback or otherwise local address or hostname.
pub fn validate_url(url: &str) -> Result<()> {
    let parsed =
        Url::parse(url).map_err(|e| FeedwatchError::Validation(format!("invalid URL: {e}")))?;
    validate_target(&parsed)
}

fn validate_target(parsed: &Url) -> Result<()> {
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(FeedwatchError::Validation(format!(
            "unsupported URL scheme: {}",
            parsed.scheme()
        )));
    }

    let ip = match parsed.host() {
        None => return Err(FeedwatchError::Validation("URL has no host".to_string())),
        Some(Host::Domain(domain)) => {
            if is_forbidden_hostname(domain) {
                return Err(FeedwatchError::Validation(format!(
                    "forbidden host: {domain}"
                )));
            }
            return Ok(());
        }
        Some(Host::Ipv4(v4)) => IpAddr::V4(v4),
        Some(Host::Ipv6(v6)) => IpAddr::V6(v6),
    };

    if is_private_ip(&ip) {
        return Err(FeedwatchError::Validation(format!(
            "private IP address not allowed: {ip}"
        )));
    }
    Ok(())
}

fn is_forbidden_hostname(host: &str) -> bool {
    let host = host.to_lowercase();
    host == "localhost" || FORBIDDEN_SUFFIXES.iter().any(|s| host.ends_with(s))
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                || v4.is_documentation()
        }
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                // fc00::/7 unique local
                || (first & 0xfe00) == 0xfc00
                // fe80::/10 link-local
                || (first & 0xffc0) == 0xfe80
        }
    }
}

/// Parse a feed document.
///
/// Entries without a native id come back with `id: None` so that identity
/// derivation can fall back to the link.
pub fn parse_feed(bytes: &[u8]) -> FetchedFeed {
    // Generated ids would hide whether the feed supplied one.
    let parser = parser::Builder::new()
        .id_generator(|_links, _title, _uri| String::new())
        .build();

    let feed = match parser.parse(bytes) {
        Ok(feed) => feed,
        Err(e) => return FetchedFeed::unparseable(format!("failed to parse feed: {e}")),
    };

    let entries = feed
        .entries
        .into_iter()
        .map(|entry| FeedEntry {
            id: Some(entry.id).filter(|id| !id.is_empty()),
            link: entry_link(&entry.links),
            title: entry
                .title
                .map(|t| t.content)
                .unwrap_or_else(|| "Untitled".to_string()),
            published: entry.published.or(entry.updated).map(|dt| dt.to_rfc3339()),
        })
        .collect();

    FetchedFeed {
        title: feed.title.map(|t| t.content),
        entries,
        parse_error: None,
    }
}

/// Article link: the `alternate` (or untyped) link, else the first one.
fn entry_link(links: &[Link]) -> Option<String> {
    links
        .iter()
        .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
        .or_else(|| links.first())
        .map(|l| l.href.clone())
}
