//! Feed fetching and first-pass filtering.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::error::{PipelineError, PipelineResult};
use crate::fingerprint::{Fingerprint, FingerprintStore};
use crate::models::{FeedSource, RawItem};
use crate::util::{collapse_whitespace, truncate_chars};

/// Upper bound on excerpt length handed to the summarizer.
pub const EXCERPT_MAX_CHARS: usize = 500;
pub const DEFAULT_MAX_ENTRIES: usize = 5;
const UNTITLED: &str = "Untitled";

/// The publishers the news summarizer follows.
pub fn default_feed_sources() -> Vec<FeedSource> {
    vec![
        FeedSource::new(
            "https://feeds.feedburner.com/TheHackersNews",
            "The Hacker News",
            "cybersecurity",
            "https://thehackernews.com",
        ),
        FeedSource::new(
            "https://www.bleepingcomputer.com/feed/",
            "Bleeping Computer",
            "cybersecurity",
            "https://www.bleepingcomputer.com",
        ),
        FeedSource::new(
            "https://www.darkreading.com/rss.xml",
            "Dark Reading",
            "cybersecurity",
            "https://www.darkreading.com",
        ),
        FeedSource::new(
            "https://www.csoonline.com/index.rss",
            "CSO Online",
            "cybersecurity",
            "https://www.csoonline.com",
        ),
        FeedSource::new(
            "https://securityaffairs.com/feed",
            "Security Affairs",
            "cybersecurity",
            "https://securityaffairs.com",
        ),
        FeedSource::new(
            "https://www.schneier.com/blog/atom.xml",
            "Schneier on Security",
            "cybersecurity",
            "https://www.schneier.com",
        ),
        FeedSource::new(
            "https://www.techradar.com/rss/news",
            "TechRadar",
            "technology",
            "https://www.techradar.com",
        ),
        FeedSource::new(
            "https://venturebeat.com/category/ai/feed/",
            "VentureBeat AI",
            "ai",
            "https://venturebeat.com",
        ),
        FeedSource::new(
            "https://www.makeuseof.com/tag/automation/feed/",
            "MakeUseOf Automation",
            "automation",
            "https://www.makeuseof.com",
        ),
    ]
}

/// Byte transport for feed documents.
#[async_trait]
pub trait FeedTransport: Send + Sync {
    async fn get(&self, url: &str) -> PipelineResult<Vec<u8>>;
}

pub struct HttpFeedTransport {
    client: Client,
}

impl HttpFeedTransport {
    pub fn new() -> PipelineResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent("Mozilla/5.0 (compatible; ContentAutomation/1.0)")
            .build()
            .map_err(|e| PipelineError::source_unavailable("http client", e))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl FeedTransport for HttpFeedTransport {
    async fn get(&self, url: &str) -> PipelineResult<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PipelineError::source_unavailable(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::source_unavailable(
                url,
                format!("HTTP error: {status}"),
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| PipelineError::source_unavailable(url, e))?;
        Ok(bytes.to_vec())
    }
}

pub struct FeedIngestor {
    transport: Arc<dyn FeedTransport>,
}

impl FeedIngestor {
    pub fn new(transport: Arc<dyn FeedTransport>) -> Self {
        Self { transport }
    }

    pub fn over_http() -> PipelineResult<Self> {
        Ok(Self::new(Arc::new(HttpFeedTransport::new()?)))
    }

    /// Fetch one source and return its unseen items in feed order.
    pub async fn try_fetch(
        &self,
        source: &FeedSource,
        max_entries: usize,
        known: &FingerprintStore,
    ) -> PipelineResult<Vec<RawItem>> {
        let bytes = self
            .transport
            .get(&source.endpoint)
            .await
            .map_err(|e| match e {
                PipelineError::SourceUnavailable { reason, .. } => {
                    PipelineError::source_unavailable(&source.name, reason)
                }
                other => other,
            })?;

        let items = extract_items(&bytes, &source.name, max_entries, known)?;
        info!(source = %source.name, count = items.len(), "feeds: new items");
        Ok(items)
    }

    /// Like [`try_fetch`](Self::try_fetch) but a failing source yields no
    /// items instead of an error.
    pub async fn fetch(
        &self,
        source: &FeedSource,
        max_entries: usize,
        known: &FingerprintStore,
    ) -> Vec<RawItem> {
        match self.try_fetch(source, max_entries, known).await {
            Ok(items) => items,
            Err(e) => {
                warn!(source = %source.name, error = %e, "feeds: skipping source");
                Vec::new()
            }
        }
    }
}

/// Parse a feed document, keep the first `max_entries` entries and drop
/// the ones whose url fingerprint is already known. A link listed twice
/// is kept once, at its first position.
pub fn extract_items(
    bytes: &[u8],
    source_name: &str,
    max_entries: usize,
    known: &FingerprintStore,
) -> PipelineResult<Vec<RawItem>> {
    let feed = feed_rs::parser::parse(bytes)
        .map_err(|e| PipelineError::source_unavailable(source_name, format!("malformed feed: {e}")))?;

    let mut items = Vec::new();
    let mut seen = HashSet::new();
    for entry in feed.entries.into_iter().take(max_entries) {
        let url = entry
            .links
            .first()
            .map(|l| l.href.trim().to_string())
            .or_else(|| entry.id.starts_with("http").then(|| entry.id.clone()));
        let Some(url) = url.filter(|u| !u.is_empty()) else {
            debug!(source = source_name, "feeds: entry without link");
            continue;
        };

        let fingerprint = Fingerprint::of_url(&url);
        if known.has(&fingerprint) || !seen.insert(fingerprint.clone()) {
            continue;
        }

        let title = entry
            .title
            .map(|t| collapse_whitespace(&t.content))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| UNTITLED.to_string());

        let raw_excerpt = entry
            .summary
            .map(|s| s.content)
            .or_else(|| entry.content.and_then(|c| c.body))
            .unwrap_or_default();

        items.push(RawItem {
            title,
            url,
            published: entry.published.or(entry.updated),
            excerpt: clean_excerpt(&raw_excerpt),
            fingerprint,
        });
    }

    Ok(items)
}

/// Plain-text excerpt capped at [`EXCERPT_MAX_CHARS`].
pub fn clean_excerpt(raw: &str) -> String {
    let text = if raw.contains('<') {
        html2text::from_read(raw.as_bytes(), 10_000)
    } else {
        raw.to_string()
    };
    truncate_chars(&collapse_whitespace(&text), EXCERPT_MAX_CHARS).to_string()
}
