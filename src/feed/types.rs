//! Feed types for feedwatch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    /// Feed URL.
    pub url: String,
    /// Unique display name, also the registry key.
    pub name: String,
    /// Last successful poll.
    pub last_update: DateTime<Utc>,
}

impl Source {
    /// Create a source polled just now.
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            name: name.into(),
            last_update: Utc::now(),
        }
    }
}

/// One entry as returned by the fetcher.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedEntry {
    /// Native unique id (RSS guid / Atom id), if the feed provides one.
    pub id: Option<String>,
    /// Link to the article.
    pub link: Option<String>,
    /// Entry title.
    pub title: String,
    /// Publication date as text.
    pub published: Option<String>,
}

impl FeedEntry {
    /// Create an entry with only a title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Set the native id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the link.
    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    /// Set the publication date.
    pub fn with_published(mut self, published: impl Into<String>) -> Self {
        self.published = Some(published.into());
        self
    }
}

/// Result of one fetch.
#[derive(Debug, Clone, Default)]
pub struct FetchedFeed {
    /// Feed title, when the document could be parsed.
    pub title: Option<String>,
    /// Entries in document order.
    pub entries: Vec<FeedEntry>,
    /// Set when the body was fetched but could not be parsed; `entries` is
    /// then empty.
    pub parse_error: Option<String>,
}

impl FetchedFeed {
    /// A parsed feed.
    pub fn with_entries(entries: Vec<FeedEntry>) -> Self {
        Self {
            title: None,
            entries,
            parse_error: None,
        }
    }

    /// A body that could not be parsed.
    pub fn unparseable(reason: impl Into<String>) -> Self {
        Self {
            title: None,
            entries: Vec::new(),
            parse_error: Some(reason.into()),
        }
    }
}

/// Stored payload of a seen entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPayload {
    /// Entry title.
    pub title: String,
    /// Link to the article (empty if the feed gave none).
    pub link: String,
    /// Publication date (empty if absent).
    pub published: String,
    /// Owning source name.
    pub source: String,
}

impl EntryPayload {
    /// Build the payload for an entry of `source_name`.
    pub fn from_feed_entry(source_name: &str, entry: &FeedEntry) -> Self {
        Self {
            title: entry.title.clone(),
            link: entry.link.clone().unwrap_or_default(),
            published: entry.published.clone().unwrap_or_default(),
            source: source_name.to_string(),
        }
    }
}

/// A newly discovered entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Source-qualified identity.
    pub identity: String,
    /// Stored payload.
    pub payload: EntryPayload,
}
