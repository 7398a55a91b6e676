//! feedwatch - feed change notifier
//!
//! Polls RSS/Atom feeds, remembers every entry it has seen in a SQLite store,
//! and sends one notification per batch of new entries.

pub mod config;
pub mod db;
pub mod error;
pub mod feed;
pub mod logging;
pub mod notify;

pub use config::Config;
pub use db::{Database, KvStore, Table};
pub use error::{FeedwatchError, Result};
pub use feed::{
    entry_identity, register_sources, CycleReport, Entry, EntryPayload, FeedEntry, FeedFetcher,
    FetchedFeed, HttpFetcher, LoopState, PollLoop, SeenStore, Source, SourceRegistry,
    UpdateDetector,
};
pub use notify::{LogTransport, Notifier, SmtpMailer, Transport};
