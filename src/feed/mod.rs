//! Feed change detection for feedwatch.
//!
//! This module registers feeds, detects entries that were not seen before,
//! and drives polling on a schedule.

pub mod detector;
pub mod fetcher;
pub mod identity;
pub mod poller;
pub mod registry;
pub mod seen;
pub mod types;

pub use detector::UpdateDetector;
pub use fetcher::{parse_feed, validate_url, FeedFetcher, HttpFetcher};
pub use identity::entry_identity;
pub use poller::{sleep_or_shutdown, CycleReport, LoopState, PollLoop};
pub use registry::{register_sources, Registration, SourceRegistry};
pub use seen::SeenStore;
pub use types::{Entry, EntryPayload, FeedEntry, FetchedFeed, Source};
