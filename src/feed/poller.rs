//! Poll loop for feedwatch.
//!
//! The loop walks every registered source once per cycle, notifies new
//! entries, and sleeps. Failures of one source are logged and skipped; a
//! store failure aborts the cycle and puts the loop into a longer cooldown.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::detector::UpdateDetector;
use super::fetcher::FeedFetcher;
use super::registry::SourceRegistry;
use super::types::Source;
use crate::config::PollConfig;
use crate::db::KvStore;
use crate::notify::Notifier;
use crate::Result;

/// State of the poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Polling on the normal cadence.
    Running,
    /// Waiting out the cooldown after a failed cycle.
    Recovering,
}

/// Counters for one poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Sources enumerated.
    pub sources: usize,
    /// Sources skipped because of a source-scoped error.
    pub failed_sources: usize,
    /// New entries found across all sources.
    pub new_entries: usize,
    /// Notification batches delivered.
    pub notifications_sent: usize,
    /// Notification batches that could not be delivered.
    pub notifications_failed: usize,
}

/// Scheduler driving detection and notification for every source.
pub struct PollLoop {
    store: Arc<dyn KvStore>,
    fetcher: Arc<dyn FeedFetcher>,
    notifier: Notifier,
    interval: Duration,
    cooldown: Duration,
    state: LoopState,
}

impl PollLoop {
    /// Create a loop with the configured timing.
    pub fn new(
        store: Arc<dyn KvStore>,
        fetcher: Arc<dyn FeedFetcher>,
        notifier: Notifier,
        config: &PollConfig,
    ) -> Self {
        Self::with_intervals(
            store,
            fetcher,
            notifier,
            config.interval(),
            config.cooldown(),
        )
    }

    /// Create a loop with explicit timing.
    pub fn with_intervals(
        store: Arc<dyn KvStore>,
        fetcher: Arc<dyn FeedFetcher>,
        notifier: Notifier,
        interval: Duration,
        cooldown: Duration,
    ) -> Self {
        Self {
            store,
            fetcher,
            notifier,
            interval,
            cooldown,
            state: LoopState::Running,
        }
    }

    /// Current state.
    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Run until `shutdown` turns `true` or its sender is dropped.
    ///
    /// Shutdown is observed between cycles and during sleeps, never in the
    /// middle of a fetch.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Poll loop started (interval: {}s, cooldown: {}s)",
            self.interval.as_secs(),
            self.cooldown.as_secs()
        );

        while !*shutdown.borrow() {
            let delay = self.step().await;
            if sleep_or_shutdown(delay, &mut shutdown).await {
                break;
            }
        }

        info!("Poll loop stopped");
    }

    /// Run one cycle and return how long to sleep before the next one.
    ///
    /// A loop in `Recovering` first returns to `Running`; the cycle then
    /// decides the next state.
    pub async fn step(&mut self) -> Duration {
        if self.state == LoopState::Recovering {
            info!("Cooldown over, retrying from scratch");
            self.state = LoopState::Running;
        }

        match self.run_cycle().await {
            Ok(report) => {
                info!(
                    sources = report.sources,
                    failed = report.failed_sources,
                    new_entries = report.new_entries,
                    sent = report.notifications_sent,
                    undelivered = report.notifications_failed,
                    "Poll cycle complete"
                );
                self.interval
            }
            Err(e) => {
                error!(
                    "Poll cycle aborted: {}; cooling down for {}s",
                    e,
                    self.cooldown.as_secs()
                );
                self.state = LoopState::Recovering;
                self.cooldown
            }
        }
    }

    /// Poll every registered source once.
    ///
    /// Source-scoped errors are logged and counted. Only errors that make
    /// the whole cycle meaningless (the store going away) are returned.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let registry = SourceRegistry::new(self.store.as_ref());
        let sources = registry.list().await?;

        let mut report = CycleReport {
            sources: sources.len(),
            ..CycleReport::default()
        };
        debug!("Polling {} source(s)", sources.len());

        for source in &sources {
            match self.poll_source(&registry, source, &mut report).await {
                Ok(()) => {}
                Err(e) if e.is_cycle_fatal() => return Err(e),
                Err(e) => {
                    report.failed_sources += 1;
                    warn!("Skipping source {}: {}", source.name, e);
                }
            }
        }

        Ok(report)
    }

    async fn poll_source(
        &self,
        registry: &SourceRegistry<'_>,
        source: &Source,
        report: &mut CycleReport,
    ) -> Result<()> {
        debug!("Checking source {} ({})", source.name, source.url);

        let detector = UpdateDetector::new(self.store.as_ref(), self.fetcher.as_ref());
        let new_entries = detector.detect(source).await?;
        report.new_entries += new_entries.len();

        if new_entries.is_empty() {
            debug!("No new entries for {}", source.name);
        } else {
            // Entries are already marked seen; an undelivered batch is lost.
            match self.notifier.notify(&source.name, &new_entries).await {
                Ok(()) => report.notifications_sent += 1,
                Err(e) => {
                    report.notifications_failed += 1;
                    warn!(
                        "Failed to notify {} new entries from {}: {}",
                        new_entries.len(),
                        source.name,
                        e
                    );
                }
            }
        }

        registry.touch(&source.name, Utc::now()).await?;
        Ok(())
    }
}

/// Sleep for `delay` unless shutdown is requested first.
///
/// Returns `true` if the caller should stop.
pub async fn sleep_or_shutdown(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return false,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return true;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::feed::types::{FeedEntry, FetchedFeed};
    use crate::notify::Transport;
    use crate::{Database, FeedwatchError};

    struct FixedFetcher(FetchedFeed);

    #[async_trait]
    impl FeedFetcher for FixedFetcher {
        async fn fetch(&self, _url: &str) -> Result<FetchedFeed> {
            Ok(self.0.clone())
        }
    }

    #[derive(Default)]
    struct CountingTransport {
        subjects: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Transport for CountingTransport {
        async fn send(&self, subject: &str, _body: &str, _recipient: &str) -> Result<()> {
            self.subjects.lock().unwrap().push(subject.to_string());
            Ok(())
        }
    }

    async fn setup(
        feed: FetchedFeed,
    ) -> (Arc<Database>, Arc<CountingTransport>, PollLoop) {
        let db = Arc::new(Database::open_in_memory().await.unwrap());
        let source = Source::new("S", "https://example.com/feed.xml");
        db.set(
            crate::db::Table::Sources,
            "S",
            &serde_json::to_string(&source).unwrap(),
        )
        .await
        .unwrap();

        let transport = Arc::new(CountingTransport::default());
        let poll = PollLoop::with_intervals(
            db.clone(),
            Arc::new(FixedFetcher(feed)),
            Notifier::new(transport.clone(), "me@example.com"),
            Duration::from_millis(10),
            Duration::from_millis(50),
        );
        (db, transport, poll)
    }

    fn feed(ids: &[&str]) -> FetchedFeed {
        FetchedFeed::with_entries(ids.iter().map(|id| FeedEntry::new(*id).with_id(*id)).collect())
    }

    #[tokio::test]
    async fn test_cycle_notifies_then_goes_quiet() {
        let (_db, transport, poll) = setup(feed(&["a", "b"])).await;

        let first = poll.run_cycle().await.unwrap();
        assert_eq!(first.sources, 1);
        assert_eq!(first.new_entries, 2);
        assert_eq!(first.notifications_sent, 1);

        let second = poll.run_cycle().await.unwrap();
        assert_eq!(second.new_entries, 0);
        assert_eq!(second.notifications_sent, 0);

        assert_eq!(
            *transport.subjects.lock().unwrap(),
            vec!["RSS Updates from S".to_string()]
        );
    }

    #[tokio::test]
    async fn test_cycle_touches_source() {
        let (db, _transport, poll) = setup(feed(&["a"])).await;
        let before = SourceRegistry::new(db.as_ref())
            .get("S")
            .await
            .unwrap()
            .unwrap()
            .last_update;

        poll.run_cycle().await.unwrap();

        let after = SourceRegistry::new(db.as_ref())
            .get("S")
            .await
            .unwrap()
            .unwrap()
            .last_update;
        assert!(after >= before);
    }

    #[tokio::test]
    async fn test_step_enters_and_leaves_recovering() {
        let (db, _transport, mut poll) = setup(feed(&["a"])).await;

        assert_eq!(poll.step().await, Duration::from_millis(10));
        assert_eq!(poll.state(), LoopState::Running);

        db.close().await;
        assert_eq!(poll.step().await, Duration::from_millis(50));
        assert_eq!(poll.state(), LoopState::Recovering);

        // Still failing: back through Running into Recovering again.
        assert_eq!(poll.step().await, Duration::from_millis(50));
        assert_eq!(poll.state(), LoopState::Recovering);
    }

    #[tokio::test]
    async fn test_run_cycle_store_failure_is_returned() {
        let (db, _transport, poll) = setup(feed(&["a"])).await;
        db.close().await;

        let err = poll.run_cycle().await.unwrap_err();
        assert!(matches!(err, FeedwatchError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (_db, transport, poll) = setup(feed(&["a"])).await;
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(poll.run(rx));
        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("poll loop did not stop")
            .unwrap();
        assert_eq!(transport.subjects.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_run_does_not_start_when_already_shut_down() {
        let (_db, transport, poll) = setup(feed(&["a"])).await;
        let (_tx, rx) = watch::channel(true);

        poll.run(rx).await;
        assert!(transport.subjects.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sleep_or_shutdown() {
        let (tx, mut rx) = watch::channel(false);
        assert!(!sleep_or_shutdown(Duration::from_millis(1), &mut rx).await);

        drop(tx);
        assert!(sleep_or_shutdown(Duration::from_secs(60), &mut rx).await);
    }
}
