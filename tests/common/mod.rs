//! Test helpers for poll loop tests.
//!
//! Provides a scripted fetcher, a recording transport and a store wrapper
//! that can simulate a crash or an unreachable database.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use feedwatch::{
    Database, FeedEntry, FeedFetcher, FeedwatchError, FetchedFeed, KvStore, Notifier, PollLoop,
    Result, Table, Transport,
};

/// Recipient used by every test notifier.
pub const RECIPIENT: &str = "me@example.com";

/// One scripted fetch result.
#[derive(Debug, Clone)]
pub enum Reply {
    /// The feed returns these entries.
    Feed(Vec<FeedEntry>),
    /// The server answers with a non-success status.
    Status(u16),
    /// The body is not a feed.
    Garbage,
}

/// Fetcher replaying a script per URL.
///
/// Each fetch consumes the next reply; the last reply repeats forever.
#[derive(Default)]
pub struct ScriptedFetcher {
    scripts: Mutex<HashMap<String, VecDeque<Reply>>>,
}

impl ScriptedFetcher {
    /// Append replies for `url`.
    pub fn script(&self, url: &str, replies: impl IntoIterator<Item = Reply>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .extend(replies);
    }

    /// Replace the script for `url` with a single repeating reply.
    pub fn serve(&self, url: &str, reply: Reply) {
        self.scripts
            .lock()
            .unwrap()
            .insert(url.to_string(), VecDeque::from([reply]));
    }
}

#[async_trait]
impl FeedFetcher for ScriptedFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedFeed> {
        let reply = {
            let mut scripts = self.scripts.lock().unwrap();
            let queue = scripts.get_mut(url);
            match queue {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        match reply {
            Some(Reply::Feed(entries)) => Ok(FetchedFeed::with_entries(entries)),
            Some(Reply::Garbage) => Ok(FetchedFeed::unparseable("no root element")),
            Some(Reply::Status(code)) => Err(FeedwatchError::FetchFailed {
                url: url.to_string(),
                reason: format!("HTTP error: {code}"),
            }),
            None => Err(FeedwatchError::FetchFailed {
                url: url.to_string(),
                reason: "HTTP error: 404".to_string(),
            }),
        }
    }
}

/// A delivered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    pub subject: String,
    pub body: String,
    pub recipient: String,
}

impl Sent {
    /// Titles listed in the body, in order.
    pub fn titles(&self) -> Vec<String> {
        self.body
            .lines()
            .filter_map(|line| line.strip_prefix("Title: "))
            .map(str::to_string)
            .collect()
    }
}

/// Transport recording every message; can be switched to fail.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Sent>>,
    failing: AtomicBool,
}

impl RecordingTransport {
    /// Make every following send fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Messages delivered so far.
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    /// Every title delivered so far, across all messages.
    pub fn all_titles(&self) -> Vec<String> {
        self.sent().iter().flat_map(Sent::titles).collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, subject: &str, body: &str, recipient: &str) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(FeedwatchError::Delivery("connection reset".to_string()));
        }
        self.sent.lock().unwrap().push(Sent {
            subject: subject.to_string(),
            body: body.to_string(),
            recipient: recipient.to_string(),
        });
        Ok(())
    }
}

/// Store wrapper injecting failures.
pub struct FaultyStore {
    inner: Database,
    offline: AtomicBool,
    entry_write_budget: Mutex<Option<usize>>,
}

impl FaultyStore {
    /// Wrap a database; no faults are active.
    pub fn new(inner: Database) -> Self {
        Self {
            inner,
            offline: AtomicBool::new(false),
            entry_write_budget: Mutex::new(None),
        }
    }

    /// Let `n` more entry writes succeed, then fail every following one.
    pub fn crash_after_entry_writes(&self, n: usize) {
        *self.entry_write_budget.lock().unwrap() = Some(n);
    }

    /// Fail every operation (or recover).
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Clear every fault.
    pub fn heal(&self) {
        self.set_offline(false);
        *self.entry_write_budget.lock().unwrap() = None;
    }

    /// The wrapped database.
    pub fn inner(&self) -> &Database {
        &self.inner
    }

    fn check_online(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(FeedwatchError::StoreUnavailable(
                "simulated outage".to_string(),
            ));
        }
        Ok(())
    }

    fn spend_entry_write(&self, table: Table) -> Result<()> {
        if table != Table::Entries {
            return Ok(());
        }
        let mut budget = self.entry_write_budget.lock().unwrap();
        match budget.as_mut() {
            Some(0) => Err(FeedwatchError::StoreUnavailable(
                "simulated crash".to_string(),
            )),
            Some(left) => {
                *left -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl KvStore for FaultyStore {
    async fn get_all(&self, table: Table) -> Result<Vec<(String, String)>> {
        self.check_online()?;
        self.inner.get_all(table).await
    }

    async fn get(&self, table: Table, key: &str) -> Result<Option<String>> {
        self.check_online()?;
        self.inner.get(table, key).await
    }

    async fn exists(&self, table: Table, key: &str) -> Result<bool> {
        self.check_online()?;
        self.inner.exists(table, key).await
    }

    async fn set(&self, table: Table, key: &str, value: &str) -> Result<()> {
        self.check_online()?;
        self.spend_entry_write(table)?;
        self.inner.set(table, key, value).await
    }

    async fn set_if_absent(&self, table: Table, key: &str, value: &str) -> Result<bool> {
        self.check_online()?;
        self.spend_entry_write(table)?;
        self.inner.set_if_absent(table, key, value).await
    }
}

/// Entry with a native id; the title equals the id.
pub fn entry(id: &str) -> FeedEntry {
    FeedEntry::new(id)
        .with_id(id)
        .with_link(format!("https://example.com/{id}"))
}

/// Feed reply listing entries `ids`.
pub fn feed(ids: &[&str]) -> Reply {
    Reply::Feed(ids.iter().map(|id| entry(id)).collect())
}

/// Poll loop with short timings over the given collaborators.
pub fn poll_loop(
    store: Arc<dyn KvStore>,
    fetcher: Arc<ScriptedFetcher>,
    transport: Arc<RecordingTransport>,
) -> PollLoop {
    PollLoop::with_intervals(
        store,
        fetcher,
        Notifier::new(transport, RECIPIENT),
        Duration::from_millis(10),
        Duration::from_millis(40),
    )
}
