//! The coordination-store contract and an in-memory implementation.
//!
//! The dispatch core only needs four operations from the store: the current
//! revision, a file walk at a revision, a point read, and a blocking wait
//! for the next event at or after a revision. Any consistent key-value +
//! watch service can sit behind [`CoordinationStore`].
//!
//! [`MemoryStore`] is a revisioned in-memory implementation backed by an
//! event log, used by the integration tests and local development.

use crate::error::{ClientError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::broadcast;

/// One mutation observed in the store.
#[derive(Debug, Clone)]
pub struct StoreEvent {
    pub path: String,
    pub rev: u64,
    pub body: Bytes,
}

/// The consumed slice of a coordination store.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// The store's current revision.
    async fn current_revision(&self) -> Result<u64>;

    /// Enumerate file paths under `path` as of revision `rev`.
    async fn walk(&self, rev: u64, path: &str) -> Result<Vec<String>>;

    /// Read the body of `path` as of revision `rev`.
    async fn get(&self, path: &str, rev: u64) -> Result<Bytes>;

    /// Block until an event at revision >= `rev` matches `pattern`, then
    /// return it. Patterns are a literal path, optionally ending in `/**`
    /// to match the whole subtree.
    async fn wait(&self, pattern: &str, rev: u64) -> Result<StoreEvent>;
}

/// Whether `path` falls under a watch pattern.
fn pattern_matches(pattern: &str, path: &str) -> bool {
    match pattern.strip_suffix("/**") {
        Some(prefix) => {
            path == prefix || (path.starts_with(prefix) && path[prefix.len()..].starts_with('/'))
        }
        None => pattern == path,
    }
}

#[derive(Default)]
struct MemoryInner {
    rev: u64,
    log: Vec<StoreEvent>,
}

/// In-memory revisioned store with watch support.
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
    notify: broadcast::Sender<()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (notify, _) = broadcast::channel(64);
        Self {
            inner: Mutex::new(MemoryInner::default()),
            notify,
        }
    }

    /// Write `body` at `path`, bumping the revision. Returns the new
    /// revision and wakes any waiters.
    pub fn publish(&self, path: impl Into<String>, body: Bytes) -> u64 {
        let rev = {
            let mut inner = self.inner.lock();
            inner.rev += 1;
            let rev = inner.rev;
            inner.log.push(StoreEvent {
                path: path.into(),
                rev,
                body,
            });
            rev
        };
        let _ = self.notify.send(());
        rev
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn current_revision(&self) -> Result<u64> {
        Ok(self.inner.lock().rev)
    }

    async fn walk(&self, rev: u64, path: &str) -> Result<Vec<String>> {
        let inner = self.inner.lock();
        let mut paths: Vec<String> = inner
            .log
            .iter()
            .filter(|ev| ev.rev <= rev && pattern_matches(&format!("{path}/**"), &ev.path))
            .map(|ev| ev.path.clone())
            .collect();
        paths.sort();
        paths.dedup();
        Ok(paths)
    }

    async fn get(&self, path: &str, rev: u64) -> Result<Bytes> {
        let inner = self.inner.lock();
        inner
            .log
            .iter()
            .rev()
            .find(|ev| ev.rev <= rev && ev.path == path)
            .map(|ev| ev.body.clone())
            .ok_or_else(|| ClientError::Store(format!("no file at {path} as of rev {rev}")))
    }

    async fn wait(&self, pattern: &str, rev: u64) -> Result<StoreEvent> {
        loop {
            // Subscribe before scanning the log so a publish between the
            // scan and the recv cannot be missed.
            let mut wakeups = self.notify.subscribe();

            {
                let inner = self.inner.lock();
                if let Some(ev) = inner
                    .log
                    .iter()
                    .find(|ev| ev.rev >= rev && pattern_matches(pattern, &ev.path))
                {
                    return Ok(ev.clone());
                }
            }

            match wakeups.recv().await {
                Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(ClientError::Store("store closed".to_string()))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn patterns_match_subtrees_and_literals() {
        assert!(pattern_matches("/services/echo/**", "/services/echo/a"));
        assert!(pattern_matches("/services/echo/**", "/services/echo"));
        assert!(!pattern_matches("/services/echo/**", "/services/echoes/a"));
        assert!(pattern_matches("/services/echo/a", "/services/echo/a"));
        assert!(!pattern_matches("/services/echo/a", "/services/echo/b"));
    }

    #[tokio::test]
    async fn revisions_are_monotonic() {
        let store = MemoryStore::new();
        assert_eq!(store.current_revision().await.unwrap(), 0);

        let r1 = store.publish("/services/echo/a", Bytes::from_static(b"1"));
        let r2 = store.publish("/services/echo/b", Bytes::from_static(b"2"));
        assert!(r2 > r1);
        assert_eq!(store.current_revision().await.unwrap(), r2);
    }

    #[tokio::test]
    async fn walk_reflects_the_requested_revision() {
        let store = MemoryStore::new();
        let r1 = store.publish("/services/echo/a", Bytes::from_static(b"1"));
        store.publish("/services/echo/b", Bytes::from_static(b"2"));

        let at_r1 = store.walk(r1, "/services/echo").await.unwrap();
        assert_eq!(at_r1, vec!["/services/echo/a".to_string()]);

        let now = store.current_revision().await.unwrap();
        let at_now = store.walk(now, "/services/echo").await.unwrap();
        assert_eq!(at_now.len(), 2);
    }

    #[tokio::test]
    async fn get_reads_the_latest_body_at_or_before_rev() {
        let store = MemoryStore::new();
        let r1 = store.publish("/services/echo/a", Bytes::from_static(b"old"));
        let r2 = store.publish("/services/echo/a", Bytes::from_static(b"new"));

        assert_eq!(
            store.get("/services/echo/a", r1).await.unwrap().as_ref(),
            b"old"
        );
        assert_eq!(
            store.get("/services/echo/a", r2).await.unwrap().as_ref(),
            b"new"
        );
        assert!(store.get("/services/echo/missing", r2).await.is_err());
    }

    #[tokio::test]
    async fn wait_returns_only_events_at_or_after_rev() {
        let store = Arc::new(MemoryStore::new());
        let r1 = store.publish("/services/echo/a", Bytes::from_static(b"1"));

        // A waiter starting past r1 must not see the old event.
        let waiter = {
            let store = store.clone();
            tokio::spawn(async move { store.wait("/services/echo/**", r1 + 1).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        store.publish("/services/echo/b", Bytes::from_static(b"2"));
        let ev = waiter.await.unwrap().unwrap();
        assert_eq!(ev.path, "/services/echo/b");
        assert_eq!(ev.rev, r1 + 1);
    }

    #[tokio::test]
    async fn wait_filters_by_pattern() {
        let store = Arc::new(MemoryStore::new());

        let waiter = {
            let store = store.clone();
            tokio::spawn(async move { store.wait("/services/echo/**", 1).await })
        };

        store.publish("/services/other/a", Bytes::from_static(b"x"));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        store.publish("/services/echo/a", Bytes::from_static(b"y"));
        let ev = waiter.await.unwrap().unwrap();
        assert_eq!(ev.path, "/services/echo/a");
    }
}
