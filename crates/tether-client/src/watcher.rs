//! The registry watcher: snapshot, then tail-watch.
//!
//! The watcher enumerates every record under the query's base path at the
//! store's current revision, emits a discovery for each, and then watches
//! the subtree from the next revision onward so nothing is missed across
//! the boundary. Individual record failures are logged and skipped; the
//! snapshot is best-effort and never aborts.

use crate::instance::ServiceInstance;
use crate::mux::MuxEvent;
use crate::query::Query;
use crate::store::CoordinationStore;
use std::sync::Arc;
use tether_protocol::ServiceRecord;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

pub(crate) struct RegistryWatcher {
    store: Arc<dyn CoordinationStore>,
    query: Query,
    events: mpsc::Sender<MuxEvent>,
    shutdown: broadcast::Receiver<()>,
}

impl RegistryWatcher {
    pub(crate) fn new(
        store: Arc<dyn CoordinationStore>,
        query: Query,
        events: mpsc::Sender<MuxEvent>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            store,
            query,
            events,
            shutdown,
        }
    }

    pub(crate) async fn run(mut self) {
        let base = self.query.base_path();

        let rev = match self.store.current_revision().await {
            Ok(rev) => rev,
            Err(e) => {
                error!(error = %e, "coordination store unavailable, watcher exiting");
                return;
            }
        };

        info!(path = %base, rev, "watching service registry");

        if self.snapshot(rev, &base).await.is_err() {
            return; // mux gone
        }
        self.watch(rev, &base).await;
    }

    /// Emit a discovery for every record present at `rev`.
    async fn snapshot(&self, rev: u64, base: &str) -> Result<(), ()> {
        let files = match self.store.walk(rev, base).await {
            Ok(files) => files,
            Err(e) => {
                warn!(error = %e, "registry snapshot incomplete");
                Vec::new()
            }
        };

        for file in files {
            let body = match self.store.get(&file, rev).await {
                Ok(body) => body,
                Err(e) => {
                    warn!(path = %file, error = %e, "failed to read service record, skipping");
                    continue;
                }
            };
            match serde_json::from_slice::<ServiceRecord>(&body) {
                Ok(record) => {
                    let instance = ServiceInstance::from_record(&record);
                    self.events
                        .send(MuxEvent::Discovered(instance))
                        .await
                        .map_err(|_| ())?;
                }
                Err(e) => {
                    warn!(path = %file, error = %e, "failed to decode service record, skipping")
                }
            }
        }
        Ok(())
    }

    /// Tail the subtree from `rev + 1`, translating records into
    /// discovered/removed events.
    async fn watch(&mut self, snapshot_rev: u64, base: &str) {
        let pattern = format!("{base}/**");
        let mut next = snapshot_rev + 1;

        loop {
            let event = tokio::select! {
                _ = self.shutdown.recv() => {
                    debug!("registry watcher stopped");
                    return;
                }
                result = self.store.wait(&pattern, next) => match result {
                    Ok(event) => event,
                    Err(e) => {
                        // Skip the poisoned revision so the watch cannot
                        // hot-loop on it.
                        warn!(rev = next, error = %e, "registry watch error");
                        next += 1;
                        continue;
                    }
                },
            };

            next = event.rev + 1;

            if !self.query.path_matches(&event.path) {
                continue;
            }

            let record = match serde_json::from_slice::<ServiceRecord>(&event.body) {
                Ok(record) => record,
                Err(e) => {
                    warn!(path = %event.path, error = %e, "failed to decode service record, skipping");
                    continue;
                }
            };

            let instance = ServiceInstance::from_record(&record);
            debug!(addr = %instance.addr, registered = instance.registered, "registry event");

            let event = if record.registered {
                MuxEvent::Discovered(instance)
            } else {
                MuxEvent::Removed(instance)
            };
            if self.events.send(event).await.is_err() {
                return; // mux gone
            }
        }
    }
}
