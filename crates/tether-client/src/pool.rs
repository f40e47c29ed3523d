//! Bounded per-instance connection pools.

use crate::conn::{self, RpcHandle};
use crate::error::{ClientError, Result};
use crate::instance::ServiceInstance;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};

/// Pool of live RPC handles for one instance.
///
/// At most `size` handles are outstanding at once. Handles are constructed
/// on demand via the connection factory; a handle poisoned by a transport
/// error is dropped on release, and its capacity comes back through the
/// permit so the next acquire dials a replacement.
pub(crate) struct ConnectionPool {
    instance: Arc<ServiceInstance>,
    idle: Mutex<Vec<RpcHandle>>,
    permits: Arc<Semaphore>,
}

/// An acquired handle. Holds the pool permit; dropping it without a release
/// returns the capacity but discards the connection.
pub(crate) struct PooledHandle {
    handle: RpcHandle,
    _permit: OwnedSemaphorePermit,
}

impl PooledHandle {
    pub(crate) fn handle_mut(&mut self) -> &mut RpcHandle {
        &mut self.handle
    }
}

impl ConnectionPool {
    pub(crate) fn new(instance: Arc<ServiceInstance>, size: usize) -> Self {
        Self {
            instance,
            idle: Mutex::new(Vec::with_capacity(size)),
            permits: Arc::new(Semaphore::new(size)),
        }
    }

    /// Take an idle handle or dial a new one, waiting for capacity first.
    pub(crate) async fn acquire(&self) -> Result<PooledHandle> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ClientError::PoolClosed)?;

        if let Some(handle) = self.idle.lock().await.pop() {
            return Ok(PooledHandle {
                handle,
                _permit: permit,
            });
        }

        let handle = conn::connect(&self.instance).await?;
        Ok(PooledHandle {
            handle,
            _permit: permit,
        })
    }

    /// Return a handle to the pool. Poisoned handles are dropped.
    pub(crate) async fn release(&self, pooled: PooledHandle) {
        if !pooled.handle.is_closed() {
            self.idle.lock().await.push(pooled.handle);
        }
        // The permit drops with `pooled`, restoring capacity either way.
    }
}
