//! The service client: hedged dispatch over the live instance set.

use crate::config::{ClientConfig, Timeouts};
use crate::error::{ClientError, Result};
use crate::instance::ServiceInstance;
use crate::mux::{DispatchMux, InstanceRequest, MuxEvent, ServicePool};
use crate::pool::PooledHandle;
use crate::query::Query;
use crate::receptacle::Receptacle;
use crate::store::CoordinationStore;
use crate::watcher::RegistryWatcher;
use bytes::Bytes;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashSet;
use std::future;
use std::sync::Arc;
use std::time::Duration;
use tether_protocol::{codec, RequestInfo, RpcRequest};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::{self, MissedTickBehavior};
use tracing::warn;

/// A client dispatching calls to one service query's instances.
///
/// Cloning is cheap; clones share the same registry and pools. Dropping the
/// last clone does not stop the background tasks; call [`shutdown`] for
/// that.
///
/// [`shutdown`]: ServiceClient::shutdown
#[derive(Clone)]
pub struct ServiceClient {
    mux: mpsc::Sender<MuxEvent>,
    shutdown: broadcast::Sender<()>,
}

impl ServiceClient {
    /// Build a client and start its registry watcher and dispatch tasks.
    pub fn new(query: Query, store: Arc<dyn CoordinationStore>, config: ClientConfig) -> Self {
        let (mux_tx, mux_rx) = mpsc::channel(64);
        let (shutdown, _) = broadcast::channel(1);

        let timeouts = Timeouts {
            retry: config.retry_timeout,
            giveup: config.giveup_timeout,
        };
        let mux = DispatchMux::new(
            mux_rx,
            shutdown.subscribe(),
            timeouts,
            config.connection_pool_size,
        );
        tokio::spawn(mux.run());

        let watcher = RegistryWatcher::new(store, query, mux_tx.clone(), shutdown.subscribe());
        tokio::spawn(watcher.run());

        Self {
            mux: mux_tx,
            shutdown,
        }
    }

    /// Replace the retry interval and giveup deadline for subsequent calls.
    pub async fn set_timeout(&self, retry: Duration, giveup: Duration) -> Result<()> {
        self.mux
            .send(MuxEvent::SetTimeouts(Timeouts { retry, giveup }))
            .await
            .map_err(|_| ClientError::ClientClosed)
    }

    /// Read the current `(retry, giveup)` pair.
    pub async fn get_timeout(&self) -> Result<(Duration, Duration)> {
        let timeouts = self.timeouts().await?;
        Ok((timeouts.retry, timeouts.giveup))
    }

    /// Addresses of the instances currently in the registry, sorted.
    pub async fn instances(&self) -> Result<Vec<String>> {
        let (reply, rx) = oneshot::channel();
        self.mux
            .send(MuxEvent::Instances(reply))
            .await
            .map_err(|_| ClientError::ClientClosed)?;
        rx.await.map_err(|_| ClientError::ClientClosed)
    }

    /// Stop the registry watcher and dispatch tasks. In-flight attempts run
    /// to completion; parked instance requests fail with
    /// [`ClientError::ClientClosed`].
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    /// Dispatch `method` with hedged retries across instances.
    ///
    /// One attempt starts immediately; while no attempt has succeeded, a new
    /// attempt is launched on a distinct instance every retry interval. The
    /// first successful reply is merged into `out` and all later results are
    /// discarded. When the giveup deadline fires first, the last attempt
    /// error is returned, or [`ClientError::RequestTimeout`] if no attempt
    /// finished at all.
    pub async fn send<In, R>(
        &self,
        info: Option<RequestInfo>,
        method: &str,
        input: &In,
        out: &mut R,
    ) -> Result<()>
    where
        In: Serialize + ?Sized,
        R: Receptacle,
    {
        let Timeouts { retry, giveup } = self.timeouts().await?;
        let payload = codec::marshal(input)?;

        let (results_tx, mut results) = mpsc::unbounded_channel();
        let exclusions = Arc::new(Mutex::new(HashSet::new()));

        self.spawn_attempt::<R::Output>(
            info.clone(),
            method.to_string(),
            payload.clone(),
            exclusions.clone(),
            results_tx.clone(),
        );

        let mut ticker = (!retry.is_zero()).then(|| {
            let mut interval = time::interval_at(time::Instant::now() + retry, retry);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval
        });
        let giveup_timer = deadline(giveup);
        tokio::pin!(giveup_timer);

        let mut last_error: Option<ClientError> = None;

        loop {
            tokio::select! {
                _ = next_tick(&mut ticker) => {
                    self.spawn_attempt::<R::Output>(
                        info.clone(),
                        method.to_string(),
                        payload.clone(),
                        exclusions.clone(),
                        results_tx.clone(),
                    );
                }
                _ = &mut giveup_timer => {
                    return Err(last_error.take().unwrap_or(ClientError::RequestTimeout));
                }
                result = results.recv() => match result {
                    Some(Ok(output)) => {
                        out.merge(output);
                        return Ok(());
                    }
                    Some(Err(e)) => {
                        warn!(method, error = %e, "send attempt failed");
                        last_error = Some(e);
                    }
                    // Cannot happen while this frame holds `results_tx`.
                    None => return Err(last_error.take().unwrap_or(ClientError::ClientClosed)),
                },
            }
        }
    }

    /// Dispatch `method` once: no hedging, no retries, one instance attempt.
    ///
    /// A non-zero `giveup` bounds the whole attempt, including waiting for
    /// an instance to appear. The first error encountered is returned.
    pub async fn send_once<In, R>(
        &self,
        giveup: Duration,
        info: Option<RequestInfo>,
        method: &str,
        input: &In,
        out: &mut R,
    ) -> Result<()>
    where
        In: Serialize + ?Sized,
        R: Receptacle,
    {
        let payload = codec::marshal(input)?;
        let attempt = async {
            let entry = request_instance(&self.mux, HashSet::new()).await?;
            attempt_call::<R::Output>(&entry, info, method, payload).await
        };

        let output = if giveup.is_zero() {
            attempt.await?
        } else {
            time::timeout(giveup, attempt)
                .await
                .map_err(|_| ClientError::RequestTimeout)??
        };

        out.merge(output);
        Ok(())
    }

    /// Launch one hedged attempt task.
    ///
    /// The task snapshots the exclusion set, asks the mux for an instance
    /// outside it, marks that instance in-flight for the duration of the
    /// attempt, and publishes its private result on the results channel. It
    /// never touches the caller's receptacle.
    fn spawn_attempt<O>(
        &self,
        info: Option<RequestInfo>,
        method: String,
        payload: Bytes,
        exclusions: Arc<Mutex<HashSet<String>>>,
        results: mpsc::UnboundedSender<Result<O>>,
    ) where
        O: DeserializeOwned + Send + 'static,
    {
        let mux = self.mux.clone();
        tokio::spawn(async move {
            let snapshot = exclusions.lock().clone();
            let entry = match request_instance(&mux, snapshot).await {
                Ok(entry) => entry,
                Err(e) => {
                    let _ = results.send(Err(e));
                    return;
                }
            };

            let key = entry.instance.addr.clone();
            exclusions.lock().insert(key.clone());

            let result = attempt_call(&entry, info, &method, payload).await;

            // Release the exclusion so later ticks may retry this instance
            // when nothing else is eligible.
            exclusions.lock().remove(&key);
            let _ = results.send(result);
        });
    }

    async fn timeouts(&self) -> Result<Timeouts> {
        let (reply, rx) = oneshot::channel();
        self.mux
            .send(MuxEvent::GetTimeouts(reply))
            .await
            .map_err(|_| ClientError::ClientClosed)?;
        rx.await.map_err(|_| ClientError::ClientClosed)
    }
}

/// Ask the mux for an instance outside `exclusions`, waiting for a
/// discovery if nothing is eligible yet.
async fn request_instance(
    mux: &mpsc::Sender<MuxEvent>,
    exclusions: HashSet<String>,
) -> Result<ServicePool> {
    let (reply, rx) = oneshot::channel();
    mux.send(MuxEvent::InstanceRequest(InstanceRequest { exclusions, reply }))
        .await
        .map_err(|_| ClientError::ClientClosed)?;
    rx.await.map_err(|_| ClientError::ClientClosed)
}

/// Acquire a pooled handle, issue the call, and release the handle.
async fn attempt_call<O>(
    entry: &ServicePool,
    info: Option<RequestInfo>,
    method: &str,
    payload: Bytes,
) -> Result<O>
where
    O: DeserializeOwned,
{
    let mut pooled: PooledHandle = entry.pool.acquire().await?;
    let result = try_send(&mut pooled, &entry.instance, info, method, payload).await;
    entry.pool.release(pooled).await;
    result
}

/// One RPC on one connection: build the envelope, forward it, decode the
/// reply payload.
async fn try_send<O>(
    pooled: &mut PooledHandle,
    instance: &ServiceInstance,
    info: Option<RequestInfo>,
    method: &str,
    payload: Bytes,
) -> Result<O>
where
    O: DeserializeOwned,
{
    let info = info.unwrap_or_else(RequestInfo::generate);
    let request = RpcRequest {
        info,
        method: method.to_string(),
        payload,
    };
    let forward = format!("{}.Forward", instance.name);

    let response = pooled.handle_mut().call(&forward, &request).await?;
    if let Some(message) = response.error {
        return Err(ClientError::Remote(message));
    }
    Ok(codec::unmarshal(&response.payload)?)
}

async fn next_tick(ticker: &mut Option<time::Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => future::pending().await,
    }
}

async fn deadline(giveup: Duration) {
    if giveup.is_zero() {
        future::pending::<()>().await
    } else {
        time::sleep(giveup).await
    }
}
