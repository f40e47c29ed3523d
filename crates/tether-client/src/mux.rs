//! The dispatch mux: a single-owner actor for the instance registry.
//!
//! The mux task is the only code that touches the instance map, so the map
//! needs no lock; everything else talks to it through [`MuxEvent`]s with
//! oneshot replies. Each event is handled with bounded, non-blocking work.

use crate::config::Timeouts;
use crate::instance::ServiceInstance;
use crate::pool::ConnectionPool;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info};

/// One registry entry handed to send attempts: the instance plus its
/// connection pool.
#[derive(Clone)]
pub(crate) struct ServicePool {
    pub(crate) instance: Arc<ServiceInstance>,
    pub(crate) pool: Arc<ConnectionPool>,
}

impl ServicePool {
    fn new(instance: ServiceInstance, pool_size: usize) -> Self {
        let instance = Arc::new(instance);
        let pool = Arc::new(ConnectionPool::new(instance.clone(), pool_size));
        Self { instance, pool }
    }
}

/// A send attempt asking for an instance outside its exclusion set.
///
/// Requests never time out here; if nothing is eligible the request parks
/// until the next discovery, and the caller's giveup deadline drives
/// cancellation by dropping the reply receiver.
pub(crate) struct InstanceRequest {
    pub(crate) exclusions: HashSet<String>,
    pub(crate) reply: oneshot::Sender<ServicePool>,
}

/// Input events for the mux task.
pub(crate) enum MuxEvent {
    Discovered(ServiceInstance),
    Removed(ServiceInstance),
    InstanceRequest(InstanceRequest),
    SetTimeouts(Timeouts),
    GetTimeouts(oneshot::Sender<Timeouts>),
    /// Snapshot of the current instance addresses, for introspection.
    Instances(oneshot::Sender<Vec<String>>),
}

pub(crate) struct DispatchMux {
    events: mpsc::Receiver<MuxEvent>,
    shutdown: broadcast::Receiver<()>,
    instances: HashMap<String, ServicePool>,
    waiters: Vec<InstanceRequest>,
    timeouts: Timeouts,
    pool_size: usize,
}

impl DispatchMux {
    pub(crate) fn new(
        events: mpsc::Receiver<MuxEvent>,
        shutdown: broadcast::Receiver<()>,
        timeouts: Timeouts,
        pool_size: usize,
    ) -> Self {
        Self {
            events,
            shutdown,
            instances: HashMap::new(),
            waiters: Vec::new(),
            timeouts,
            pool_size,
        }
    }

    pub(crate) async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    debug!("dispatch mux stopped");
                    return;
                }
                event = self.events.recv() => match event {
                    Some(event) => self.handle(event),
                    None => return,
                },
            }
        }
    }

    fn handle(&mut self, event: MuxEvent) {
        match event {
            MuxEvent::Discovered(instance) => self.on_discovered(instance),
            MuxEvent::Removed(instance) => self.on_removed(instance),
            MuxEvent::InstanceRequest(request) => self.on_request(request),
            MuxEvent::SetTimeouts(timeouts) => self.timeouts = timeouts,
            MuxEvent::GetTimeouts(reply) => {
                let _ = reply.send(self.timeouts);
            }
            MuxEvent::Instances(reply) => {
                let mut addrs: Vec<String> = self.instances.keys().cloned().collect();
                addrs.sort();
                let _ = reply.send(addrs);
            }
        }
    }

    fn on_discovered(&mut self, instance: ServiceInstance) {
        let key = instance.addr.clone();
        let name = instance.name.clone();
        let entry = ServicePool::new(instance, self.pool_size);

        // Replace atomically; duplicate snapshot/rewatch events are routine,
        // so only a genuinely new key is worth logging.
        let known = self.instances.insert(key.clone(), entry.clone()).is_some();
        if !known {
            info!(addr = %key, service = %name, "instance discovered");
        }

        // Wake every parked request with the new entry. Waiters from other
        // calls may converge on this one instance; their own exclusion
        // logic and the pool bound keep the fan-in in check.
        for waiter in self.waiters.drain(..) {
            let _ = waiter.reply.send(entry.clone());
        }
    }

    fn on_removed(&mut self, instance: ServiceInstance) {
        if self.instances.remove(&instance.addr).is_some() {
            info!(addr = %instance.addr, service = %instance.name, "instance removed");
        }
        // Idle connections drop with the pool; borrowed handles live until
        // their attempts release them.
    }

    fn on_request(&mut self, request: InstanceRequest) {
        match self.select(&request.exclusions) {
            Some(entry) => {
                let _ = request.reply.send(entry);
            }
            None => self.waiters.push(request),
        }
    }

    /// Uniform-random pick over the non-excluded entries.
    fn select(&self, exclusions: &HashSet<String>) -> Option<ServicePool> {
        let candidates: Vec<&ServicePool> = self
            .instances
            .values()
            .filter(|entry| !exclusions.contains(entry.instance.addr.as_str()))
            .collect();

        if candidates.is_empty() {
            return None;
        }
        let pick = rand::thread_rng().gen_range(0..candidates.len());
        Some(candidates[pick].clone())
    }
}
