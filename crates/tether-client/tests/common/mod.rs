//! Shared fixtures: a loopback service speaking the real handshake +
//! Forward protocol, and helpers for publishing registry records.

#![allow(dead_code)]

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tether_client::{MemoryStore, ServiceClient};
use tether_protocol::{
    codec, read_frame, write_frame, CallFrame, ClientHandshake, RpcResponse, ServiceConfig,
    ServiceHandshake, ServiceRecord,
};
use tokio::net::{TcpListener, TcpStream};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EchoRequest {
    pub x: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EchoReply {
    pub y: u32,
    pub source: String,
}

/// How a fake service answers calls.
#[derive(Clone)]
pub enum Behavior {
    /// Reply `y = x + 1` tagged with `tag`, after `delay`.
    Echo { delay: Duration, tag: &'static str },
    /// Drop the connection as soon as a call arrives.
    Disconnect,
    /// Delegate to an arbitrary responder.
    Respond(Arc<dyn Fn(CallFrame) -> RpcResponse + Send + Sync>),
}

pub struct FakeService {
    pub name: String,
    pub addr: String,
    /// Calls received across all connections.
    pub calls: Arc<AtomicUsize>,
    /// Handshakes served (one per accepted connection).
    pub handshakes: Arc<AtomicUsize>,
    /// Highest number of calls ever in flight at once.
    pub peak_in_flight: Arc<AtomicUsize>,
    accept_task: tokio::task::JoinHandle<()>,
}

impl Drop for FakeService {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

/// Start a fake service. The first `unregistered_handshakes` connections are
/// answered with `registered = false` and closed, as a deregistering peer
/// would.
pub async fn spawn_service(
    name: &'static str,
    unregistered_handshakes: usize,
    behavior: Behavior,
) -> FakeService {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind fake service");
    let addr = listener.local_addr().expect("local addr").to_string();

    let calls = Arc::new(AtomicUsize::new(0));
    let handshakes = Arc::new(AtomicUsize::new(0));
    let peak_in_flight = Arc::new(AtomicUsize::new(0));
    let in_flight = Arc::new(AtomicUsize::new(0));
    let unregistered_left = Arc::new(AtomicUsize::new(unregistered_handshakes));

    let accept_task = tokio::spawn({
        let calls = calls.clone();
        let handshakes = handshakes.clone();
        let peak_in_flight = peak_in_flight.clone();
        let in_flight = in_flight.clone();
        async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    return;
                };
                handshakes.fetch_add(1, Ordering::SeqCst);

                let registered = unregistered_left
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_err();

                let hello = ServiceHandshake {
                    registered,
                    name: name.to_string(),
                };
                if write_frame(&mut stream, &hello).await.is_err() {
                    continue;
                }
                if read_frame::<_, ClientHandshake>(&mut stream).await.is_err() {
                    continue;
                }
                if !registered {
                    continue; // close; the client must redial
                }

                tokio::spawn(serve_connection(
                    stream,
                    format!("{name}.Forward"),
                    behavior.clone(),
                    calls.clone(),
                    in_flight.clone(),
                    peak_in_flight.clone(),
                ));
            }
        }
    });

    FakeService {
        name: name.to_string(),
        addr,
        calls,
        handshakes,
        peak_in_flight,
        accept_task,
    }
}

/// Start a fake service answering every call through `responder`.
pub async fn spawn_service_with<F>(name: &'static str, responder: F) -> FakeService
where
    F: Fn(CallFrame) -> RpcResponse + Send + Sync + 'static,
{
    spawn_service(name, 0, Behavior::Respond(Arc::new(responder))).await
}

async fn serve_connection(
    mut stream: TcpStream,
    forward_method: String,
    behavior: Behavior,
    calls: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
) {
    loop {
        let frame: CallFrame = match read_frame(&mut stream).await {
            Ok(frame) => frame,
            Err(_) => return,
        };
        calls.fetch_add(1, Ordering::SeqCst);

        match &behavior {
            Behavior::Disconnect => return,
            Behavior::Respond(responder) => {
                let response = responder(frame);
                if write_frame(&mut stream, &response).await.is_err() {
                    return;
                }
            }
            Behavior::Echo { delay, tag } => {
                if frame.method != forward_method {
                    let response = RpcResponse {
                        payload: Bytes::new(),
                        error: Some(format!("unknown method {}", frame.method)),
                    };
                    if write_frame(&mut stream, &response).await.is_err() {
                        return;
                    }
                    continue;
                }

                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak_in_flight.fetch_max(now, Ordering::SeqCst);
                if !delay.is_zero() {
                    tokio::time::sleep(*delay).await;
                }
                in_flight.fetch_sub(1, Ordering::SeqCst);

                let response = match codec::unmarshal::<EchoRequest>(&frame.request.payload) {
                    Ok(request) => {
                        let reply = EchoReply {
                            y: request.x + 1,
                            source: tag.to_string(),
                        };
                        RpcResponse {
                            payload: codec::marshal(&reply).expect("marshal reply"),
                            error: None,
                        }
                    }
                    Err(e) => RpcResponse {
                        payload: Bytes::new(),
                        error: Some(format!("bad payload: {e}")),
                    },
                };
                if write_frame(&mut stream, &response).await.is_err() {
                    return;
                }
            }
        }
    }
}

/// Publish a service record into the store.
pub fn publish_record(store: &MemoryStore, name: &str, addr: &str, registered: bool) -> u64 {
    let record = ServiceRecord {
        config: ServiceConfig {
            service_addr: addr.to_string(),
            name: name.to_string(),
            version: "1".to_string(),
            region: "local".to_string(),
        },
        registered,
    };
    store.publish(
        format!("/services/{name}/{addr}"),
        Bytes::from(serde_json::to_vec(&record).expect("encode record")),
    )
}

/// Publish the registration record for a running fake service.
pub fn register(store: &MemoryStore, service: &FakeService) -> u64 {
    publish_record(store, &service.name, &service.addr, true)
}

/// Publish the deregistration record for a running fake service.
pub fn deregister(store: &MemoryStore, service: &FakeService) -> u64 {
    publish_record(store, &service.name, &service.addr, false)
}

/// Poll until the client's registry holds exactly `expected` instances.
pub async fn wait_for_instances(client: &ServiceClient, expected: usize) {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let instances = client.instances().await.expect("client closed");
        if instances.len() == expected {
            return;
        }
        assert!(
            Instant::now() < deadline,
            "registry never reached {expected} instances (have {})",
            instances.len()
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
