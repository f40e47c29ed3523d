//! # tether-client
//!
//! Client-side dispatch core for the Tether service mesh.
//!
//! The client keeps a live view of a service's instances from a coordination
//! store (snapshot + incremental watch) and pools handshake-completed
//! connections per instance. Calls are dispatched with **hedged retries**:
//! parallel attempts race on distinct replicas, the first successful reply
//! wins, and a giveup deadline bounds the whole call.
//!
//! ## Architecture
//!
//! - **Registry watcher**: one task tailing the coordination store and
//!   feeding instance events into the dispatch mux.
//! - **Dispatch mux**: one actor task that exclusively owns the instance
//!   map; everything else reaches it through request/reply channels, so the
//!   registry needs no locks.
//! - **Hedged send controller**: per call, a retry ticker launches attempt
//!   tasks on not-yet-tried instances while a results channel races their
//!   replies against the giveup timer.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tether_client::{ClientConfig, Query, ServiceClient, Slot};
//!
//! # async fn example(store: Arc<dyn tether_client::CoordinationStore>) -> tether_client::Result<()> {
//! let client = ServiceClient::new(
//!     Query::new("echo"),
//!     store,
//!     ClientConfig::builder()
//!         .retry_timeout(Duration::from_millis(20))
//!         .giveup_timeout(Duration::from_millis(500))
//!         .build(),
//! );
//!
//! let mut reply = Slot::<String>::new();
//! client.send(None, "Echo", "hello", &mut reply).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
mod conn;
pub mod error;
mod instance;
mod mux;
mod pool;
pub mod query;
pub mod receptacle;
pub mod store;
mod watcher;

pub use client::ServiceClient;
pub use config::{ClientConfig, ClientConfigBuilder};
pub use error::{ClientError, Result};
pub use instance::ServiceInstance;
pub use query::Query;
pub use receptacle::{Receptacle, Slot};
pub use store::{CoordinationStore, MemoryStore, StoreEvent};

// Re-export the wire types callers and custom stores interact with.
pub use tether_protocol::{
    ClientHandshake, RequestInfo, RpcRequest, RpcResponse, ServiceConfig, ServiceHandshake,
    ServiceRecord, PROTOCOL_VERSION,
};
