//! Tether Wire Protocol
//!
//! This crate defines the wire types shared between tether-client and mesh
//! services: the registration handshake, the RPC envelope routed through
//! `<ServiceName>.Forward`, and the service record published in the
//! coordination store.
//!
//! # Wire Format
//!
//! Every frame on a connection is length-prefixed postcard:
//!
//! ```text
//! ┌──────────────────┬──────────────────────────────┐
//! │ Length (4 bytes) │ Payload (N bytes)            │
//! │ Big-endian u32   │ postcard-serialized message  │
//! └──────────────────┴──────────────────────────────┘
//! ```
//!
//! A new connection carries exactly one `ServiceHandshake` (service → client)
//! followed by one `ClientHandshake` (client → service) before any RPC
//! traffic. Inner call payloads are marshalled separately from the envelope
//! with [`codec::marshal`] / [`codec::unmarshal`].
//!
//! # Stability
//!
//! Struct field order is significant for postcard serialization. Changes to
//! field order break wire compatibility with existing clients and services.

pub mod codec;
mod error;
mod messages;
mod record;

pub use codec::{read_frame, write_frame, MAX_FRAME_SIZE};
pub use error::{ProtocolError, Result};
pub use messages::{CallFrame, ClientHandshake, RequestInfo, RpcRequest, RpcResponse, ServiceHandshake};
pub use record::{ServiceConfig, ServiceRecord};

/// Protocol version for compatibility checking
pub const PROTOCOL_VERSION: u16 = 1;
