//! Handshake frames and RPC envelopes.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// First frame a service sends on every new connection.
///
/// A service that is mid-deregistration answers with `registered = false`;
/// the client must close the connection and dial again rather than issue
/// RPCs on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceHandshake {
    /// Whether the service still considers itself registered in the mesh.
    pub registered: bool,
    /// The service's registered name, e.g. `"echo"`.
    pub name: String,
}

/// The client's reply frame, completing the handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientHandshake {
    /// Protocol version the client speaks.
    pub protocol_version: u16,
}

impl Default for ClientHandshake {
    fn default() -> Self {
        Self {
            protocol_version: crate::PROTOCOL_VERSION,
        }
    }
}

/// Per-call tracing identity, propagated through the mesh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestInfo {
    /// Unique id for this logical request.
    pub request_id: String,
}

impl RequestInfo {
    /// Synthesize a `RequestInfo` with a freshly generated request id.
    pub fn generate() -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

/// The envelope dispatched to `<ServiceName>.Forward`.
///
/// `method` names the caller's intended service method; `payload` is the
/// caller's input marshalled separately from the envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub info: RequestInfo,
    pub method: String,
    pub payload: Bytes,
}

/// Reply envelope for a forwarded call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    /// Marshalled output payload; empty when `error` is set.
    pub payload: Bytes,
    /// Application-level failure reported by the service.
    pub error: Option<String>,
}

/// One RPC exchange as seen by the transport: the routed method name plus
/// the request envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallFrame {
    /// Routed method, always `<ServiceName>.Forward`.
    pub method: String,
    pub request: RpcRequest,
}
