//! Connection factory and RPC handles.
//!
//! Dialing an instance is not complete until the registration handshake
//! succeeds: the service sends a [`ServiceHandshake`] first, the client
//! answers with a [`ClientHandshake`], and a peer reporting
//! `registered = false` is closed and redialed. A service mid-deregistration
//! stays in that loop only until the registry removal purges the instance.

use crate::error::{ClientError, Result};
use crate::instance::ServiceInstance;
use tether_protocol::{
    read_frame, write_frame, CallFrame, ClientHandshake, RpcRequest, RpcResponse,
};
use tokio::net::TcpStream;
use tracing::debug;

/// Dial an instance and complete the registration handshake.
pub(crate) async fn connect(instance: &ServiceInstance) -> Result<RpcHandle> {
    loop {
        let mut stream = TcpStream::connect(&instance.addr).await.map_err(|e| {
            ClientError::Connect(format!("failed to connect to {}: {e}", instance.addr))
        })?;

        let handshake: tether_protocol::ServiceHandshake = read_frame(&mut stream).await?;
        write_frame(&mut stream, &ClientHandshake::default()).await?;

        if !handshake.registered {
            // The service is deregistering but the registry has not caught
            // up yet; drop the socket and dial again.
            debug!(addr = %instance.addr, "peer not registered, redialing");
            continue;
        }

        debug!(addr = %instance.addr, service = %handshake.name, "connection established");
        return Ok(RpcHandle {
            stream,
            closed: false,
        });
    }
}

/// A single live, handshake-completed RPC channel to one instance.
///
/// Any transport error poisons the handle; the pool discards poisoned
/// handles on release and regenerates them on the next acquire.
pub(crate) struct RpcHandle {
    stream: TcpStream,
    closed: bool,
}

impl RpcHandle {
    /// Issue one call and wait for the reply envelope.
    pub(crate) async fn call(&mut self, method: &str, request: &RpcRequest) -> Result<RpcResponse> {
        let frame = CallFrame {
            method: method.to_string(),
            request: request.clone(),
        };

        if let Err(e) = write_frame(&mut self.stream, &frame).await {
            self.closed = true;
            return Err(e.into());
        }

        match read_frame(&mut self.stream).await {
            Ok(response) => Ok(response),
            Err(e) => {
                self.closed = true;
                Err(e.into())
            }
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }
}
