use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Connection error: {0}")]
    Connect(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] tether_protocol::ProtocolError),

    #[error("Remote error: {0}")]
    Remote(String),

    #[error("Coordination store error: {0}")]
    Store(String),

    #[error("Connection pool closed")]
    PoolClosed,

    #[error("Request timed out")]
    RequestTimeout,

    #[error("Client closed")]
    ClientClosed,
}

pub type Result<T> = std::result::Result<T, ClientError>;
