use thiserror::Error;

use super::types::RequestId;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("TWS or IB Gateway is not running")]
    GatewayNotRunning,
    #[error("Host {0} is not reachable")]
    HostUnreachable(String),
    #[error("Connection to {host}:{port} timed out after {secs}s")]
    ConnectTimeout { host: String, port: u16, secs: u64 },
    #[error("Handshake failed: {0}")]
    Handshake(String),
    #[error("Not connected")]
    NotConnected,
    #[error("Upstream rejected request {request_id}: {message}")]
    Upstream { request_id: RequestId, message: String },
    #[error("IB API error: {0}")]
    Api(String),
    #[error("{0} request timed out")]
    RequestTimeout(&'static str),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

pub type Result<T> = std::result::Result<T, BrokerError>;
