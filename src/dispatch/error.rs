use thiserror::Error;

use crate::error::BrokerError;

/// Error returned by [`DispatchHandle`](super::DispatchHandle) calls.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Request queue is full (try again later or use async `call`).
    #[error("dispatch queue full")]
    Full,

    /// Dispatcher is not running, or dropped the request without replying.
    #[error("dispatcher channel closed")]
    Closed,

    /// The broker rejected the request.
    #[error(transparent)]
    Broker(#[from] BrokerError),
}

impl DispatchError {
    /// Returns a short stable label (snake_case) for use in logs/events.
    pub fn as_label(&self) -> &'static str {
        match self {
            DispatchError::Full => "dispatch_full",
            DispatchError::Closed => "dispatch_closed",
            DispatchError::Broker(e) => e.as_label(),
        }
    }
}
