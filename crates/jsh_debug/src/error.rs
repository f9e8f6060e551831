use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use crate::SessionState;

#[derive(Debug, Error)]
pub enum DebugError {
    #[error("failed to bind debugger socket on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("failed to accept debugger connection: {0}")]
    Accept(#[source] io::Error),
    #[error("debug session is {actual}, expected {expected}")]
    State {
        actual: SessionState,
        expected: SessionState,
    },
}
