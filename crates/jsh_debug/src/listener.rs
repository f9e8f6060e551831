use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpStream};

use socket2::{Domain, Protocol, Socket, Type};

use crate::{DebugError, DebugSession, SocketTransport};

/// Well-known port of the debugger bridge.
pub const DEFAULT_DEBUG_PORT: u16 = 9091;

pub fn default_debug_addr() -> SocketAddr {
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, DEFAULT_DEBUG_PORT))
}

/// Listening socket for exactly one debugger connection.
#[derive(Debug)]
pub struct DebugListener {
    socket: Socket,
    local: SocketAddr,
}

impl DebugListener {
    /// Binds with `SO_REUSEADDR` so a restarted host can reclaim the port
    /// while the previous connection sits in `TIME_WAIT`.
    pub fn bind(addr: SocketAddr) -> Result<Self, DebugError> {
        let bind_err = |source| DebugError::Bind { addr, source };
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
            .map_err(bind_err)?;
        socket.set_reuse_address(true).map_err(bind_err)?;
        socket.bind(&addr.into()).map_err(bind_err)?;
        socket.listen(1).map_err(bind_err)?;
        let local = socket
            .local_addr()
            .map_err(bind_err)?
            .as_socket()
            .unwrap_or(addr);
        tracing::info!(%local, "debugger listening");
        Ok(Self { socket, local })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    /// Blocks until one peer connects. The listening socket is closed
    /// afterwards, so no second client can queue up.
    pub fn accept(self) -> Result<DebugSession<SocketTransport>, DebugError> {
        let (conn, _) = self.socket.accept().map_err(DebugError::Accept)?;
        let transport = SocketTransport::new(TcpStream::from(conn)).map_err(DebugError::Accept)?;
        tracing::info!(peer = %transport.peer_addr(), "debugger connected");
        Ok(DebugSession::connected(transport))
    }
}
