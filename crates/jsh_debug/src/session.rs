//! Attach/detach lifecycle around a connected transport.

use std::fmt;
use std::io;

use crate::{DebugError, DebugTransport};

/// Lifecycle of an accepted connection. The states before it are carried
/// by type: no listener is idle, a live [`DebugListener`](crate::DebugListener)
/// is listening, and `accept` yields a session already `Connected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    Attached,
    Detached,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionState::Connected => "connected",
            SessionState::Attached => "attached",
            SessionState::Detached => "detached",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetachReason {
    PeerClosed,
    Io(io::ErrorKind),
    Protocol(String),
    Requested,
}

impl fmt::Display for DetachReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetachReason::PeerClosed => f.write_str("peer closed the connection"),
            DetachReason::Io(kind) => write!(f, "transport error: {kind}"),
            DetachReason::Protocol(msg) => write!(f, "protocol error: {msg}"),
            DetachReason::Requested => f.write_str("detach requested"),
        }
    }
}

/// Host context handed back to the detach callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetachTag(pub usize);

pub type DetachedFn = Box<dyn FnOnce(DetachReason, DetachTag) + Send>;

/// One debugger connection.
///
/// Every transport primitive goes through the session. Any end-of-stream or
/// I/O error detaches; after that the transport is dropped, the primitives
/// return 0 without touching it, and the callback has fired exactly once.
pub struct DebugSession<T: DebugTransport> {
    transport: Option<T>,
    state: SessionState,
    on_detached: Option<(DetachedFn, DetachTag)>,
}

impl<T: DebugTransport> DebugSession<T> {
    pub fn connected(transport: T) -> Self {
        Self {
            transport: Some(transport),
            state: SessionState::Connected,
            on_detached: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_attached(&self) -> bool {
        self.state == SessionState::Attached
    }

    pub fn attach<F>(&mut self, on_detached: F, tag: DetachTag) -> Result<(), DebugError>
    where
        F: FnOnce(DetachReason, DetachTag) + Send + 'static,
    {
        if self.state != SessionState::Connected {
            return Err(DebugError::State {
                actual: self.state,
                expected: SessionState::Connected,
            });
        }
        self.on_detached = Some((Box::new(on_detached), tag));
        self.state = SessionState::Attached;
        tracing::debug!(tag = tag.0, "debugger attached");
        Ok(())
    }

    /// Terminal transition. Later calls are no-ops.
    pub fn detach(&mut self, reason: DetachReason) {
        if self.state == SessionState::Detached {
            return;
        }
        if let Some(mut transport) = self.transport.take() {
            let _ = transport.write_flush();
        }
        self.state = SessionState::Detached;
        tracing::info!(%reason, "debugger detached");
        if let Some((callback, tag)) = self.on_detached.take() {
            callback(reason, tag);
        }
    }

    #[cfg(test)]
    pub(crate) fn transport_mut_for_tests(&mut self) -> &mut T {
        self.transport.as_mut().unwrap()
    }

    fn live(&mut self) -> Option<&mut T> {
        if self.is_attached() {
            self.transport.as_mut()
        } else {
            None
        }
    }

    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        if buf.is_empty() {
            return 0;
        }
        let Some(transport) = self.live() else {
            return 0;
        };
        match transport.read(buf) {
            Ok(0) => {
                self.detach(DetachReason::PeerClosed);
                0
            }
            Ok(n) => n,
            Err(e) => {
                self.detach(DetachReason::Io(e.kind()));
                0
            }
        }
    }

    /// Writes all of `buf`; returns the byte count or 0 after detaching.
    pub fn write(&mut self, buf: &[u8]) -> usize {
        let Some(transport) = self.live() else {
            return 0;
        };
        let mut done = 0;
        while done < buf.len() {
            match transport.write(&buf[done..]) {
                Ok(0) => {
                    self.detach(DetachReason::PeerClosed);
                    return 0;
                }
                Ok(n) => done += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    self.detach(DetachReason::Io(e.kind()));
                    return 0;
                }
            }
        }
        done
    }

    pub fn peek(&mut self) -> usize {
        let Some(transport) = self.live() else {
            return 0;
        };
        match transport.peek() {
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                self.detach(DetachReason::PeerClosed);
                0
            }
            Err(e) => {
                self.detach(DetachReason::Io(e.kind()));
                0
            }
        }
    }

    pub fn read_flush(&mut self) {
        if let Some(transport) = self.live() {
            if let Err(e) = transport.read_flush() {
                self.detach(DetachReason::Io(e.kind()));
            }
        }
    }

    pub fn write_flush(&mut self) {
        if let Some(transport) = self.live() {
            if let Err(e) = transport.write_flush() {
                self.detach(DetachReason::Io(e.kind()));
            }
        }
    }
}

impl<T: DebugTransport> Drop for DebugSession<T> {
    fn drop(&mut self) {
        if self.is_attached() {
            self.detach(DetachReason::Requested);
        }
    }
}

impl<T: DebugTransport> fmt::Debug for DebugSession<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebugSession")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
