//! Debugger bridge: one TCP peer, a guarded session, and a small line
//! protocol checked from the engine's interrupt hook.

mod error;
mod listener;
mod protocol;
mod session;
mod transport;

pub use error::DebugError;
pub use listener::{DEFAULT_DEBUG_PORT, DebugListener, default_debug_addr};
pub use protocol::{Checkpoint, DebugAgent, MAX_LINE, MAX_POLL_BYTES};
pub use session::{DebugSession, DetachReason, DetachTag, DetachedFn, SessionState};
pub use transport::{DebugTransport, SocketTransport};
