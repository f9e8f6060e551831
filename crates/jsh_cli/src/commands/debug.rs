use std::net::SocketAddr;

use jsh_debug::{DebugAgent, DebugListener, DetachTag};
use jsh_runtime::EngineHeap;

/// Blocks until one debugger connects, then hands it to the heap. Any
/// failure is a warning and the run continues without a debugger.
pub(crate) fn attach(heap: &EngineHeap, addr: SocketAddr) {
    let listener = match DebugListener::bind(addr) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("warning: debugger unavailable: {e}");
            return;
        }
    };
    eprintln!("debugger enabled, waiting for connection on {}", listener.local_addr());
    let session = match listener.accept() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("warning: debugger unavailable: {e}");
            return;
        }
    };
    let tag = DetachTag(std::process::id() as usize);
    let agent = DebugAgent::attach(
        session,
        |reason, tag| eprintln!("debugger detached ({reason}), tag {:#x}", tag.0),
        tag,
    );
    match agent {
        Ok(agent) => {
            eprintln!("debugger connected");
            heap.attach_debugger(agent);
        }
        Err(e) => eprintln!("warning: debugger unavailable: {e}"),
    }
}
