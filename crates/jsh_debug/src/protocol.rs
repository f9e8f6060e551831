//! Line-framed command protocol spoken over an attached session.
//!
//! Requests are single lines of UTF-8 text terminated by `\n`:
//!
//! | request     | reply                                  |
//! |-------------|----------------------------------------|
//! | `ping`      | `pong`                                 |
//! | `status`    | `status running <file>` or `status idle` |
//! | `interrupt` | `ok interrupt`, then the script is aborted at the next checkpoint |
//! | `detach`    | `ok detach`, then the session closes   |
//!
//! Unknown requests get `error unknown-command <word>`. The host pushes
//! `script-start <file>` and `script-end <file> ok|error` notifications.

use crate::{DebugError, DebugSession, DebugTransport, DetachReason, DetachTag, SessionState};

/// Longest request line accepted before the peer is cut off.
pub const MAX_LINE: usize = 4096;

/// Bytes taken off the wire per checkpoint. The rest waits for the next one,
/// so a chatty peer cannot keep the interrupt hook from returning.
pub const MAX_POLL_BYTES: usize = 4 * MAX_LINE;

const GREETING: &str = "jsh-debug 1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    Continue,
    Interrupt,
    Detached,
}

#[derive(Debug)]
pub struct DebugAgent<T: DebugTransport> {
    session: DebugSession<T>,
    pending: Vec<u8>,
    running: Option<String>,
}

impl<T: DebugTransport> DebugAgent<T> {
    /// Attaches `session` and greets the peer.
    pub fn attach<F>(
        mut session: DebugSession<T>,
        on_detached: F,
        tag: DetachTag,
    ) -> Result<Self, DebugError>
    where
        F: FnOnce(DetachReason, DetachTag) + Send + 'static,
    {
        session.attach(on_detached, tag)?;
        let mut agent = Self {
            session,
            pending: Vec::new(),
            running: None,
        };
        agent.send(GREETING);
        Ok(agent)
    }

    pub fn session(&self) -> &DebugSession<T> {
        &self.session
    }

    pub fn is_attached(&self) -> bool {
        self.session.is_attached()
    }

    /// Answers the requests available without blocking, taking at most
    /// [`MAX_POLL_BYTES`] off the wire. Called from the engine's interrupt
    /// hook.
    pub fn poll(&mut self) -> Checkpoint {
        let mut verdict = Checkpoint::Continue;
        let mut taken = 0;
        while taken < MAX_POLL_BYTES {
            if !self.session.is_attached() {
                return Checkpoint::Detached;
            }
            let ready = self.session.peek();
            if ready == 0 {
                break;
            }
            let mut buf = vec![0u8; ready.min(MAX_LINE).min(MAX_POLL_BYTES - taken)];
            let n = self.session.read(&mut buf);
            if n == 0 {
                break;
            }
            taken += n;
            self.pending.extend_from_slice(&buf[..n]);
            match self.drain_lines() {
                Checkpoint::Continue => {}
                Checkpoint::Interrupt => verdict = Checkpoint::Interrupt,
                Checkpoint::Detached => return Checkpoint::Detached,
            }
        }
        self.session.write_flush();
        if self.session.is_attached() {
            verdict
        } else {
            Checkpoint::Detached
        }
    }

    fn drain_lines(&mut self) -> Checkpoint {
        let mut verdict = Checkpoint::Continue;
        while let Some(end) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=end).collect();
            let Ok(line) = std::str::from_utf8(&raw[..end]) else {
                self.session
                    .detach(DetachReason::Protocol("request is not valid UTF-8".into()));
                return Checkpoint::Detached;
            };
            match self.handle(line.trim_end_matches('\r').trim()) {
                Checkpoint::Continue => {}
                Checkpoint::Interrupt => verdict = Checkpoint::Interrupt,
                Checkpoint::Detached => return Checkpoint::Detached,
            }
        }
        if self.pending.len() > MAX_LINE {
            self.session.detach(DetachReason::Protocol(format!(
                "request line longer than {MAX_LINE} bytes"
            )));
            return Checkpoint::Detached;
        }
        verdict
    }

    fn handle(&mut self, line: &str) -> Checkpoint {
        let word = line.split_whitespace().next().unwrap_or("");
        match word {
            "" => Checkpoint::Continue,
            "ping" => {
                self.send("pong");
                Checkpoint::Continue
            }
            "status" => {
                let reply = match &self.running {
                    Some(file) => format!("status running {file}"),
                    None => "status idle".to_string(),
                };
                self.send(&reply);
                Checkpoint::Continue
            }
            "interrupt" => {
                self.send("ok interrupt");
                tracing::info!("debugger requested interrupt");
                Checkpoint::Interrupt
            }
            "detach" => {
                self.send("ok detach");
                self.session.detach(DetachReason::Requested);
                Checkpoint::Detached
            }
            other => {
                tracing::debug!(command = other, "unknown debugger command");
                self.send(&format!("error unknown-command {other}"));
                Checkpoint::Continue
            }
        }
    }

    pub fn script_started(&mut self, file: &str) {
        self.running = Some(file.to_string());
        self.send(&format!("script-start {file}"));
        self.session.write_flush();
    }

    pub fn script_finished(&mut self, file: &str, ok: bool) {
        self.running = None;
        let outcome = if ok { "ok" } else { "error" };
        self.send(&format!("script-end {file} {outcome}"));
        self.session.write_flush();
    }

    pub fn detach(&mut self) {
        if self.session.state() == SessionState::Attached {
            self.session.write_flush();
        }
        self.session.detach(DetachReason::Requested);
    }

    fn send(&mut self, line: &str) {
        if self.session.write(line.as_bytes()) == line.len() {
            self.session.write(b"\n");
        }
    }
}
