//! Allocation event log.
//!
//! Line format, one event per line:
//! `A <ptr> <size>`, `R <old> <old-size> <new> <new-size>`, `F <ptr> <size>`.
//! A failed allocation is logged with a null pointer.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use crate::block;
use crate::error::ProviderInitError;
use crate::{AllocStats, AllocatorProvider, Capabilities, ProviderKind, SystemProvider};

pub struct LoggingProvider {
    inner: SystemProvider,
    path: Option<PathBuf>,
    sink: Option<Box<dyn Write>>,
}

impl LoggingProvider {
    /// Logs to `path`, opened (and truncated) by [`AllocatorProvider::init`].
    pub fn to_file(path: impl Into<PathBuf>) -> Self {
        Self {
            inner: SystemProvider::new(),
            path: Some(path.into()),
            sink: None,
        }
    }

    /// Logs to an already open writer.
    pub fn to_writer(sink: Box<dyn Write>) -> Self {
        Self {
            inner: SystemProvider::new(),
            path: None,
            sink: Some(sink),
        }
    }

    fn record(&mut self, line: std::fmt::Arguments<'_>) {
        // Write errors are dropped: the log must not change allocation behaviour.
        if let Some(sink) = self.sink.as_mut() {
            let _ = sink.write_fmt(line);
            let _ = sink.write_all(b"\n");
        }
    }
}

impl AllocatorProvider for LoggingProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Logging
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            event_log: true,
            ..Capabilities::default()
        }
    }

    fn init(&mut self) -> Result<(), ProviderInitError> {
        if self.sink.is_some() {
            return Ok(());
        }
        let Some(path) = self.path.clone() else {
            return Ok(());
        };
        let file = File::create(&path).map_err(|source| ProviderInitError::LogSink {
            path: path.clone(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "allocation log opened");
        self.sink = Some(Box::new(BufWriter::new(file)));
        Ok(())
    }

    fn alloc(&mut self, size: usize) -> *mut u8 {
        let p = self.inner.alloc(size);
        self.record(format_args!("A {p:p} {size}"));
        p
    }

    unsafe fn realloc(&mut self, ptr: *mut u8, size: usize) -> *mut u8 {
        let old = unsafe { block::usable_size(ptr) };
        let p = unsafe { self.inner.realloc(ptr, size) };
        self.record(format_args!("R {ptr:p} {old} {p:p} {size}"));
        p
    }

    unsafe fn free(&mut self, ptr: *mut u8) {
        let size = unsafe { block::usable_size(ptr) };
        unsafe { self.inner.free(ptr) };
        self.record(format_args!("F {ptr:p} {size}"));
    }

    fn stats(&self) -> AllocStats {
        self.inner.stats()
    }

    fn heap_destroyed(&mut self) {
        if let Some(sink) = self.sink.as_mut() {
            let _ = sink.flush();
        }
    }
}

impl Drop for LoggingProvider {
    fn drop(&mut self) {
        if let Some(sink) = self.sink.as_mut() {
            let _ = sink.flush();
        }
    }
}
