//! Host side of the script runner: heap lifecycle over a chosen allocator
//! provider, the protected execution pipeline, and the file loader.

mod allocator;
mod config;
mod error;
pub mod fault;
mod heap;
mod loader;
mod pipeline;
mod plugins;
mod watchdog;

pub use config::{DebuggerConfig, HostConfig, LimitsConfig, MemoryLimit};
pub use error::{ConfigError, HeapCreationError, LoadError};
pub use heap::{
    DumpStage, EngineHeap, EngineUsage, HeapDump, HeapState, InterruptCause, TeardownReport,
};
pub use loader::load_and_run;
pub use pipeline::{
    Diagnostic, ExecutionResult, FailureKind, Mode, ScriptFailure, ScriptUnit, Streams,
    diagnostic_of, execute,
};
pub use plugins::{Plugin, PluginSet, PrintPlugin};
pub use watchdog::Watchdog;

pub use jsh_alloc;
pub use jsh_debug;
pub use rquickjs;
