//! Engine heap lifecycle: provider fallback on creation, cooperative
//! interrupt hook, and a teardown that verifies the provider is balanced.

use std::fmt;
use std::io::Write;
use std::sync::Arc;

use jsh_alloc::{AllocStats, ProviderHandle, ProviderInitError, ProviderKind, ProviderRegistry};
use jsh_debug::{Checkpoint, DebugAgent, SocketTransport};
use parking_lot::Mutex;
use rquickjs::{Context, Ctx, Runtime};

use crate::allocator::EngineAllocator;
use crate::{HeapCreationError, HostConfig, PluginSet, Watchdog};

/// Observable state of a live heap. Before [`EngineHeap::create`] returns
/// there is no heap value at all, and `destroy` consumes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapState {
    Created,
    DebuggerAttached,
    Destroyed,
}

impl fmt::Display for HeapState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HeapState::Created => "created",
            HeapState::DebuggerAttached => "debugger-attached",
            HeapState::Destroyed => "destroyed",
        })
    }
}

/// Why the interrupt hook stopped a script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptCause {
    Timeout,
    Debugger,
}

/// State reachable from the engine's interrupt hook.
#[derive(Default)]
struct Hooks {
    watchdog: Watchdog,
    debugger: Mutex<Option<DebugAgent<SocketTransport>>>,
    cause: Mutex<Option<InterruptCause>>,
}

impl Hooks {
    /// Returns true to make the engine abort the running script.
    fn on_interrupt(&self) -> bool {
        if self.watchdog.expired() {
            *self.cause.lock() = Some(InterruptCause::Timeout);
            return true;
        }
        if self.poll_debugger() == Checkpoint::Interrupt {
            *self.cause.lock() = Some(InterruptCause::Debugger);
            return true;
        }
        false
    }

    fn poll_debugger(&self) -> Checkpoint {
        let mut slot = self.debugger.lock();
        let Some(agent) = slot.as_mut() else {
            return Checkpoint::Detached;
        };
        let verdict = agent.poll();
        if verdict == Checkpoint::Detached {
            *slot = None;
        }
        verdict
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpStage {
    AfterCreate,
    BeforeGc,
    AfterGc,
    AfterDestroy,
}

impl fmt::Display for DumpStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DumpStage::AfterCreate => "after heap creation",
            DumpStage::BeforeGc => "before gc",
            DumpStage::AfterGc => "after gc",
            DumpStage::AfterDestroy => "after heap destruction",
        })
    }
}

/// Engine-side counters from the runtime's memory usage report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineUsage {
    pub malloc_count: i64,
    pub malloc_size: i64,
    pub obj_count: i64,
}

impl fmt::Display for EngineUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "engine: {} blocks, {} bytes, {} objects",
            self.malloc_count, self.malloc_size, self.obj_count
        )
    }
}

#[derive(Debug, Clone)]
pub struct HeapDump {
    pub stage: DumpStage,
    pub provider: String,
    /// Absent once the runtime is gone.
    pub engine: Option<EngineUsage>,
    pub stats: AllocStats,
}

impl fmt::Display for HeapDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "heap dump ({}):", self.stage)?;
        writeln!(f, "{}", self.provider.trim_end())?;
        if let Some(engine) = &self.engine {
            writeln!(f, "  {engine}")?;
        }
        write!(f, "  {}", self.stats)
    }
}

/// What teardown observed.
#[derive(Debug, Clone)]
pub struct TeardownReport {
    pub provider: ProviderKind,
    pub dumps: Vec<HeapDump>,
    pub stats: AllocStats,
}

impl TeardownReport {
    /// Zero outstanding allocations once the heap is gone.
    pub fn is_leak_free(&self) -> bool {
        self.stats.is_balanced()
    }
}

/// Runtime and context of one live heap. The context is declared first so
/// it is dropped before the runtime.
struct Engine {
    context: Context,
    runtime: Runtime,
}

/// The engine heap, owned by the host for the whole process run.
///
/// `destroy` consumes the heap, so use after destruction cannot be
/// expressed. Dropping without `destroy` still releases the engine in the
/// right order but skips the dumps and leak check.
pub struct EngineHeap {
    engine: Engine,
    provider: ProviderHandle,
    plugins: PluginSet,
    hooks: Arc<Hooks>,
    creation_dump: Option<HeapDump>,
}

impl EngineHeap {
    /// Walks the provider candidates for the requested kind (the kind itself,
    /// then `Default`) and returns the first heap that comes up.
    ///
    /// Every skipped candidate is reported on `diag` as one flushed line.
    pub fn create(
        registry: &ProviderRegistry,
        config: &HostConfig,
        plugins: PluginSet,
        diag: &mut dyn Write,
    ) -> Result<Self, HeapCreationError> {
        let requested = config.alloc.provider;
        let mut attempts = Vec::new();
        for kind in registry.candidates(requested) {
            let provider = match registry.select(kind, &config.alloc) {
                Ok(provider) => provider,
                Err(e @ ProviderInitError::Unavailable(_)) => {
                    report(diag, &mut attempts, format!("warning: {e}"));
                    continue;
                }
                Err(e) => {
                    report(diag, &mut attempts, e.to_string());
                    continue;
                }
            };
            match Self::build(provider, config, &plugins) {
                Ok(mut heap) => {
                    if kind != requested {
                        tracing::info!(%requested, using = %kind, "fell back to another allocator");
                    }
                    heap.plugins = plugins;
                    return Ok(heap);
                }
                Err(e) => report(
                    diag,
                    &mut attempts,
                    format!("failed to create engine heap with {kind} allocator: {e}"),
                ),
            }
        }
        Err(HeapCreationError {
            requested,
            attempts,
        })
    }

    fn build(
        provider: ProviderHandle,
        config: &HostConfig,
        plugins: &PluginSet,
    ) -> rquickjs::Result<Self> {
        let runtime = Runtime::new_with_alloc(EngineAllocator::new(provider.clone()))?;
        runtime.set_memory_limit(config.limits.memory.bytes());
        if let Some(size) = config.limits.stack_size {
            runtime.set_max_stack_size(size);
        }
        let hooks = Arc::new(Hooks {
            watchdog: Watchdog::new(config.limits.timeout()),
            ..Hooks::default()
        });
        let hook = hooks.clone();
        runtime.set_interrupt_handler(Some(Box::new(move || hook.on_interrupt())));

        let context = Context::full(&runtime)?;
        context.with(|ctx| plugins.install(&ctx))?;
        provider.heap_created();

        let mut heap = Self {
            engine: Engine { context, runtime },
            provider,
            plugins: PluginSet::new(),
            hooks,
            creation_dump: None,
        };
        tracing::info!(provider = %heap.provider.kind(), state = %heap.state(), "engine heap ready");
        if heap.introspects() {
            let dump = heap.snapshot(DumpStage::AfterCreate);
            tracing::info!("{dump}");
            heap.creation_dump = Some(dump);
        }
        Ok(heap)
    }

    pub fn provider_kind(&self) -> ProviderKind {
        self.provider.kind()
    }

    pub fn provider(&self) -> &ProviderHandle {
        &self.provider
    }

    pub fn state(&self) -> HeapState {
        match self.hooks.debugger.lock().as_ref() {
            Some(agent) if agent.is_attached() => HeapState::DebuggerAttached,
            _ => HeapState::Created,
        }
    }

    pub fn watchdog(&self) -> &Watchdog {
        &self.hooks.watchdog
    }

    /// Runs `f` with the heap's context entered.
    pub fn with<F, R>(&self, f: F) -> R
    where
        F: for<'js> FnOnce(Ctx<'js>) -> R,
    {
        self.engine.context.with(f)
    }

    pub fn run_gc(&self) {
        self.engine.runtime.run_gc();
    }

    pub fn memory_usage(&self) -> EngineUsage {
        let usage = self.engine.runtime.memory_usage();
        EngineUsage {
            malloc_count: usage.malloc_count,
            malloc_size: usage.malloc_size,
            obj_count: usage.obj_count,
        }
    }

    pub fn creation_dump(&self) -> Option<&HeapDump> {
        self.creation_dump.as_ref()
    }

    fn introspects(&self) -> bool {
        self.provider.capabilities().introspection
    }

    fn snapshot(&self, stage: DumpStage) -> HeapDump {
        HeapDump {
            stage,
            provider: self.provider.dump().unwrap_or_default(),
            engine: Some(self.memory_usage()),
            stats: self.provider.stats(),
        }
    }

    /// Hands the interrupt hook a debugger to poll.
    pub fn attach_debugger(&self, agent: DebugAgent<SocketTransport>) {
        let previous = self.hooks.debugger.lock().replace(agent);
        if let Some(mut previous) = previous {
            previous.detach();
        }
        tracing::info!(state = %HeapState::DebuggerAttached, "debugger bound to heap");
    }

    /// Cooperative checkpoint between units of work.
    pub fn checkpoint(&self) -> Checkpoint {
        self.hooks.poll_debugger()
    }

    pub fn script_started(&self, file: &str) {
        if let Some(agent) = self.hooks.debugger.lock().as_mut() {
            agent.script_started(file);
        }
    }

    pub fn script_finished(&self, file: &str, ok: bool) {
        if let Some(agent) = self.hooks.debugger.lock().as_mut() {
            agent.script_finished(file, ok);
        }
    }

    /// Consumes the interrupt cause recorded by the hook, if any.
    pub(crate) fn take_interrupt(&self) -> Option<InterruptCause> {
        self.hooks.cause.lock().take()
    }

    /// Tears the heap down exactly once.
    ///
    /// With an introspecting provider the heap is dumped, collected, dumped
    /// again, destroyed, and dumped a last time.
    pub fn destroy(self) -> TeardownReport {
        let kind = self.provider.kind();
        let introspect = self.introspects();
        let mut dumps = Vec::new();
        if let Some(mut agent) = self.hooks.debugger.lock().take() {
            agent.detach();
        }
        self.plugins.cleanup();
        if introspect {
            dumps.push(self.snapshot(DumpStage::BeforeGc));
        }
        self.engine.runtime.run_gc();
        if introspect {
            dumps.push(self.snapshot(DumpStage::AfterGc));
        }

        let Self {
            engine, provider, ..
        } = self;
        drop(engine);
        provider.heap_destroyed();
        let stats = provider.stats();
        if introspect {
            dumps.push(HeapDump {
                stage: DumpStage::AfterDestroy,
                provider: provider.dump().unwrap_or_default(),
                engine: None,
                stats,
            });
        }
        for dump in &dumps {
            tracing::info!("{dump}");
        }
        if stats.is_balanced() {
            tracing::debug!(provider = %kind, state = %HeapState::Destroyed, "engine heap destroyed");
        } else {
            tracing::error!(provider = %kind, %stats, "allocations outstanding after heap destruction");
        }
        TeardownReport {
            provider: kind,
            dumps,
            stats,
        }
    }
}

impl fmt::Debug for EngineHeap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHeap")
            .field("provider", &self.provider)
            .field("plugins", &self.plugins)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

fn report(diag: &mut dyn Write, attempts: &mut Vec<String>, line: String) {
    let _ = writeln!(diag, "{line}");
    let _ = diag.flush();
    tracing::debug!("{line}");
    attempts.push(line);
}
