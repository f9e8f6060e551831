#![allow(dead_code)]

use jsh_alloc::{ProviderKind, ProviderRegistry};
use jsh_runtime::{EngineHeap, ExecutionResult, HostConfig, Mode, PluginSet, ScriptUnit, Streams};

pub fn heap_with(config: &HostConfig) -> EngineHeap {
    let mut diag = Vec::new();
    EngineHeap::create(
        &ProviderRegistry::standard(),
        config,
        PluginSet::builtins(),
        &mut diag,
    )
    .unwrap()
}

pub fn heap() -> EngineHeap {
    heap_with(&HostConfig::default())
}

pub fn heap_on(kind: ProviderKind) -> EngineHeap {
    let mut config = HostConfig::default();
    config.alloc.provider = kind;
    heap_with(&config)
}

pub struct Run {
    pub result: ExecutionResult,
    pub out: String,
    pub err: String,
}

pub fn run(heap: &EngineHeap, source: &str, mode: Mode) -> Run {
    let mut out = Vec::new();
    let mut err = Vec::new();
    let result = jsh_runtime::execute(
        heap,
        &ScriptUnit::new(source.as_bytes(), "test.js"),
        mode,
        &mut Streams::new(&mut out, &mut err),
    );
    Run {
        result,
        out: String::from_utf8(out).unwrap(),
        err: String::from_utf8(err).unwrap(),
    }
}
