mod common;

use common::{heap_on, heap_with, run};
use jsh_alloc::{AllocatorProvider, FailurePolicy, ProviderKind, ProviderRegistry, TortureProvider};
use jsh_runtime::{DumpStage, EngineHeap, HeapState, HostConfig, Mode, PluginSet};

fn create(registry: &ProviderRegistry, config: &HostConfig) -> (Option<EngineHeap>, String) {
    let mut diag = Vec::new();
    let heap = EngineHeap::create(registry, config, PluginSet::builtins(), &mut diag);
    (heap.ok(), String::from_utf8(diag).unwrap())
}

fn requesting(kind: ProviderKind) -> HostConfig {
    let mut config = HostConfig::default();
    config.alloc.provider = kind;
    config
}

#[test]
fn every_provider_tears_down_without_leaks() {
    for kind in ProviderKind::PRIORITY {
        let heap = heap_on(kind);
        assert_eq!(heap.provider_kind(), kind);
        assert_eq!(heap.state(), HeapState::Created);
        run(&heap, "var xs = []; for (var i = 0; i < 500; i++) xs.push({ i, s: 'v' + i }); xs.length", Mode::Batch);
        run(&heap, "throw new TypeError('after allocating')", Mode::Batch);
        let report = heap.destroy();
        assert!(report.is_leak_free(), "{kind}: {}", report.stats);
    }
}

#[test]
fn introspecting_provider_dumps_around_teardown() {
    let heap = heap_on(ProviderKind::Hybrid);
    let created = heap.creation_dump().expect("dump after creation");
    assert_eq!(created.stage, DumpStage::AfterCreate);
    assert!(created.provider.contains("class"));

    run(&heap, "var o = { a: [1, 2, 3] }; JSON.stringify(o)", Mode::Batch);
    let report = heap.destroy();
    let stages: Vec<DumpStage> = report.dumps.iter().map(|d| d.stage).collect();
    assert_eq!(
        stages,
        [DumpStage::BeforeGc, DumpStage::AfterGc, DumpStage::AfterDestroy]
    );
    assert!(report.dumps[0].engine.is_some());
    assert!(report.dumps[2].engine.is_none());
    assert_eq!(report.dumps[2].stats.live_blocks, 0);
    assert!(report.is_leak_free());
}

#[test]
fn plain_providers_skip_dumps() {
    let heap = heap_on(ProviderKind::Default);
    assert!(heap.creation_dump().is_none());
    assert!(heap.destroy().dumps.is_empty());
}

#[test]
fn missing_provider_warns_and_falls_back_to_default() {
    let mut registry = ProviderRegistry::standard();
    registry.remove(ProviderKind::Hybrid);
    let (heap, diag) = create(&registry, &requesting(ProviderKind::Hybrid));
    let heap = heap.expect("default heap");
    assert_eq!(heap.provider_kind(), ProviderKind::Default);
    assert_eq!(diag, "warning: no hybrid allocator support\n");
    assert!(heap.destroy().is_leak_free());
}

#[test]
fn provider_init_failure_is_reported_then_skipped() {
    let mut config = requesting(ProviderKind::Hybrid);
    config.alloc.hybrid.classes.clear();
    let (heap, diag) = create(&ProviderRegistry::standard(), &config);
    assert_eq!(heap.expect("default heap").provider_kind(), ProviderKind::Default);
    assert!(diag.starts_with("failed to init hybrid allocator"), "{diag}");
}

#[test]
fn heap_construction_failure_tries_the_next_candidate() {
    // Refuses every allocation, including the runtime's own.
    let mut registry = ProviderRegistry::standard();
    registry.register(ProviderKind::Torture, |_| {
        Box::new(TortureProvider::new(FailurePolicy::EveryNth(1)).armed())
            as Box<dyn AllocatorProvider>
    });
    let (heap, diag) = create(&registry, &requesting(ProviderKind::Torture));
    assert_eq!(heap.expect("default heap").provider_kind(), ProviderKind::Default);
    assert!(
        diag.starts_with("failed to create engine heap with torture allocator"),
        "{diag}"
    );
}

#[test]
fn no_candidate_left_is_a_creation_error() {
    let (heap, diag) = create(&ProviderRegistry::empty(), &requesting(ProviderKind::Logging));
    assert!(heap.is_none());
    assert_eq!(
        diag,
        "warning: no logging allocator support\nwarning: no default allocator support\n"
    );

    let mut diag = Vec::new();
    let err = EngineHeap::create(
        &ProviderRegistry::empty(),
        &HostConfig::default(),
        PluginSet::new(),
        &mut diag,
    )
    .unwrap_err();
    assert_eq!(err.to_string(), "failed to create engine heap");
    assert_eq!(err.attempts.len(), 1);
}

#[test]
fn torture_batch_leaves_heap_destructible() {
    let mut config = requesting(ProviderKind::Torture);
    config.alloc.torture.fail_every = Some(64);
    let heap = heap_with(&config);
    let scripts = [
        "var a = []; for (var i = 0; i < 200; i++) a.push('item' + i); a.join(',').length",
        "throw new Error('deliberate')",
        "JSON.parse(JSON.stringify({ deep: { deeper: [1, 2, { x: 'y' }] } }))",
        "let = ;",
        "Object.keys(globalThis).map(String).sort()",
    ];
    for src in scripts {
        run(&heap, src, Mode::Batch);
        run(&heap, src, Mode::Interactive);
    }
    let report = heap.destroy();
    assert_eq!(report.provider, ProviderKind::Torture);
    assert!(report.is_leak_free(), "{}", report.stats);
    assert!(report.stats.failures > 0);
}

#[test]
fn logging_provider_writes_its_side_channel() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("alloc.log");
    let mut config = requesting(ProviderKind::Logging);
    config.alloc.log_path = log.clone();
    let heap = heap_with(&config);
    run(&heap, "'x'.repeat(4096)", Mode::Batch);
    assert!(heap.destroy().is_leak_free());

    let text = std::fs::read_to_string(&log).unwrap();
    assert!(text.lines().any(|l| l.starts_with("A ")));
    assert!(text.lines().any(|l| l.starts_with("F ")));
}
