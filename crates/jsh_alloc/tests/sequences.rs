use std::ptr;

use jsh_alloc::{
    AllocatorProvider, ExternalProvider, FailurePolicy, HybridConfig, HybridProvider,
    LoggingProvider, ProviderHandle, ProviderKind, SystemProvider, TortureProvider,
};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Alloc(usize),
    Realloc(usize, usize),
    Free(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0usize..3000).prop_map(Op::Alloc),
        (any::<usize>(), 0usize..3000).prop_map(|(i, n)| Op::Realloc(i, n)),
        any::<usize>().prop_map(Op::Free),
    ]
}

fn providers() -> Vec<Box<dyn AllocatorProvider>> {
    let mut all: Vec<Box<dyn AllocatorProvider>> = vec![
        Box::new(SystemProvider::new()),
        Box::new(LoggingProvider::to_writer(Box::new(std::io::sink()))),
        Box::new(TortureProvider::new(FailurePolicy::EveryNth(5)).armed()),
        Box::new(HybridProvider::new(HybridConfig::default())),
        Box::new(ExternalProvider::mimalloc()),
    ];
    for p in &mut all {
        p.init().expect("provider init");
    }
    all
}

/// Replays `ops` against a handle, keeping a byte pattern in every live block
/// to catch blocks that get mixed up or truncated.
fn replay(handle: &ProviderHandle, ops: &[Op]) {
    let mut live: Vec<(*mut u8, usize, u8)> = Vec::new();
    for (step, op) in ops.iter().enumerate() {
        let tag = step as u8;
        match *op {
            Op::Alloc(n) => {
                let p = handle.allocate(n);
                if !p.is_null() {
                    unsafe { ptr::write_bytes(p, tag, n) };
                    live.push((p, n, tag));
                }
            }
            Op::Realloc(i, n) if !live.is_empty() => {
                let idx = i % live.len();
                let (p, old, t) = live[idx];
                let q = unsafe { handle.reallocate(p, n) };
                if n == 0 {
                    assert!(q.is_null());
                    live.swap_remove(idx);
                } else if !q.is_null() {
                    let kept = old.min(n);
                    let bytes = unsafe { std::slice::from_raw_parts(q, kept) };
                    assert!(bytes.iter().all(|b| *b == t), "contents lost on realloc");
                    unsafe { ptr::write_bytes(q, t, n) };
                    live[idx] = (q, n, t);
                }
            }
            Op::Free(i) if !live.is_empty() => {
                let (p, n, t) = live.swap_remove(i % live.len());
                let bytes = unsafe { std::slice::from_raw_parts(p, n) };
                assert!(bytes.iter().all(|b| *b == t), "contents clobbered");
                unsafe { handle.free(p) };
            }
            _ => {}
        }
    }
    for (p, _, _) in live {
        unsafe { handle.free(p) };
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn every_variant_balances(ops in prop::collection::vec(op(), 0..200)) {
        for provider in providers() {
            let handle = ProviderHandle::new(provider);
            replay(&handle, &ops);
            let stats = handle.stats();
            prop_assert!(stats.is_balanced(), "{}: {}", handle.kind(), stats);
        }
    }
}

#[test]
fn realloc_from_null_and_to_zero_follow_malloc_conventions() {
    for provider in providers() {
        let kind = provider.kind();
        let handle = ProviderHandle::new(provider);
        unsafe {
            let p = handle.reallocate(ptr::null_mut(), 64);
            assert!(!p.is_null(), "{kind}");
            assert!(ProviderHandle::usable_size(p) >= 64, "{kind}");
            assert!(handle.reallocate(p, 0).is_null(), "{kind}");
            handle.free(ptr::null_mut());
        }
        assert!(handle.stats().is_balanced(), "{kind}");
    }
}

#[test]
fn only_hybrid_and_external_offer_introspection() {
    let introspecting: Vec<ProviderKind> = providers()
        .into_iter()
        .filter(|p| p.capabilities().introspection)
        .map(|p| p.kind())
        .collect();
    assert_eq!(introspecting, [ProviderKind::Hybrid, ProviderKind::External]);
}
