//! Fault-injecting provider for exercising the engine's out-of-memory paths.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;

use crate::block;
use crate::{AllocStats, AllocatorProvider, Capabilities, ProviderKind, SystemProvider};

/// Filled into fresh and grown bytes so reads of uninitialised memory show up.
const SCRIBBLE: u8 = 0xcd;
pub const DEFAULT_FAIL_EVERY: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FailurePolicy {
    Never,
    /// Refuse every Nth allocating call (1-based).
    EveryNth(u64),
    /// Refuse each allocating call with probability `probability`.
    Random { probability: f64, seed: u64 },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TortureConfig {
    pub fail_every: Option<u64>,
    pub probability: Option<f64>,
    pub seed: u64,
}

impl TortureConfig {
    pub fn policy(&self) -> FailurePolicy {
        match (self.fail_every, self.probability) {
            (Some(0), _) => FailurePolicy::Never,
            (Some(n), _) => FailurePolicy::EveryNth(n),
            (None, Some(p)) => FailurePolicy::Random {
                probability: p,
                seed: self.seed,
            }
            .sanitized(),
            (None, None) => FailurePolicy::EveryNth(DEFAULT_FAIL_EVERY),
        }
    }
}

impl FailurePolicy {
    /// Clamps a random probability into `[0, 1]`. A NaN probability has no
    /// meaningful rate and becomes the default schedule.
    pub fn sanitized(self) -> Self {
        match self {
            FailurePolicy::Random { probability, .. } if probability.is_nan() => {
                tracing::warn!("torture probability is NaN, using every {DEFAULT_FAIL_EVERY}th call");
                FailurePolicy::EveryNth(DEFAULT_FAIL_EVERY)
            }
            FailurePolicy::Random { probability, seed } => FailurePolicy::Random {
                probability: probability.clamp(0.0, 1.0),
                seed,
            },
            other => other,
        }
    }
}

/// Refuses allocations according to a [`FailurePolicy`].
///
/// Injection is only armed while a heap is live (between `heap_created` and
/// `heap_destroyed`) unless [`TortureProvider::armed`] is used, so heap
/// construction itself is not sabotaged. Frees and shrinking reallocs never
/// fail.
pub struct TortureProvider {
    inner: SystemProvider,
    policy: FailurePolicy,
    rng: StdRng,
    armed: bool,
    calls: u64,
}

impl TortureProvider {
    pub fn new(policy: FailurePolicy) -> Self {
        let policy = policy.sanitized();
        let seed = match policy {
            FailurePolicy::Random { seed, .. } => seed,
            _ => 0,
        };
        Self {
            inner: SystemProvider::new(),
            policy,
            rng: StdRng::seed_from_u64(seed),
            armed: false,
            calls: 0,
        }
    }

    /// Starts injecting immediately.
    pub fn armed(mut self) -> Self {
        self.armed = true;
        self
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    fn should_fail(&mut self) -> bool {
        if !self.armed {
            return false;
        }
        self.calls += 1;
        match self.policy {
            FailurePolicy::Never => false,
            FailurePolicy::EveryNth(n) => n > 0 && self.calls % n == 0,
            FailurePolicy::Random { probability, .. } => self.rng.gen_bool(probability),
        }
    }
}

impl AllocatorProvider for TortureProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Torture
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            fault_injection: true,
            ..Capabilities::default()
        }
    }

    fn alloc(&mut self, size: usize) -> *mut u8 {
        if self.should_fail() {
            tracing::trace!(size, "torture: refusing allocation");
            return std::ptr::null_mut();
        }
        let p = self.inner.alloc(size);
        if !p.is_null() {
            unsafe { std::ptr::write_bytes(p, SCRIBBLE, size) };
        }
        p
    }

    unsafe fn realloc(&mut self, ptr: *mut u8, size: usize) -> *mut u8 {
        let old = unsafe { block::usable_size(ptr) };
        if size > old && self.should_fail() {
            tracing::trace!(old, size, "torture: refusing reallocation");
            return std::ptr::null_mut();
        }
        let p = unsafe { self.inner.realloc(ptr, size) };
        if !p.is_null() && size > old {
            unsafe { std::ptr::write_bytes(p.add(old), SCRIBBLE, size - old) };
        }
        p
    }

    unsafe fn free(&mut self, ptr: *mut u8) {
        unsafe { self.inner.free(ptr) }
    }

    fn stats(&self) -> AllocStats {
        self.inner.stats()
    }

    fn heap_created(&mut self) {
        self.armed = true;
        self.calls = 0;
    }

    fn heap_destroyed(&mut self) {
        self.armed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_nth_fails_exactly_on_schedule() {
        let mut t = TortureProvider::new(FailurePolicy::EveryNth(3)).armed();
        let mut live = Vec::new();
        let mut refused = Vec::new();
        for i in 1..=9 {
            let p = t.alloc(16);
            if p.is_null() {
                refused.push(i);
            } else {
                live.push(p);
            }
        }
        assert_eq!(refused, [3, 6, 9]);
        for p in live {
            unsafe { t.free(p) };
        }
        assert!(t.stats().is_balanced());
    }

    #[test]
    fn disarmed_until_heap_created() {
        let mut t = TortureProvider::new(FailurePolicy::EveryNth(1));
        let p = t.alloc(8);
        assert!(!p.is_null());
        t.heap_created();
        assert!(t.alloc(8).is_null());
        t.heap_destroyed();
        unsafe { t.free(p) };
        assert!(t.stats().is_balanced());
    }

    #[test]
    fn failed_grow_keeps_old_block() {
        let mut t = TortureProvider::new(FailurePolicy::EveryNth(2)).armed();
        let p = t.alloc(8);
        unsafe {
            std::ptr::copy_nonoverlapping(b"survivor".as_ptr(), p, 8);
            assert!(t.realloc(p, 128).is_null());
            assert_eq!(std::slice::from_raw_parts(p, 8), b"survivor");
            // Shrinking does not count against the schedule.
            let q = t.realloc(p, 4);
            assert!(!q.is_null());
            t.free(q);
        }
        assert!(t.stats().is_balanced());
    }

    #[test]
    fn fresh_memory_is_scribbled() {
        let mut t = TortureProvider::new(FailurePolicy::Never);
        let p = t.alloc(4);
        assert_eq!(unsafe { std::slice::from_raw_parts(p, 4) }, [SCRIBBLE; 4]);
        unsafe { t.free(p) };
    }

    #[test]
    fn random_policy_is_reproducible() {
        let policy = FailurePolicy::Random {
            probability: 0.5,
            seed: 42,
        };
        let pattern = |mut t: TortureProvider| {
            (0..32)
                .map(|_| {
                    let p = t.alloc(8);
                    if p.is_null() {
                        return true;
                    }
                    unsafe { t.free(p) };
                    false
                })
                .collect::<Vec<_>>()
        };
        let a = pattern(TortureProvider::new(policy).armed());
        let b = pattern(TortureProvider::new(policy).armed());
        assert_eq!(a, b);
        assert!(a.iter().any(|f| *f) && a.iter().any(|f| !*f));
    }

    #[test]
    fn config_maps_to_policy() {
        let cfg = TortureConfig::default();
        assert_eq!(cfg.policy(), FailurePolicy::EveryNth(DEFAULT_FAIL_EVERY));
        let cfg = TortureConfig {
            fail_every: Some(0),
            ..TortureConfig::default()
        };
        assert_eq!(cfg.policy(), FailurePolicy::Never);
        let cfg = TortureConfig {
            probability: Some(3.0),
            seed: 7,
            ..TortureConfig::default()
        };
        assert_eq!(
            cfg.policy(),
            FailurePolicy::Random {
                probability: 1.0,
                seed: 7
            }
        );
    }

    #[test]
    fn nan_probability_falls_back_to_schedule() {
        let cfg = TortureConfig {
            probability: Some(f64::NAN),
            ..TortureConfig::default()
        };
        assert_eq!(cfg.policy(), FailurePolicy::EveryNth(DEFAULT_FAIL_EVERY));

        let mut t = TortureProvider::new(FailurePolicy::Random {
            probability: f64::NAN,
            seed: 1,
        })
        .armed();
        assert_eq!(t.policy(), FailurePolicy::EveryNth(DEFAULT_FAIL_EVERY));
        let p = t.alloc(8);
        assert!(!p.is_null());
        unsafe { t.free(p) };
        assert!(t.stats().is_balanced());
    }

    #[test]
    fn infinite_probability_is_clamped() {
        let policy = FailurePolicy::Random {
            probability: f64::NEG_INFINITY,
            seed: 3,
        };
        let mut t = TortureProvider::new(policy).armed();
        let p = t.alloc(8);
        assert!(!p.is_null());
        unsafe { t.free(p) };
    }
}
