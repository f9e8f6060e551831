//! Pool allocator for small blocks with a process-allocator overflow path.
//!
//! The pool arena is carved into size classes at `init`; each class keeps a
//! free list of slot indices. Requests larger than the biggest class, or that
//! find their classes exhausted, go to the process allocator.

use std::alloc::Layout;
use std::fmt::Write as _;
use std::ptr::{self, NonNull};

use serde::Deserialize;

use crate::block::{self, BLOCK_ALIGN, HEADER_SIZE, system};
use crate::error::ProviderInitError;
use crate::{AllocStats, AllocatorProvider, Capabilities, ProviderKind};

/// Upper bound for the arena so a typo in a config file cannot ask for
/// terabytes.
const MAX_ARENA_BYTES: usize = 1 << 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoolClass {
    pub size: usize,
    pub count: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HybridConfig {
    pub classes: Vec<PoolClass>,
}

impl Default for HybridConfig {
    fn default() -> Self {
        let classes = [
            (16, 512),
            (32, 512),
            (64, 256),
            (128, 128),
            (256, 64),
            (512, 32),
            (1024, 16),
        ]
        .into_iter()
        .map(|(size, count)| PoolClass { size, count })
        .collect();
        Self { classes }
    }
}

struct Arena {
    base: NonNull<u8>,
    layout: Layout,
}

impl Arena {
    fn contains(&self, region: *const u8) -> bool {
        let start = self.base.as_ptr() as usize;
        let addr = region as usize;
        addr >= start && addr < start + self.layout.size()
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        // SAFETY: allocated in `HybridProvider::init` with this layout.
        unsafe { std::alloc::dealloc(self.base.as_ptr(), self.layout) }
    }
}

struct Pool {
    size: usize,
    stride: usize,
    offset: usize,
    count: usize,
    free: Vec<u32>,
    peak: usize,
}

impl Pool {
    fn used(&self) -> usize {
        self.count - self.free.len()
    }
}

pub struct HybridProvider {
    config: HybridConfig,
    arena: Option<Arena>,
    pools: Vec<Pool>,
    stats: AllocStats,
    overflow_live: usize,
}

impl HybridProvider {
    pub fn new(config: HybridConfig) -> Self {
        Self {
            config,
            arena: None,
            pools: Vec::new(),
            stats: AllocStats::default(),
            overflow_live: 0,
        }
    }

    /// Blocks currently served from the pool.
    pub fn pooled_live(&self) -> usize {
        self.pools.iter().map(Pool::used).sum()
    }

    pub fn overflow_live(&self) -> usize {
        self.overflow_live
    }

    fn pool_of(&self, payload: *mut u8) -> Option<(usize, u32)> {
        let arena = self.arena.as_ref()?;
        let region = unsafe { block::region_of(payload) };
        if !arena.contains(region) {
            return None;
        }
        let offset = region as usize - arena.base.as_ptr() as usize;
        self.pools.iter().enumerate().find_map(|(i, pool)| {
            let end = pool.offset + pool.count * pool.stride;
            (offset >= pool.offset && offset < end)
                .then(|| (i, ((offset - pool.offset) / pool.stride) as u32))
        })
    }

    /// Takes a block without touching the counters.
    fn take(&mut self, size: usize) -> *mut u8 {
        if let Some(arena) = self.arena.as_ref() {
            let base = arena.base.as_ptr();
            for pool in self.pools.iter_mut().filter(|p| p.size >= size) {
                if let Some(slot) = pool.free.pop() {
                    pool.peak = pool.peak.max(pool.used());
                    let region = unsafe { base.add(pool.offset + slot as usize * pool.stride) };
                    return unsafe { block::stamp(region, pool.size) };
                }
            }
        }
        let p = system::alloc(size);
        if !p.is_null() {
            self.overflow_live += 1;
        }
        p
    }

    /// Returns a block without touching the counters.
    unsafe fn release(&mut self, payload: *mut u8) {
        match self.pool_of(payload) {
            Some((pool, slot)) => self.pools[pool].free.push(slot),
            None => {
                unsafe { system::free(payload) };
                self.overflow_live -= 1;
            }
        }
    }

    fn build_pools(&self) -> Result<(Vec<Pool>, usize), ProviderInitError> {
        if self.config.classes.is_empty() {
            return Err(ProviderInitError::PoolInit("no size classes configured".into()));
        }
        let mut pools = Vec::with_capacity(self.config.classes.len());
        let mut offset = 0usize;
        let mut last = 0usize;
        for class in &self.config.classes {
            if class.size == 0 || class.count == 0 {
                return Err(ProviderInitError::PoolInit(format!(
                    "invalid size class {}x{}",
                    class.size, class.count
                )));
            }
            if class.size <= last {
                return Err(ProviderInitError::PoolInit(format!(
                    "size classes must be strictly ascending ({} after {last})",
                    class.size
                )));
            }
            if class.count > u32::MAX as usize {
                return Err(ProviderInitError::PoolInit(format!(
                    "too many blocks in class {}",
                    class.size
                )));
            }
            last = class.size;
            let stride = HEADER_SIZE + block::round_up(class.size);
            let bytes = stride
                .checked_mul(class.count)
                .filter(|b| offset.checked_add(*b).is_some_and(|t| t <= MAX_ARENA_BYTES))
                .ok_or_else(|| {
                    ProviderInitError::PoolInit(format!("arena exceeds {MAX_ARENA_BYTES} bytes"))
                })?;
            pools.push(Pool {
                size: class.size,
                stride,
                offset,
                count: class.count,
                free: (0..class.count as u32).rev().collect(),
                peak: 0,
            });
            offset += bytes;
        }
        Ok((pools, offset))
    }
}

impl AllocatorProvider for HybridProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Hybrid
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            introspection: true,
            ..Capabilities::default()
        }
    }

    fn init(&mut self) -> Result<(), ProviderInitError> {
        let (pools, total) = self.build_pools()?;
        let layout = Layout::from_size_align(total, BLOCK_ALIGN)
            .map_err(|e| ProviderInitError::PoolInit(e.to_string()))?;
        // SAFETY: `total` is non-zero, every class has at least one slot.
        let base = NonNull::new(unsafe { std::alloc::alloc(layout) }).ok_or_else(|| {
            ProviderInitError::PoolInit(format!("arena allocation of {total} bytes failed"))
        })?;
        tracing::debug!(bytes = total, classes = pools.len(), "hybrid pool arena ready");
        self.arena = Some(Arena { base, layout });
        self.pools = pools;
        Ok(())
    }

    fn alloc(&mut self, size: usize) -> *mut u8 {
        let p = self.take(size);
        if p.is_null() {
            self.stats.on_failure();
        } else {
            self.stats.on_alloc(unsafe { block::usable_size(p) });
        }
        p
    }

    unsafe fn realloc(&mut self, ptr: *mut u8, size: usize) -> *mut u8 {
        let old = unsafe { block::usable_size(ptr) };
        let new = match self.pool_of(ptr) {
            Some((pool, _)) if size <= self.pools[pool].size => ptr,
            Some(_) => {
                let fresh = self.take(size);
                if !fresh.is_null() {
                    unsafe {
                        ptr::copy_nonoverlapping(ptr, fresh, old.min(size));
                        self.release(ptr);
                    }
                }
                fresh
            }
            None => unsafe { system::realloc(ptr, size) },
        };
        if new.is_null() {
            self.stats.on_failure();
        } else {
            self.stats.on_realloc(old, unsafe { block::usable_size(new) });
        }
        new
    }

    unsafe fn free(&mut self, ptr: *mut u8) {
        let size = unsafe { block::usable_size(ptr) };
        unsafe { self.release(ptr) };
        self.stats.on_free(size);
    }

    fn stats(&self) -> AllocStats {
        self.stats
    }

    fn dump(&self) -> Option<String> {
        let mut out = String::new();
        let _ = writeln!(out, "hybrid pool: {}", self.stats);
        for pool in &self.pools {
            let _ = writeln!(
                out,
                "  class {:>5}: used {:>5}/{:<5} peak {}",
                pool.size,
                pool.used(),
                pool.count,
                pool.peak
            );
        }
        let _ = write!(out, "  overflow: {} live", self.overflow_live);
        Some(out)
    }
}
