//! The allocate/reallocate/free contract and the handle the engine calls through.

use std::cell::RefCell;
use std::fmt;
use std::ptr;
use std::rc::Rc;
use std::str::FromStr;

use serde::Deserialize;

use crate::error::ProviderInitError;
use crate::{AllocStats, block};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Default,
    Logging,
    Torture,
    Hybrid,
    External,
}

impl ProviderKind {
    /// Fixed priority order used when walking the fallback chain.
    pub const PRIORITY: [ProviderKind; 5] = [
        ProviderKind::Logging,
        ProviderKind::Torture,
        ProviderKind::Hybrid,
        ProviderKind::External,
        ProviderKind::Default,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ProviderKind::Default => "default",
            ProviderKind::Logging => "logging",
            ProviderKind::Torture => "torture",
            ProviderKind::Hybrid => "hybrid",
            ProviderKind::External => "external",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(ProviderKind::Default),
            "logging" => Ok(ProviderKind::Logging),
            "torture" => Ok(ProviderKind::Torture),
            "hybrid" => Ok(ProviderKind::Hybrid),
            "external" => Ok(ProviderKind::External),
            other => Err(format!(
                "unknown allocator `{other}` (expected default, logging, torture, hybrid or external)"
            )),
        }
    }
}

/// What a provider offers beyond the bare triplet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Occupancy dumps; the heap manager runs the forced-GC teardown for these.
    pub introspection: bool,
    /// Records every event to a side channel.
    pub event_log: bool,
    /// May refuse allocations on purpose.
    pub fault_injection: bool,
}

/// A memory backend for the engine heap.
///
/// Implementations only see well-formed requests: `size` is never zero on
/// `realloc`, and pointers are never null. [`ProviderHandle`] folds the
/// null/zero edge cases into these calls before they arrive.
pub trait AllocatorProvider {
    fn kind(&self) -> ProviderKind;

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    /// One-time setup before the heap is built. A failure takes this provider
    /// out of the selection chain.
    fn init(&mut self) -> Result<(), ProviderInitError> {
        Ok(())
    }

    /// Returns a block with at least `size` usable bytes, or null.
    fn alloc(&mut self, size: usize) -> *mut u8;

    /// Resizes a block. On null the old block is still valid.
    ///
    /// # Safety
    /// `ptr` must be a live block handed out by this provider.
    unsafe fn realloc(&mut self, ptr: *mut u8, size: usize) -> *mut u8;

    /// # Safety
    /// `ptr` must be a live block handed out by this provider.
    unsafe fn free(&mut self, ptr: *mut u8);

    fn stats(&self) -> AllocStats;

    /// Human readable occupancy report, for providers with introspection.
    fn dump(&self) -> Option<String> {
        None
    }

    fn heap_created(&mut self) {}

    fn heap_destroyed(&mut self) {}
}

/// Shared, single-threaded handle to the active provider.
///
/// The engine heap keeps one clone inside its allocator adapter and the host
/// keeps another for introspection. All calls go through the standard
/// allocator conventions:
/// - `allocate(0)` returns a unique, freeable block;
/// - `reallocate(null, n)` allocates;
/// - `reallocate(p, 0)` frees `p` and returns null;
/// - `free(null)` does nothing.
#[derive(Clone)]
pub struct ProviderHandle {
    kind: ProviderKind,
    inner: Rc<RefCell<Box<dyn AllocatorProvider>>>,
}

impl ProviderHandle {
    pub fn new(provider: Box<dyn AllocatorProvider>) -> Self {
        Self {
            kind: provider.kind(),
            inner: Rc::new(RefCell::new(provider)),
        }
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    pub fn capabilities(&self) -> Capabilities {
        self.inner.borrow().capabilities()
    }

    pub fn allocate(&self, size: usize) -> *mut u8 {
        self.inner.borrow_mut().alloc(size)
    }

    /// `count * size` zeroed bytes, or null on overflow or refusal.
    pub fn allocate_zeroed(&self, count: usize, size: usize) -> *mut u8 {
        let Some(total) = count.checked_mul(size) else {
            return ptr::null_mut();
        };
        let p = self.allocate(total);
        if !p.is_null() {
            unsafe { ptr::write_bytes(p, 0, total) };
        }
        p
    }

    /// # Safety
    /// `ptr` must be null or a live block obtained from this handle.
    pub unsafe fn reallocate(&self, ptr: *mut u8, size: usize) -> *mut u8 {
        if ptr.is_null() {
            return self.allocate(size);
        }
        if size == 0 {
            unsafe { self.free(ptr) };
            return ptr::null_mut();
        }
        unsafe { self.inner.borrow_mut().realloc(ptr, size) }
    }

    /// # Safety
    /// `ptr` must be null or a live block obtained from this handle.
    pub unsafe fn free(&self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }
        unsafe { self.inner.borrow_mut().free(ptr) }
    }

    /// # Safety
    /// `ptr` must be null or a live block obtained from any provider.
    pub unsafe fn usable_size(ptr: *const u8) -> usize {
        unsafe { block::usable_size(ptr) }
    }

    pub fn stats(&self) -> AllocStats {
        self.inner.borrow().stats()
    }

    pub fn dump(&self) -> Option<String> {
        self.inner.borrow().dump()
    }

    pub fn heap_created(&self) {
        self.inner.borrow_mut().heap_created();
    }

    pub fn heap_destroyed(&self) {
        self.inner.borrow_mut().heap_destroyed();
    }
}

impl fmt::Debug for ProviderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderHandle")
            .field("kind", &self.kind)
            .field("stats", &self.stats())
            .finish()
    }
}
