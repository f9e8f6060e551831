//! Provider backed by a foreign heap manager.
//!
//! The host does not own the foreign heap's bookkeeping; it hands every call
//! over together with a fixed opaque token and relies on the heap's own
//! `init`/`dump` hooks around engine heap creation and destruction.

use std::alloc::{GlobalAlloc, Layout};
use std::fmt;

use mimalloc::MiMalloc;

use crate::block::{self, BLOCK_ALIGN};
use crate::error::ProviderInitError;
use crate::{AllocStats, AllocatorProvider, Capabilities, ProviderKind};

/// Opaque marker passed to every foreign call. The foreign heap may ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignToken(pub usize);

impl ForeignToken {
    pub const DEFAULT: ForeignToken = ForeignToken(0xdead_beef);
}

impl fmt::Display for ForeignToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// A heap manager the host treats as a foreign system.
///
/// Regions are requested with an explicit layout; the provider adds the
/// block header on top.
pub trait ForeignHeap {
    fn name(&self) -> &str;

    fn init(&mut self, token: ForeignToken) -> Result<(), String>;

    fn alloc(&mut self, token: ForeignToken, layout: Layout) -> *mut u8;

    /// # Safety
    /// `region` must come from this heap with `layout`.
    unsafe fn realloc(
        &mut self,
        token: ForeignToken,
        region: *mut u8,
        layout: Layout,
        new_size: usize,
    ) -> *mut u8;

    /// # Safety
    /// `region` must come from this heap with `layout`.
    unsafe fn dealloc(&mut self, token: ForeignToken, region: *mut u8, layout: Layout);

    fn dump(&self) -> String;
}

/// mimalloc as the foreign heap.
#[derive(Debug, Default)]
pub struct MimallocHeap {
    regions: usize,
    bytes: usize,
}

impl ForeignHeap for MimallocHeap {
    fn name(&self) -> &str {
        "mimalloc"
    }

    fn init(&mut self, _token: ForeignToken) -> Result<(), String> {
        self.regions = 0;
        self.bytes = 0;
        Ok(())
    }

    fn alloc(&mut self, _token: ForeignToken, layout: Layout) -> *mut u8 {
        // SAFETY: layouts built by `block::region_layout` are never zero-sized.
        let region = unsafe { MiMalloc.alloc(layout) };
        if !region.is_null() {
            self.regions += 1;
            self.bytes += layout.size();
        }
        region
    }

    unsafe fn realloc(
        &mut self,
        _token: ForeignToken,
        region: *mut u8,
        layout: Layout,
        new_size: usize,
    ) -> *mut u8 {
        let moved = unsafe { MiMalloc.realloc(region, layout, new_size) };
        if !moved.is_null() {
            self.bytes = self.bytes - layout.size() + new_size;
        }
        moved
    }

    unsafe fn dealloc(&mut self, _token: ForeignToken, region: *mut u8, layout: Layout) {
        unsafe { MiMalloc.dealloc(region, layout) };
        self.regions -= 1;
        self.bytes -= layout.size();
    }

    fn dump(&self) -> String {
        format!("mimalloc: regions={} bytes={}", self.regions, self.bytes)
    }
}

pub struct ExternalProvider<H: ForeignHeap = MimallocHeap> {
    heap: H,
    token: ForeignToken,
    stats: AllocStats,
}

impl ExternalProvider<MimallocHeap> {
    pub fn mimalloc() -> Self {
        Self::new(MimallocHeap::default(), ForeignToken::DEFAULT)
    }
}

impl<H: ForeignHeap> ExternalProvider<H> {
    pub fn new(heap: H, token: ForeignToken) -> Self {
        Self {
            heap,
            token,
            stats: AllocStats::default(),
        }
    }

    pub fn heap(&self) -> &H {
        &self.heap
    }
}

impl<H: ForeignHeap> AllocatorProvider for ExternalProvider<H> {
    fn kind(&self) -> ProviderKind {
        ProviderKind::External
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            introspection: true,
            ..Capabilities::default()
        }
    }

    fn init(&mut self) -> Result<(), ProviderInitError> {
        tracing::debug!(heap = self.heap.name(), token = %self.token, "initialising external heap");
        self.heap
            .init(self.token)
            .map_err(|reason| ProviderInitError::Foreign {
                name: self.heap.name().to_string(),
                reason,
            })
    }

    fn alloc(&mut self, size: usize) -> *mut u8 {
        let Some(layout) = block::region_layout(size) else {
            self.stats.on_failure();
            return std::ptr::null_mut();
        };
        let region = self.heap.alloc(self.token, layout);
        if region.is_null() {
            self.stats.on_failure();
            return region;
        }
        self.stats.on_alloc(size);
        unsafe { block::stamp(region, size) }
    }

    unsafe fn realloc(&mut self, ptr: *mut u8, size: usize) -> *mut u8 {
        let old = unsafe { block::usable_size(ptr) };
        let (Some(old_layout), Some(new_layout)) =
            (block::region_layout(old), block::region_layout(size))
        else {
            self.stats.on_failure();
            return std::ptr::null_mut();
        };
        debug_assert_eq!(old_layout.align(), BLOCK_ALIGN);
        let region = unsafe {
            self.heap
                .realloc(self.token, block::region_of(ptr), old_layout, new_layout.size())
        };
        if region.is_null() {
            self.stats.on_failure();
            return region;
        }
        self.stats.on_realloc(old, size);
        unsafe { block::stamp(region, size) }
    }

    unsafe fn free(&mut self, ptr: *mut u8) {
        let size = unsafe { block::usable_size(ptr) };
        if let Some(layout) = block::region_layout(size) {
            unsafe { self.heap.dealloc(self.token, block::region_of(ptr), layout) };
        }
        self.stats.on_free(size);
    }

    fn stats(&self) -> AllocStats {
        self.stats
    }

    fn dump(&self) -> Option<String> {
        Some(format!(
            "external heap {} (token {}): {}\n  {}",
            self.heap.name(),
            self.token,
            self.stats,
            self.heap.dump()
        ))
    }
}
