use crate::block::{self, system};
use crate::{AllocStats, AllocatorProvider, ProviderKind};

/// Pass-through to the process allocator.
///
/// Also the inner layer of the logging and torture providers, which only add
/// behaviour around these calls.
#[derive(Debug, Default)]
pub struct SystemProvider {
    stats: AllocStats,
}

impl SystemProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AllocatorProvider for SystemProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Default
    }

    fn alloc(&mut self, size: usize) -> *mut u8 {
        let p = system::alloc(size);
        if p.is_null() {
            self.stats.on_failure();
        } else {
            self.stats.on_alloc(size);
        }
        p
    }

    unsafe fn realloc(&mut self, ptr: *mut u8, size: usize) -> *mut u8 {
        let old = unsafe { block::usable_size(ptr) };
        let p = unsafe { system::realloc(ptr, size) };
        if p.is_null() {
            self.stats.on_failure();
        } else {
            self.stats.on_realloc(old, size);
        }
        p
    }

    unsafe fn free(&mut self, ptr: *mut u8) {
        let size = unsafe { block::usable_size(ptr) };
        unsafe { system::free(ptr) };
        self.stats.on_free(size);
    }

    fn stats(&self) -> AllocStats {
        self.stats
    }
}
