use jsh_alloc::ProviderHandle;
use rquickjs::allocator::Allocator;

/// Routes every engine allocation through the active provider.
pub(crate) struct EngineAllocator {
    provider: ProviderHandle,
}

impl EngineAllocator {
    pub(crate) fn new(provider: ProviderHandle) -> Self {
        Self { provider }
    }
}

// SAFETY: every block handed to the engine comes from the provider and
// carries the size header `usable_size` reads back.
unsafe impl Allocator for EngineAllocator {
    fn alloc(&mut self, size: usize) -> *mut u8 {
        self.provider.allocate(size)
    }

    fn calloc(&mut self, count: usize, size: usize) -> *mut u8 {
        self.provider.allocate_zeroed(count, size)
    }

    unsafe fn dealloc(&mut self, ptr: *mut u8) {
        unsafe { self.provider.free(ptr) }
    }

    unsafe fn realloc(&mut self, ptr: *mut u8, new_size: usize) -> *mut u8 {
        unsafe { self.provider.reallocate(ptr, new_size) }
    }

    unsafe fn usable_size(ptr: *mut u8) -> usize {
        unsafe { ProviderHandle::usable_size(ptr) }
    }
}
