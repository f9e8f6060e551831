//! Block layout shared by every provider.
//!
//! Each block handed to the engine is preceded by a fixed header recording
//! its usable size, so the size can be recovered from the payload pointer
//! alone (the engine asks for it without telling us which provider owns the
//! block).

use std::alloc::Layout;
use std::ptr;

/// Bytes reserved in front of every payload.
pub const HEADER_SIZE: usize = 16;
/// Alignment of every region and therefore of every payload.
pub const BLOCK_ALIGN: usize = 16;

#[repr(C)]
struct Header {
    size: usize,
}

/// Layout of a whole region (header + payload) for `size` payload bytes.
pub fn region_layout(size: usize) -> Option<Layout> {
    let total = size.checked_add(HEADER_SIZE)?;
    Layout::from_size_align(total, BLOCK_ALIGN).ok()
}

/// Rounds `size` up to the block alignment.
pub const fn round_up(size: usize) -> usize {
    (size + BLOCK_ALIGN - 1) & !(BLOCK_ALIGN - 1)
}

/// Stamps a header at `region` and returns the payload pointer.
///
/// # Safety
/// `region` must be valid for writes of `HEADER_SIZE` bytes and aligned to
/// `BLOCK_ALIGN`.
pub unsafe fn stamp(region: *mut u8, size: usize) -> *mut u8 {
    unsafe {
        ptr::write(region.cast::<Header>(), Header { size });
        region.add(HEADER_SIZE)
    }
}

/// # Safety
/// `payload` must have been returned by [`stamp`].
pub unsafe fn region_of(payload: *mut u8) -> *mut u8 {
    unsafe { payload.sub(HEADER_SIZE) }
}

/// Usable size recorded for a payload; zero for null.
///
/// # Safety
/// `payload` must be null or have been returned by [`stamp`] and still be live.
pub unsafe fn usable_size(payload: *const u8) -> usize {
    if payload.is_null() {
        return 0;
    }
    unsafe { ptr::read(payload.sub(HEADER_SIZE).cast::<Header>()).size }
}

/// Rewrites the recorded size of a live payload.
///
/// # Safety
/// Same as [`usable_size`]; `size` must not exceed the region's capacity.
pub unsafe fn set_usable_size(payload: *mut u8, size: usize) {
    unsafe { ptr::write(region_of(payload).cast::<Header>(), Header { size }) }
}

/// Process-allocator backed blocks, used directly by the default provider
/// and as the overflow path of the others.
pub mod system {
    use super::*;

    pub fn alloc(size: usize) -> *mut u8 {
        let Some(layout) = region_layout(size) else {
            return ptr::null_mut();
        };
        // SAFETY: layout has a non-zero size (header is always present).
        let region = unsafe { std::alloc::alloc(layout) };
        if region.is_null() {
            return ptr::null_mut();
        }
        unsafe { stamp(region, size) }
    }

    /// # Safety
    /// `payload` must be a live block returned by [`alloc`] or [`realloc`].
    pub unsafe fn realloc(payload: *mut u8, size: usize) -> *mut u8 {
        unsafe {
            let old = usable_size(payload);
            let Some(old_layout) = region_layout(old) else {
                return ptr::null_mut();
            };
            let Some(new_layout) = region_layout(size) else {
                return ptr::null_mut();
            };
            let region = std::alloc::realloc(region_of(payload), old_layout, new_layout.size());
            if region.is_null() {
                return ptr::null_mut();
            }
            stamp(region, size)
        }
    }

    /// # Safety
    /// `payload` must be a live block returned by [`alloc`] or [`realloc`].
    pub unsafe fn free(payload: *mut u8) {
        unsafe {
            let size = usable_size(payload);
            if let Some(layout) = region_layout(size) {
                std::alloc::dealloc(region_of(payload), layout);
            }
        }
    }
}
