//! Host-side stand-in for physical memory

use std::alloc::{alloc_zeroed, dealloc, handle_alloc_error, Layout};
use std::ops::Deref;

use crate::config::PAGE_SIZE;

use super::{FrameAllocator, PhysAddr};

/// A page-aligned heap block, addressed as if it were physical memory
pub struct Arena {
    base: *mut u8,
    layout: Layout,
}

impl Arena {
    pub fn new(pages: usize) -> Self {
        // at least one page so that `begin` is a real address even for an empty pool
        let layout = Layout::from_size_align(pages.max(1) * PAGE_SIZE, PAGE_SIZE).unwrap();
        let base = unsafe { alloc_zeroed(layout) };
        if base.is_null() {
            handle_alloc_error(layout);
        }
        Self { base, layout }
    }

    pub fn begin(&self) -> PhysAddr {
        PhysAddr::from(self.base as usize)
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        unsafe { dealloc(self.base, self.layout) }
    }
}

/// A frame allocator over its own arena
pub struct TestMemory {
    frames: FrameAllocator,
    end: PhysAddr,
    // dropped last
    arena: Arena,
}

impl TestMemory {
    pub fn new(kernel_frames: usize, user_frames: usize) -> Self {
        let pages = kernel_frames + user_frames;
        let arena = Arena::new(pages);
        let end = PhysAddr::from(usize::from(arena.begin()) + pages * PAGE_SIZE);
        let frames = unsafe { FrameAllocator::new(arena.begin(), end, kernel_frames) };
        Self { frames, end, arena }
    }

    pub fn begin(&self) -> PhysAddr {
        self.arena.begin()
    }

    pub fn end(&self) -> PhysAddr {
        self.end
    }
}

impl Deref for TestMemory {
    type Target = FrameAllocator;

    fn deref(&self) -> &FrameAllocator {
        &self.frames
    }
}
