//! Process-wide memory state of the running kernel
//!
//! Hart 0 calls [`init`] once; every hart, hart 0 included, then calls
//! [`init_hart`] before touching the pool through virtual addresses.

use lazy_static::*;

use crate::config::{KernelLayout, KERNEL_PAGES};
use crate::mm::{FrameAllocator, KernelSpace, PhysAddr, Sv39Mmu};
use crate::sync::SpinLock;

lazy_static! {
    /// frame allocator over `[ekernel, MEMORY_END)`
    pub static ref FRAME_ALLOCATOR: FrameAllocator = {
        let pool = KernelLayout::current().pool;
        unsafe {
            FrameAllocator::new(
                PhysAddr::from(pool.start),
                PhysAddr::from(pool.end),
                KERNEL_PAGES,
            )
        }
    };

    /// the kernel page table, shared by every hart
    pub static ref KERNEL_SPACE: SpinLock<KernelSpace> = SpinLock::new(
        "kernel_space",
        KernelSpace::new(&FRAME_ALLOCATOR, &KernelLayout::current()),
    );
}

/// initiate logging, the frame allocator and the kernel space, in that order
pub fn init() {
    crate::logging::init();
    lazy_static::initialize(&FRAME_ALLOCATOR);
    lazy_static::initialize(&KERNEL_SPACE);
}

/// switch the calling hart onto the kernel page table
pub fn init_hart() {
    KERNEL_SPACE.lock().activate(&Sv39Mmu);
}
