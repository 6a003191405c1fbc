//! Constants and layout of the memory core

use core::ops::Range;

pub use crate::board::{KERNEL_BASE, KERNEL_PAGES, MEMORY_END, MMIO};

pub const PAGE_SIZE: usize = 0x1000;
pub const PAGE_SIZE_BITS: usize = 0xc;

/// physical address width in SV39
pub const PA_WIDTH_SV39: usize = 56;
/// virtual address width in SV39
pub const VA_WIDTH_SV39: usize = 39;
pub const PPN_WIDTH_SV39: usize = PA_WIDTH_SV39 - PAGE_SIZE_BITS;

/// one beyond the highest usable virtual address.
///
/// Bit 38 is kept clear so that addresses never need sign extension.
pub const VA_MAX: usize = 1 << (VA_WIDTH_SV39 - 1);

/// `satp.MODE` value selecting SV39
pub const SATP_MODE_SV39: usize = 8;

/// Addresses identity-mapped into the kernel page table.
///
/// Every range is half-open and page aligned at the low end.
#[derive(Clone, Debug)]
pub struct KernelLayout {
    /// device registers, `(base, length)`
    pub mmio: &'static [(usize, usize)],
    /// kernel `.text`
    pub text: Range<usize>,
    /// kernel `.rodata`, `.data` and `.bss`
    pub data: Range<usize>,
    /// the allocatable pool handed to the frame allocator
    pub pool: Range<usize>,
}

impl KernelLayout {
    /// Layout of the running kernel, taken from the linker script symbols.
    #[cfg(all(target_arch = "riscv64", target_os = "none"))]
    pub fn current() -> Self {
        extern "C" {
            fn etext();
            fn ekernel();
        }
        use crate::mm::PhysAddr;
        // rounded up to a page boundary
        let etext: usize = PhysAddr::from(PhysAddr::from(etext as usize).ceil()).into();
        let ekernel: usize = PhysAddr::from(PhysAddr::from(ekernel as usize).ceil()).into();
        Self {
            mmio: MMIO,
            text: KERNEL_BASE..etext,
            data: etext..ekernel,
            pool: ekernel..MEMORY_END,
        }
    }
}
