//! Constants for the QEMU `virt` machine

/// start of DRAM, where the kernel image is loaded
pub const KERNEL_BASE: usize = 0x8000_0000;
/// 128 MiB of DRAM
pub const MEMORY_END: usize = 0x8800_0000;

pub const UART0: usize = 0x1000_0000;

/// device registers identity-mapped into the kernel space, `(base, length)`
pub const MMIO: &[(usize, usize)] = &[(UART0, 0x1000)];

/// number of frames at the front of the pool reserved for the kernel region
pub const KERNEL_PAGES: usize = 1024;
