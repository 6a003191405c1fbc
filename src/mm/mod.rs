//! Memory management
//!
//! SV39 page-based virtual memory for RV64: a two-region physical frame
//! allocator, three-level page tables built out of its frames, and the
//! identity-mapped kernel address space.

mod address;
mod error;
mod frame_allocator;
mod memory_set;
mod page_table;
#[cfg(test)]
mod test_support;

pub use address::{PhysAddr, PhysPageNum, VirtAddr, VirtPageNum};
pub use error::MmError;
pub use frame_allocator::{FrameAllocator, RegionInfo, RegionKind};
#[cfg(target_arch = "riscv64")]
pub use memory_set::Sv39Mmu;
pub use memory_set::{KernelSpace, Mmu};
pub use page_table::{PTEFlags, PageTable, PageTableEntry, PteVisit};
