//! The kernel address space

use core::ops::Range;

use log::info;

use crate::config::{KernelLayout, SATP_MODE_SV39};

use super::{FrameAllocator, MmError, PTEFlags, PageTable, PhysAddr, RegionKind, VirtAddr};

/// Access to the address translation hardware of the current hart
pub trait Mmu {
    /// write the `satp` CSR
    fn write_satp(&self, satp: usize);
    /// drop every cached translation of this hart
    fn flush_tlb(&self);
}

/// The SV39 MMU of a RISC-V hart
#[cfg(target_arch = "riscv64")]
pub struct Sv39Mmu;

#[cfg(target_arch = "riscv64")]
impl Mmu for Sv39Mmu {
    fn write_satp(&self, satp: usize) {
        unsafe { riscv::register::satp::write(satp) }
    }

    fn flush_tlb(&self) {
        unsafe { riscv::asm::sfence_vma_all() }
    }
}

/// The distinguished page table every hart runs the kernel on.
///
/// Memory is identity-mapped: device registers, kernel text, kernel data and
/// the allocatable pool. Frames unmapped from it go back to the kernel region.
#[derive(Debug)]
pub struct KernelSpace {
    page_table: PageTable,
}

impl KernelSpace {
    /// Build the kernel table for `layout`. Panics if any mapping fails.
    pub fn new(frames: &FrameAllocator, layout: &KernelLayout) -> Self {
        Self::try_new(frames, layout).unwrap_or_else(|err| panic!("kvm_init: {}", err))
    }

    pub fn try_new(frames: &FrameAllocator, layout: &KernelLayout) -> Result<Self, MmError> {
        let mut space = Self {
            page_table: PageTable::new_in(frames, RegionKind::Kernel),
        };
        let rw = PTEFlags::R | PTEFlags::W;
        for &(base, len) in layout.mmio {
            space.map_identity(frames, "mmio", base..base + len, rw)?;
        }
        space.map_identity(frames, ".text", layout.text.clone(), PTEFlags::R | PTEFlags::X)?;
        space.map_identity(frames, ".data", layout.data.clone(), rw)?;
        space.map_identity(frames, "pool", layout.pool.clone(), rw)?;
        Ok(space)
    }

    /// Map `range` onto itself, skipped when it is empty.
    fn map_identity(
        &mut self,
        frames: &FrameAllocator,
        name: &str,
        range: Range<usize>,
        flags: PTEFlags,
    ) -> Result<(), MmError> {
        if range.end <= range.start {
            return Ok(());
        }
        info!("kernel space: {} [{:#x}, {:#x}) {:?}", name, range.start, range.end, flags);
        self.page_table.try_map(
            frames,
            VirtAddr::from(range.start),
            PhysAddr::from(range.start),
            range.end - range.start,
            flags,
        )
    }

    pub fn page_table(&self) -> &PageTable {
        &self.page_table
    }

    pub fn page_table_mut(&mut self) -> &mut PageTable {
        &mut self.page_table
    }

    /// `satp` value selecting this table: MODE = SV39, ASID = 0, PPN = root
    pub fn satp(&self) -> usize {
        SATP_MODE_SV39 << 60 | usize::from(self.page_table.root().floor())
    }

    /// Switch the calling hart onto the kernel table.
    ///
    /// Each hart has its own TLB, so every hart runs this once before it
    /// touches the pool through virtual addresses.
    pub fn activate(&self, mmu: &impl Mmu) {
        let satp = self.satp();
        mmu.write_satp(satp);
        mmu.flush_tlb();
        info!("kernel space activated, satp = {:#x}", satp);
    }
}
