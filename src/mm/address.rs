use core::fmt::{self, Debug, Formatter};

use crate::config::{self, PA_WIDTH_SV39, PPN_WIDTH_SV39, VA_MAX};

use super::PageTableEntry;

/// 每个页表都用 9 位索引的，因此有 `1 << 9 = 512` 个页表项
pub const PTE_INDEX_BITS: usize = 9;
pub const NUM_PTE_PER_TABLE: usize = 1 << PTE_INDEX_BITS;
/// SV39 三级页表
pub const PAGE_TABLE_LEVELS: usize = 3;

/// physical address
#[derive(Copy, Clone, Ord, PartialOrd, PartialEq, Eq, Hash)]
pub struct PhysAddr(usize);

/// virtual address
///
/// Unlike [`PhysAddr`] the raw value is kept as is, so that an address at or
/// beyond [`VA_MAX`] can still be recognized and rejected.
#[derive(Copy, Clone, Ord, PartialOrd, PartialEq, Eq, Hash)]
pub struct VirtAddr(usize);

/// physical page number
#[derive(Copy, Clone, Ord, PartialOrd, PartialEq, Eq, Hash)]
pub struct PhysPageNum(usize);

/// virtual page number
#[derive(Copy, Clone, Ord, PartialOrd, PartialEq, Eq, Hash)]
pub struct VirtPageNum(usize);

impl PhysAddr {
    pub fn floor(&self) -> PhysPageNum {
        PhysPageNum(self.0 / config::PAGE_SIZE)
    }

    pub fn ceil(&self) -> PhysPageNum {
        PhysPageNum((self.0 + config::PAGE_SIZE - 1) / config::PAGE_SIZE)
    }

    pub fn page_offset(&self) -> usize {
        self.0 & (config::PAGE_SIZE - 1)
    }

    pub fn aligned(&self) -> bool {
        self.page_offset() == 0
    }
}

impl VirtAddr {
    pub fn floor(&self) -> VirtPageNum {
        VirtPageNum(self.0 / config::PAGE_SIZE)
    }

    pub fn page_offset(&self) -> usize {
        self.0 & (config::PAGE_SIZE - 1)
    }

    pub fn aligned(&self) -> bool {
        self.page_offset() == 0
    }

    /// whether the address can be translated by a page table at all
    pub fn in_range(&self) -> bool {
        self.0 < VA_MAX
    }
}

impl PhysPageNum {
    /// 返回一个页表项定长数组的可变引用，代表多级页表中的一个节点
    ///
    /// The frame must be owned by a page table; physical memory is
    /// identity-addressable.
    pub fn get_pte_array(&self) -> &'static mut [PageTableEntry] {
        let pa: PhysAddr = (*self).into();
        // `PageTableEntry` 只是对 `usize` 的包装，两者内存布局相同，
        // NUM_PTE_PER_TABLE * size_of::<PageTableEntry>() == PAGE_SIZE
        unsafe { core::slice::from_raw_parts_mut(pa.0 as *mut PageTableEntry, NUM_PTE_PER_TABLE) }
    }

    /// 返回一个字节数组的可变引用，可以以字节为粒度对物理页帧上的数据进行访问
    pub fn get_bytes_array(&self) -> &'static mut [u8] {
        let pa: PhysAddr = (*self).into();
        unsafe { core::slice::from_raw_parts_mut(pa.0 as *mut u8, config::PAGE_SIZE) }
    }

    /// 获取一个恰好放在一个物理页帧开头的类型为 `T` 的数据的可变引用
    pub fn get_mut<T>(&self) -> &'static mut T {
        let pa: PhysAddr = (*self).into();
        unsafe { &mut *(pa.0 as *mut T) }
    }
}

impl VirtPageNum {
    /// Index into the table of `level` (2 is the root, 0 holds the leaves).
    ///
    /// Level 2 takes VA bits `[38:30]`, level 1 `[29:21]`, level 0 `[20:12]`.
    pub fn level_index(&self, level: usize) -> usize {
        debug_assert!(level < PAGE_TABLE_LEVELS);
        (self.0 >> (PTE_INDEX_BITS * level)) & (NUM_PTE_PER_TABLE - 1)
    }

    /// 取出虚拟页号的三级页索引，并按照从高到低的顺序返回 `[VPN2, VPN1, VPN0]`
    pub fn indexes(&self) -> [usize; PAGE_TABLE_LEVELS] {
        [self.level_index(2), self.level_index(1), self.level_index(0)]
    }
}

impl From<usize> for PhysAddr {
    fn from(v: usize) -> Self {
        Self(v & ((1 << PA_WIDTH_SV39) - 1))
    }
}

impl From<PhysPageNum> for PhysAddr {
    fn from(v: PhysPageNum) -> Self {
        Self(v.0 << config::PAGE_SIZE_BITS)
    }
}

impl Debug for PhysAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("PA:{:#x}", self.0))
    }
}

impl From<usize> for PhysPageNum {
    fn from(v: usize) -> Self {
        Self(v & ((1 << PPN_WIDTH_SV39) - 1))
    }
}

impl Debug for PhysPageNum {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("PPN:{:#x}", self.0))
    }
}

impl From<usize> for VirtAddr {
    fn from(v: usize) -> Self {
        Self(v)
    }
}

impl From<VirtPageNum> for VirtAddr {
    fn from(v: VirtPageNum) -> Self {
        Self(v.0 << config::PAGE_SIZE_BITS)
    }
}

impl Debug for VirtAddr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("VA:{:#x}", self.0))
    }
}

impl From<usize> for VirtPageNum {
    fn from(v: usize) -> Self {
        Self(v)
    }
}

impl Debug for VirtPageNum {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("VPN:{:#x}", self.0))
    }
}

impl From<PhysAddr> for usize {
    fn from(v: PhysAddr) -> Self {
        v.0
    }
}

impl From<PhysPageNum> for usize {
    fn from(v: PhysPageNum) -> Self {
        v.0
    }
}

impl From<VirtAddr> for usize {
    fn from(v: VirtAddr) -> Self {
        v.0
    }
}

impl From<VirtPageNum> for usize {
    fn from(v: VirtPageNum) -> Self {
        v.0
    }
}
