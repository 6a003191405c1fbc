use bitflags::*;
use log::{debug, info};

use crate::config::{PAGE_SIZE, VA_MAX};

use super::address::{NUM_PTE_PER_TABLE, PAGE_TABLE_LEVELS, PTE_INDEX_BITS};
use super::{FrameAllocator, MmError, PhysAddr, PhysPageNum, RegionKind, VirtAddr, VirtPageNum};

bitflags! {
    /// page table entry flags
    pub struct PTEFlags: u16 {
        const V = 1 << 0;
        const R = 1 << 1;
        const W = 1 << 2;
        const X = 1 << 3;
        const U = 1 << 4;
        const G = 1 << 5;
        const A = 1 << 6;
        const D = 1 << 7;
        /// reserved for software
        const RSW0 = 1 << 8;
        const RSW1 = 1 << 9;
    }
}

impl PTEFlags {
    /// the permission bits that turn a valid entry into a leaf
    pub fn rwx() -> Self {
        Self::R | Self::W | Self::X
    }
}

/// flags occupy bits `[9:0]`
const FLAGS_WIDTH: usize = 10;
/// the PPN occupies bits `[53:10]`
const PTE_PPN_WIDTH: usize = 44;

#[derive(Copy, Clone, PartialEq, Eq)]
#[repr(C)]
/// page table entry structure
///
/// SV39 分页模式下的页表项，其中 `[53 : 10]` 这 44 位是物理页号，最低的 10 位 `[9 ：0]` 则是标志位，
/// 控制页表项是否合法、控制索引到这个页表项的对应虚拟页面是否允许读/写/执行等
pub struct PageTableEntry {
    pub bits: usize,
}

impl PageTableEntry {
    pub fn new(ppn: PhysPageNum, flags: PTEFlags) -> Self {
        PageTableEntry {
            bits: usize::from(ppn) << FLAGS_WIDTH | flags.bits() as usize,
        }
    }

    pub fn empty() -> Self {
        PageTableEntry { bits: 0 }
    }

    /// 物理页号
    pub fn ppn(&self) -> PhysPageNum {
        (self.bits >> FLAGS_WIDTH & ((1usize << PTE_PPN_WIDTH) - 1)).into()
    }

    /// 标志位
    pub fn flags(&self) -> PTEFlags {
        PTEFlags::from_bits_truncate((self.bits & ((1 << FLAGS_WIDTH) - 1)) as u16)
    }

    /// 页表项是否合法
    pub fn is_valid(&self) -> bool {
        self.flags().contains(PTEFlags::V)
    }

    pub fn readable(&self) -> bool {
        self.flags().contains(PTEFlags::R)
    }

    pub fn writable(&self) -> bool {
        self.flags().contains(PTEFlags::W)
    }

    pub fn executable(&self) -> bool {
        self.flags().contains(PTEFlags::X)
    }

    /// valid and terminates translation
    pub fn is_leaf(&self) -> bool {
        self.is_valid() && self.flags().intersects(PTEFlags::rwx())
    }

    /// valid and points at the next level table
    pub fn is_interior(&self) -> bool {
        self.is_valid() && !self.flags().intersects(PTEFlags::rwx())
    }
}

impl core::fmt::Debug for PageTableEntry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_fmt(format_args!("PTE({:?}, {:?})", self.ppn(), self.flags()))
    }
}

/// A present entry met while walking a whole table
#[derive(Copy, Clone, Debug)]
pub struct PteVisit {
    /// 2 for the root table, 0 for the leaf tables
    pub level: usize,
    pub index: usize,
    /// first virtual address covered by the entry
    pub va: VirtAddr,
    pub pte: PageTableEntry,
}

/// A three-level SV39 page table.
///
/// Every node lives in a frame of the kernel region. Backing frames released
/// by [`PageTable::unmap`] go back to the table's `domain` region. Nothing here
/// is synchronized: callers must not mutate one table from two harts at once.
pub struct PageTable {
    /// 根节点的物理页号
    root_ppn: PhysPageNum,
    domain: RegionKind,
}

impl PageTable {
    /// A new, empty table for a user address space
    pub fn new(frames: &FrameAllocator) -> Self {
        Self::new_in(frames, RegionKind::User)
    }

    pub(super) fn new_in(frames: &FrameAllocator, domain: RegionKind) -> Self {
        let root = frames.alloc(RegionKind::Kernel);
        PageTable {
            root_ppn: root.floor(),
            domain,
        }
    }

    /// Take over a table built elsewhere.
    ///
    /// # Safety
    ///
    /// `root` must be a page table frame whose nodes all come from the kernel
    /// region, and nobody else may mutate it while the handle is in use.
    pub unsafe fn from_root(root: PhysAddr, domain: RegionKind) -> Self {
        PageTable {
            root_ppn: root.floor(),
            domain,
        }
    }

    pub fn root(&self) -> PhysAddr {
        self.root_ppn.into()
    }

    /// the region backing frames are returned to on unmap
    pub fn domain(&self) -> RegionKind {
        self.domain
    }

    /// 在多级页表找到一个虚拟地址对应的叶子页表项。`frames` 为 `Some` 时，
    /// 遍历过程中尚未创建的节点会被新建，否则查找失败返回 `None`
    fn walk(
        &self,
        va: VirtAddr,
        frames: Option<&FrameAllocator>,
    ) -> Result<Option<&mut PageTableEntry>, MmError> {
        if !va.in_range() {
            return Err(MmError::VirtAddrOutOfRange(va));
        }
        let idxs = va.floor().indexes();
        let mut ppn = self.root_ppn;
        for (i, &idx) in idxs[..PAGE_TABLE_LEVELS - 1].iter().enumerate() {
            let pte = &mut ppn.get_pte_array()[idx];
            if pte.is_valid() {
                assert!(
                    pte.is_interior(),
                    "vm_getpte: non-leaf pte {:?} has R/W/X at level {}",
                    pte,
                    PAGE_TABLE_LEVELS - 1 - i
                );
            } else {
                let Some(frames) = frames else {
                    return Ok(None);
                };
                let frame = frames.try_alloc(RegionKind::Kernel)?;
                *pte = PageTableEntry::new(frame.floor(), PTEFlags::V);
            }
            ppn = pte.ppn();
        }
        Ok(Some(&mut ppn.get_pte_array()[idxs[PAGE_TABLE_LEVELS - 1]]))
    }

    /// The level-0 slot for `va`, creating missing intermediate tables when
    /// `create` is set. The slot itself may still be invalid.
    ///
    /// Panics if `va` is beyond [`VA_MAX`] or the kernel region runs dry.
    pub fn find_pte(
        &mut self,
        frames: &FrameAllocator,
        va: VirtAddr,
        create: bool,
    ) -> Option<&mut PageTableEntry> {
        self.walk(va, create.then_some(frames))
            .unwrap_or_else(|err| panic!("vm_getpte: {}", err))
    }

    /// Same as [`PageTable::find_pte`], reporting failures as errors.
    pub fn try_find_pte(
        &mut self,
        frames: &FrameAllocator,
        va: VirtAddr,
        create: bool,
    ) -> Result<Option<&mut PageTableEntry>, MmError> {
        self.walk(va, create.then_some(frames))
    }

    /// The valid leaf entry mapping `va`, without creating anything
    pub fn leaf(&self, va: VirtAddr) -> Option<PageTableEntry> {
        self.walk(va, None)
            .ok()
            .flatten()
            .filter(|pte| pte.is_valid())
            .map(|pte| *pte)
    }

    /// Physical address `va` translates to, if it is mapped.
    pub fn translate(&self, va: VirtAddr) -> Option<PhysAddr> {
        let pte = self.leaf(va)?;
        Some(PhysAddr::from(usize::from(PhysAddr::from(pte.ppn())) + va.page_offset()))
    }

    fn check_range(va: VirtAddr, len: usize) -> Result<(), MmError> {
        match usize::from(va).checked_add(len) {
            Some(last) if len > 0 && last <= VA_MAX => Ok(()),
            _ => Err(MmError::BadRange { va, len }),
        }
    }

    /// 建立 `[va, va + len)` 到 `[pa, pa + len)` 的映射，页粒度
    ///
    /// A page that is already mapped stops the walk with [`MmError::Remap`];
    /// earlier pages of the range stay mapped.
    pub fn try_map(
        &mut self,
        frames: &FrameAllocator,
        va: VirtAddr,
        pa: PhysAddr,
        len: usize,
        flags: PTEFlags,
    ) -> Result<(), MmError> {
        if !va.aligned() {
            return Err(MmError::Misaligned(va.into()));
        }
        if !pa.aligned() {
            return Err(MmError::Misaligned(pa.into()));
        }
        Self::check_range(va, len)?;
        if !flags.intersects(PTEFlags::rwx()) {
            return Err(MmError::NoPermission(va));
        }
        debug!("map {:?} -> {:?} len {:#x} {:?}", va, pa, len, flags);

        let (mut a, mut p) = (usize::from(va), usize::from(pa));
        let last = a + len;
        while a < last {
            let va = VirtAddr::from(a);
            let Some(pte) = self.walk(va, Some(frames))? else {
                panic!("vm_mappages: no slot for {:?}", va);
            };
            if pte.is_valid() {
                return Err(MmError::Remap(va));
            }
            *pte = PageTableEntry::new(PhysAddr::from(p).floor(), flags | PTEFlags::V);
            a += PAGE_SIZE;
            p += PAGE_SIZE;
        }
        Ok(())
    }

    /// Map `[va, va + len)` onto `[pa, pa + len)`. Panics on any failure.
    pub fn map(
        &mut self,
        frames: &FrameAllocator,
        va: VirtAddr,
        pa: PhysAddr,
        len: usize,
        flags: PTEFlags,
    ) {
        self.try_map(frames, va, pa, len, flags)
            .unwrap_or_else(|err| panic!("vm_mappages: {}", err))
    }

    /// 解除 `[va, va + len)` 的映射，`free_backing` 为真时释放对应物理页帧
    ///
    /// Intermediate tables are left in place, even when they become empty.
    pub fn try_unmap(
        &mut self,
        frames: &FrameAllocator,
        va: VirtAddr,
        len: usize,
        free_backing: bool,
    ) -> Result<(), MmError> {
        if !va.aligned() {
            return Err(MmError::Misaligned(va.into()));
        }
        Self::check_range(va, len)?;
        debug!("unmap {:?} len {:#x} free {}", va, len, free_backing);

        let mut a = usize::from(va);
        let last = a + len;
        while a < last {
            let va = VirtAddr::from(a);
            let pte = match self.walk(va, None)? {
                Some(pte) if pte.is_valid() => pte,
                _ => return Err(MmError::NotMapped(va)),
            };
            assert!(pte.is_leaf(), "vm_unmappages: unexpected non-leaf at {:?}", va);
            if free_backing {
                frames.try_free(pte.ppn().into(), self.domain)?;
            }
            *pte = PageTableEntry::empty();
            a += PAGE_SIZE;
        }
        Ok(())
    }

    /// Unmap `[va, va + len)`. Panics on any failure.
    pub fn unmap(&mut self, frames: &FrameAllocator, va: VirtAddr, len: usize, free_backing: bool) {
        self.try_unmap(frames, va, len, free_backing)
            .unwrap_or_else(|err| panic!("vm_unmappages: {}", err))
    }

    /// Call `f` on every present entry, parents before children.
    ///
    /// Panics on a leaf above level 0 or a non-leaf at level 0.
    pub fn visit(&self, mut f: impl FnMut(&PteVisit)) {
        Self::visit_table(self.root_ppn, PAGE_TABLE_LEVELS - 1, 0, &mut f);
    }

    fn visit_table<F: FnMut(&PteVisit)>(ppn: PhysPageNum, level: usize, prefix: usize, f: &mut F) {
        for (index, pte) in ppn.get_pte_array().iter().enumerate() {
            if !pte.is_valid() {
                continue;
            }
            if level > 0 {
                assert!(
                    pte.is_interior(),
                    "vm_print: leaf {:?} at level {} index {}",
                    pte,
                    level,
                    index
                );
            } else {
                assert!(pte.is_leaf(), "vm_print: non-leaf {:?} at index {}", pte, index);
            }
            let vpn = (prefix << PTE_INDEX_BITS) | index;
            f(&PteVisit {
                level,
                index,
                va: VirtPageNum::from(vpn << (PTE_INDEX_BITS * level)).into(),
                pte: *pte,
            });
            if level > 0 {
                Self::visit_table(pte.ppn(), level - 1, vpn, f);
            }
        }
    }

    /// Log every present entry of the table.
    pub fn dump(&self) {
        const INDENT: [&str; PAGE_TABLE_LEVELS] = [".. .. .. ", ".. .. ", ".. "];
        info!("level-2 pgtbl: pa = {:?}", self.root());
        self.visit(|v| {
            if v.pte.is_leaf() {
                info!(
                    "{}physical page {}: va = {:?} pa = {:?} flags = {:?}",
                    INDENT[v.level],
                    v.index,
                    v.va,
                    PhysAddr::from(v.pte.ppn()),
                    v.pte.flags()
                );
            } else {
                info!(
                    "{}level-{} pgtbl {}: pa = {:?}",
                    INDENT[v.level],
                    v.level - 1,
                    v.index,
                    PhysAddr::from(v.pte.ppn())
                );
            }
        });
    }
}

impl core::fmt::Debug for PageTable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_fmt(format_args!(
            "PageTable({:?}, {})",
            PhysAddr::from(self.root_ppn),
            self.domain
        ))
    }
}

const _: () = assert!(NUM_PTE_PER_TABLE * core::mem::size_of::<PageTableEntry>() == PAGE_SIZE);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mm::test_support::TestMemory;

    fn va(v: usize) -> VirtAddr {
        VirtAddr::from(v)
    }

    #[test]
    fn pte_fields() {
        let ppn = PhysPageNum::from(0x8_0123);
        let pte = PageTableEntry::new(ppn, PTEFlags::V | PTEFlags::R | PTEFlags::W);
        assert_eq!(pte.bits, 0x8_0123 << 10 | 0b111);
        assert_eq!(pte.ppn(), ppn);
        assert!(pte.is_valid() && pte.readable() && pte.writable() && !pte.executable());
        assert!(pte.is_leaf() && !pte.is_interior());

        let interior = PageTableEntry::new(ppn, PTEFlags::V);
        assert!(interior.is_interior() && !interior.is_leaf());

        let invalid = PageTableEntry::new(ppn, PTEFlags::R);
        assert!(!invalid.is_valid() && !invalid.is_leaf() && !invalid.is_interior());
        assert!(!PageTableEntry::empty().is_valid());
    }

    #[test]
    fn pte_ppn_field_ignores_high_bits() {
        let pte = PageTableEntry {
            bits: (0x3ff << 54) | (0xabc << 10) | 0x3ff,
        };
        assert_eq!(pte.ppn(), PhysPageNum::from(0xabc));
        assert_eq!(pte.flags(), PTEFlags::all());
    }

    #[test]
    fn walk_without_create_finds_nothing() {
        let mem = TestMemory::new(8, 0);
        let mut pt = PageTable::new(&mem);
        let free = mem.region(RegionKind::Kernel).allocable;
        assert!(pt.find_pte(&mem, va(0x1000), false).is_none());
        assert_eq!(mem.region(RegionKind::Kernel).allocable, free);
    }

    #[test]
    fn walk_with_create_builds_interior_levels() {
        let mem = TestMemory::new(8, 0);
        let mut pt = PageTable::new(&mem);
        let free = mem.region(RegionKind::Kernel).allocable;

        let pte = pt.find_pte(&mem, va(0x4000_0000), true).unwrap();
        assert!(!pte.is_valid());
        // one level-1 and one level-0 table
        assert_eq!(mem.region(RegionKind::Kernel).allocable, free - 2);

        let root = pt.root().floor().get_pte_array();
        assert!(root[1].is_interior());
        assert_eq!(root[1].flags(), PTEFlags::V);

        // a neighbour in the same level-0 table needs no new frames
        assert!(pt.find_pte(&mem, va(0x4000_1000), true).is_some());
        assert_eq!(mem.region(RegionKind::Kernel).allocable, free - 2);
        assert!(pt.find_pte(&mem, va(0x4000_1000), false).is_some());
    }

    #[test]
    #[should_panic(expected = "is beyond the highest virtual address")]
    fn walk_beyond_va_max_is_fatal() {
        let mem = TestMemory::new(4, 0);
        let mut pt = PageTable::new(&mem);
        pt.find_pte(&mem, va(VA_MAX), false);
    }

    #[test]
    #[should_panic(expected = "has R/W/X")]
    fn interior_entry_with_permissions_is_fatal() {
        let mem = TestMemory::new(8, 0);
        let mut pt = PageTable::new(&mem);
        pt.find_pte(&mem, va(0), true);
        pt.root().floor().get_pte_array()[0].bits |= PTEFlags::W.bits() as usize;
        pt.find_pte(&mem, va(0), false);
    }

    #[test]
    fn map_then_walk_yields_leaf() {
        let mem = TestMemory::new(8, 4);
        let mut pt = PageTable::new(&mem);
        let frame = mem.alloc(RegionKind::User);
        let flags = PTEFlags::R | PTEFlags::W;

        pt.map(&mem, va(0x2000_0000), frame, PAGE_SIZE, flags);
        let pte = *pt.find_pte(&mem, va(0x2000_0000), false).unwrap();
        assert!(pte.is_leaf());
        assert_eq!(pte.flags(), flags | PTEFlags::V);
        assert_eq!(PhysAddr::from(pte.ppn()), frame);
        assert_eq!(
            pt.translate(va(0x2000_0123)),
            Some(PhysAddr::from(usize::from(frame) + 0x123))
        );
        assert_eq!(pt.translate(va(0x2000_1000)), None);
    }

    #[test]
    fn map_covers_every_page_of_a_range() {
        let mem = TestMemory::new(8, 0);
        let mut pt = PageTable::new(&mem);
        // a range straddling two level-0 tables
        let base = 0x1f_e000;
        pt.map(&mem, va(base), PhysAddr::from(0x8000_0000), 4 * PAGE_SIZE, PTEFlags::R | PTEFlags::X);
        for i in 0..4 {
            let pte = *pt.find_pte(&mem, va(base + i * PAGE_SIZE), false).unwrap();
            assert!(pte.is_leaf());
            assert_eq!(PhysAddr::from(pte.ppn()), PhysAddr::from(0x8000_0000 + i * PAGE_SIZE));
            assert!(pte.readable() && pte.executable() && !pte.writable());
        }
        assert!(!pt.find_pte(&mem, va(base + 4 * PAGE_SIZE), false).unwrap().is_valid());
    }

    #[test]
    fn partial_length_maps_the_last_page() {
        let mem = TestMemory::new(8, 0);
        let mut pt = PageTable::new(&mem);
        pt.map(&mem, va(0x1000), PhysAddr::from(0x8000_0000), PAGE_SIZE + 1, PTEFlags::R);
        assert!(pt.translate(va(0x2000)).is_some());
        assert!(pt.translate(va(0x3000)).is_none());
    }

    #[test]
    fn walk_reports_exhaustion_and_keeps_built_levels() {
        // the root takes one frame, the level-1 table the other
        let mem = TestMemory::new(2, 0);
        let mut pt = PageTable::new(&mem);
        assert_eq!(
            pt.try_find_pte(&mem, va(0x1000), true).map(|pte| pte.is_some()),
            Err(MmError::OutOfFrames(RegionKind::Kernel))
        );
        let mut seen = Vec::new();
        pt.visit(|v| seen.push((v.level, v.index)));
        assert_eq!(seen, [(2, 0)]);
        assert_eq!(pt.try_find_pte(&mem, va(0x1000), false).map(|pte| pte.is_some()), Ok(false));
    }

    #[test]
    fn map_exhaustion_leaves_earlier_pages_mapped() {
        // root, one level-1 and one level-0 table; the range needs a second level-0 table
        let mem = TestMemory::new(3, 0);
        let mut pt = PageTable::new(&mem);
        let base = 0x1f_e000;
        assert_eq!(
            pt.try_map(&mem, va(base), PhysAddr::from(0x8000_0000), 4 * PAGE_SIZE, PTEFlags::R),
            Err(MmError::OutOfFrames(RegionKind::Kernel))
        );
        assert_eq!(pt.translate(va(base)), Some(PhysAddr::from(0x8000_0000)));
        assert_eq!(pt.translate(va(base + PAGE_SIZE)), Some(PhysAddr::from(0x8000_1000)));
        assert_eq!(pt.translate(va(base + 2 * PAGE_SIZE)), None);
        assert_eq!(pt.translate(va(base + 3 * PAGE_SIZE)), None);
    }

    #[test]
    #[should_panic(expected = "kernel region has no free frame")]
    fn map_exhaustion_is_fatal() {
        let mem = TestMemory::new(2, 0);
        let mut pt = PageTable::new(&mem);
        pt.map(&mem, va(0x1000), PhysAddr::from(0x8000_0000), PAGE_SIZE, PTEFlags::R);
    }

    #[test]
    fn map_rejects_bad_arguments() {
        let mem = TestMemory::new(8, 0);
        let mut pt = PageTable::new(&mem);
        let pa = PhysAddr::from(0x8000_0000);
        let rw = PTEFlags::R | PTEFlags::W;
        assert_eq!(
            pt.try_map(&mem, va(0x1008), pa, PAGE_SIZE, rw),
            Err(MmError::Misaligned(0x1008))
        );
        assert_eq!(
            pt.try_map(&mem, va(0x1000), PhysAddr::from(0x8000_0010), PAGE_SIZE, rw),
            Err(MmError::Misaligned(0x8000_0010))
        );
        assert_eq!(
            pt.try_map(&mem, va(0x1000), pa, 0, rw),
            Err(MmError::BadRange { va: va(0x1000), len: 0 })
        );
        assert_eq!(
            pt.try_map(&mem, va(VA_MAX - PAGE_SIZE), pa, 2 * PAGE_SIZE, rw),
            Err(MmError::BadRange {
                va: va(VA_MAX - PAGE_SIZE),
                len: 2 * PAGE_SIZE
            })
        );
        assert_eq!(
            pt.try_map(&mem, va(0x1000), pa, PAGE_SIZE, PTEFlags::U),
            Err(MmError::NoPermission(va(0x1000)))
        );
        // the highest page is fine
        assert_eq!(pt.try_map(&mem, va(VA_MAX - PAGE_SIZE), pa, PAGE_SIZE, rw), Ok(()));
    }

    #[test]
    fn remap_stops_after_earlier_pages() {
        let mem = TestMemory::new(8, 0);
        let mut pt = PageTable::new(&mem);
        let rw = PTEFlags::R | PTEFlags::W;
        pt.map(&mem, va(0x5000), PhysAddr::from(0x8010_0000), PAGE_SIZE, rw);

        assert_eq!(
            pt.try_map(&mem, va(0x4000), PhysAddr::from(0x8020_0000), 3 * PAGE_SIZE, rw),
            Err(MmError::Remap(va(0x5000)))
        );
        // the page before the conflict got the new mapping, the conflict kept the old one
        assert_eq!(pt.translate(va(0x4000)), Some(PhysAddr::from(0x8020_0000)));
        assert_eq!(pt.translate(va(0x5000)), Some(PhysAddr::from(0x8010_0000)));
        assert_eq!(pt.translate(va(0x6000)), None);
    }

    #[test]
    #[should_panic(expected = "is mapped before mapping")]
    fn remap_is_fatal() {
        let mem = TestMemory::new(8, 0);
        let mut pt = PageTable::new(&mem);
        pt.map(&mem, va(0x5000), PhysAddr::from(0x8010_0000), PAGE_SIZE, PTEFlags::R);
        pt.map(&mem, va(0x5000), PhysAddr::from(0x8020_0000), PAGE_SIZE, PTEFlags::R);
    }

    #[test]
    fn map_two_pages_then_unmap_and_free() {
        let mem = TestMemory::new(8, 4);
        let mut pt = PageTable::new(&mem);
        let rw = PTEFlags::R | PTEFlags::W;
        let (f1, f2) = (mem.alloc(RegionKind::User), mem.alloc(RegionKind::User));
        assert_eq!(mem.region(RegionKind::User).allocable, 2);

        pt.map(&mem, va(0x1000), f1, PAGE_SIZE, rw);
        pt.map(&mem, va(0x40_0000), f2, PAGE_SIZE, rw);
        for (v, f) in [(0x1000, f1), (0x40_0000, f2)] {
            let pte = *pt.find_pte(&mem, va(v), false).unwrap();
            assert!(pte.is_leaf());
            assert_eq!(PhysAddr::from(pte.ppn()), f);
            assert_eq!(pte.flags(), rw | PTEFlags::V);
        }

        pt.unmap(&mem, va(0x1000), PAGE_SIZE, true);
        pt.unmap(&mem, va(0x40_0000), PAGE_SIZE, true);
        for v in [0x1000, 0x40_0000] {
            assert!(pt
                .find_pte(&mem, va(v), false)
                .map_or(true, |pte| !pte.is_valid()));
        }
        assert_eq!(mem.region(RegionKind::User).allocable, 4);
    }

    #[test]
    fn unmap_without_free_keeps_the_frame() {
        let mem = TestMemory::new(8, 2);
        let mut pt = PageTable::new(&mem);
        let frame = mem.alloc(RegionKind::User);
        pt.map(&mem, va(0x1000), frame, PAGE_SIZE, PTEFlags::R);
        pt.unmap(&mem, va(0x1000), PAGE_SIZE, false);
        assert_eq!(pt.translate(va(0x1000)), None);
        assert_eq!(mem.region(RegionKind::User).allocable, 1);
    }

    #[test]
    fn unmap_rejects_missing_pages() {
        let mem = TestMemory::new(8, 0);
        let mut pt = PageTable::new(&mem);
        // no intermediate tables at all
        assert_eq!(
            pt.try_unmap(&mem, va(0x1000), PAGE_SIZE, false),
            Err(MmError::NotMapped(va(0x1000)))
        );
        // intermediate tables exist, the leaf does not
        pt.map(&mem, va(0x1000), PhysAddr::from(0x8000_0000), PAGE_SIZE, PTEFlags::R);
        assert_eq!(
            pt.try_unmap(&mem, va(0x1000), 2 * PAGE_SIZE, false),
            Err(MmError::NotMapped(va(0x2000)))
        );
        assert_eq!(
            pt.try_unmap(&mem, va(0x1001), PAGE_SIZE, false),
            Err(MmError::Misaligned(0x1001))
        );
    }

    #[test]
    #[should_panic(expected = "is not mapped")]
    fn double_unmap_is_fatal() {
        let mem = TestMemory::new(8, 0);
        let mut pt = PageTable::new(&mem);
        pt.map(&mem, va(0x1000), PhysAddr::from(0x8000_0000), PAGE_SIZE, PTEFlags::R);
        pt.unmap(&mem, va(0x1000), PAGE_SIZE, false);
        pt.unmap(&mem, va(0x1000), PAGE_SIZE, false);
    }

    #[test]
    #[should_panic(expected = "unexpected non-leaf")]
    fn non_leaf_at_level_zero_is_fatal_on_unmap() {
        let mem = TestMemory::new(8, 0);
        let mut pt = PageTable::new(&mem);
        let slot = pt.find_pte(&mem, va(0x1000), true).unwrap();
        *slot = PageTableEntry::new(PhysPageNum::from(0x80000), PTEFlags::V);
        pt.unmap(&mem, va(0x1000), PAGE_SIZE, false);
    }

    #[test]
    fn visit_reports_every_level() {
        let mem = TestMemory::new(8, 0);
        let mut pt = PageTable::new(&mem);
        pt.map(&mem, va(0x4000_3000), PhysAddr::from(0x8000_0000), 2 * PAGE_SIZE, PTEFlags::R);

        let mut seen = Vec::new();
        pt.visit(|v| {
            let leaf = (v.level == 0).then(|| (PhysAddr::from(v.pte.ppn()), v.pte.flags()));
            seen.push((v.level, v.index, usize::from(v.va), leaf));
        });
        let r = PTEFlags::V | PTEFlags::R;
        assert_eq!(
            seen,
            [
                (2, 1, 0x4000_0000, None),
                (1, 0, 0x4000_0000, None),
                (0, 3, 0x4000_3000, Some((PhysAddr::from(0x8000_0000), r))),
                (0, 4, 0x4000_4000, Some((PhysAddr::from(0x8000_1000), r))),
            ]
        );
        pt.dump();
    }

    #[test]
    #[should_panic(expected = "vm_print: non-leaf")]
    fn visit_checks_leaf_level() {
        let mem = TestMemory::new(8, 0);
        let mut pt = PageTable::new(&mem);
        let slot = pt.find_pte(&mem, va(0x1000), true).unwrap();
        *slot = PageTableEntry::new(PhysPageNum::from(0x80000), PTEFlags::V);
        pt.dump();
    }
}
