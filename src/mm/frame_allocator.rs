//! Physical page frame allocation
//!
//! The allocatable pool is split once at boot into a kernel region (the first
//! `kernel_frames` frames) and a user region (the rest). Each region keeps a
//! LIFO free list threaded through the free frames themselves: the first word
//! of a free frame holds the address of the next free frame, or 0 at the tail.
//! A frame belongs either to its region's list or to whoever allocated it.

use core::fmt::{self, Debug, Display, Formatter};

use log::{info, trace};

use crate::config::PAGE_SIZE;
use crate::sync::SpinLock;

use super::{MmError, PhysAddr, PhysPageNum};

/// Selects the region a frame is taken from or returned to
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum RegionKind {
    Kernel,
    User,
}

impl Display for RegionKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            RegionKind::Kernel => f.write_str("kernel"),
            RegionKind::User => f.write_str("user"),
        }
    }
}

/// Read-only snapshot of a region
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RegionInfo {
    pub kind: RegionKind,
    pub begin: PhysAddr,
    pub end: PhysAddr,
    /// number of free frames at the time of the snapshot
    pub allocable: usize,
}

impl RegionInfo {
    /// number of frames the region spans
    pub fn frames(&self) -> usize {
        (usize::from(self.end) - usize::from(self.begin)) / PAGE_SIZE
    }

    pub fn contains(&self, pa: PhysAddr) -> bool {
        self.begin <= pa && pa < self.end
    }
}

/// Free list state, only touched with the region lock held
struct FreeList {
    head: Option<PhysPageNum>,
    allocable: usize,
}

/// A contiguous, page-aligned range `[begin, end)` of frames
pub struct Region {
    kind: RegionKind,
    begin: PhysAddr,
    end: PhysAddr,
    free: SpinLock<FreeList>,
}

impl Region {
    fn check(begin: PhysAddr, end: PhysAddr) -> Result<(), MmError> {
        if !begin.aligned() || !end.aligned() || begin > end {
            return Err(MmError::BadRegion { begin, end });
        }
        Ok(())
    }

    /// Build a region and push every frame of `[begin, end)` on its free list.
    ///
    /// # Safety
    ///
    /// The range must be identity-addressable memory owned by nobody else.
    unsafe fn build(
        kind: RegionKind,
        begin: PhysAddr,
        end: PhysAddr,
        name: &'static str,
    ) -> Result<Self, MmError> {
        Self::check(begin, end)?;
        let region = Self {
            kind,
            begin,
            end,
            free: SpinLock::new(
                name,
                FreeList {
                    head: None,
                    allocable: 0,
                },
            ),
        };
        let (first, last): (usize, usize) = (begin.floor().into(), end.floor().into());
        for ppn in first..last {
            region.push(ppn.into());
        }
        info!(
            "[{}] [{:?}, {:?}) with {} frames",
            name,
            begin,
            end,
            region.free.lock().allocable
        );
        Ok(region)
    }

    fn contains(&self, pa: PhysAddr) -> bool {
        self.begin <= pa && pa < self.end
    }

    fn info(&self) -> RegionInfo {
        RegionInfo {
            kind: self.kind,
            begin: self.begin,
            end: self.end,
            allocable: self.free.lock().allocable,
        }
    }

    /// Take the head of the free list.
    ///
    /// The frame still holds its link word when it leaves the list.
    fn pop(&self) -> Option<PhysPageNum> {
        let mut list = self.free.lock();
        let ppn = list.head?;
        let next: usize = *ppn.get_mut::<usize>();
        list.head = (next != 0).then(|| PhysAddr::from(next).floor());
        list.allocable -= 1;
        Some(ppn)
    }

    fn push(&self, ppn: PhysPageNum) {
        let mut list = self.free.lock();
        *ppn.get_mut::<usize>() = list.head.map_or(0, |head| PhysAddr::from(head).into());
        list.head = Some(ppn);
        list.allocable += 1;
    }
}

impl Debug for Region {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!(
            "Region({}, [{:?}, {:?}))",
            self.free.name(),
            self.begin,
            self.end
        ))
    }
}

/// Two-region physical frame allocator
#[derive(Debug)]
pub struct FrameAllocator {
    kernel: Region,
    user: Region,
}

impl FrameAllocator {
    /// Split `[begin, end)` after `kernel_frames` frames and build both regions.
    ///
    /// Panics on misaligned bounds or when the split does not fit the pool.
    ///
    /// # Safety
    ///
    /// The whole pool must be identity-addressable memory handed over to the
    /// allocator for its lifetime.
    pub unsafe fn new(begin: PhysAddr, end: PhysAddr, kernel_frames: usize) -> Self {
        Self::try_new(begin, end, kernel_frames).unwrap_or_else(|err| panic!("pmem_init: {}", err))
    }

    /// Same as [`FrameAllocator::new`], reporting bad bounds as an error.
    ///
    /// # Safety
    ///
    /// See [`FrameAllocator::new`].
    pub unsafe fn try_new(
        begin: PhysAddr,
        end: PhysAddr,
        kernel_frames: usize,
    ) -> Result<Self, MmError> {
        let split = kernel_frames
            .checked_mul(PAGE_SIZE)
            .and_then(|len| usize::from(begin).checked_add(len))
            .ok_or(MmError::BadRegion { begin, end })?;
        let split = PhysAddr::from(split);
        // both halves are checked before any frame is written
        Region::check(begin, split)?;
        Region::check(split, end)?;
        Ok(Self {
            kernel: Region::build(RegionKind::Kernel, begin, split, "kern_region")?,
            user: Region::build(RegionKind::User, split, end, "user_region")?,
        })
    }

    fn region_of(&self, kind: RegionKind) -> &Region {
        match kind {
            RegionKind::Kernel => &self.kernel,
            RegionKind::User => &self.user,
        }
    }

    /// snapshot of the bounds and free count of a region
    pub fn region(&self, kind: RegionKind) -> RegionInfo {
        self.region_of(kind).info()
    }

    /// Allocate a zero-filled frame, or report that the region is exhausted.
    pub fn try_alloc(&self, kind: RegionKind) -> Result<PhysAddr, MmError> {
        let ppn = self
            .region_of(kind)
            .pop()
            .ok_or(MmError::OutOfFrames(kind))?;
        // page cleaning happens outside the lock, the frame is ours now
        ppn.get_bytes_array().fill(0);
        trace!("alloc {} frame {:?}", kind, ppn);
        Ok(ppn.into())
    }

    /// Allocate a zero-filled frame. Panics when the region is exhausted.
    pub fn alloc(&self, kind: RegionKind) -> PhysAddr {
        self.try_alloc(kind)
            .unwrap_or_else(|err| panic!("pmem_alloc: {}", err))
    }

    /// Give a frame back to its region.
    ///
    /// Only alignment and bounds are checked: freeing the same frame twice
    /// corrupts the free list.
    pub fn try_free(&self, pa: PhysAddr, kind: RegionKind) -> Result<(), MmError> {
        if !pa.aligned() {
            return Err(MmError::Misaligned(pa.into()));
        }
        let region = self.region_of(kind);
        if !region.contains(pa) {
            return Err(MmError::OutOfRegion { pa, region: kind });
        }
        region.push(pa.floor());
        trace!("free {} frame {:?}", kind, pa);
        Ok(())
    }

    /// Give a frame back to its region. Panics on a misaligned or foreign frame.
    pub fn free(&self, pa: PhysAddr, kind: RegionKind) {
        self.try_free(pa, kind)
            .unwrap_or_else(|err| panic!("pmem_free: {}", err))
    }
}
