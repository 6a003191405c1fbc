use thiserror::Error;

use super::{PhysAddr, RegionKind, VirtAddr};

/// Failures a caller may want to handle instead of halting.
///
/// Structural corruption of a page table is never reported here; it always
/// panics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MmError {
    #[error("bad region [{begin:?}, {end:?})")]
    BadRegion { begin: PhysAddr, end: PhysAddr },
    #[error("{0} region has no free frame")]
    OutOfFrames(RegionKind),
    #[error("{0:#x} is not page aligned")]
    Misaligned(usize),
    #[error("{pa:?} is out of the {region} region")]
    OutOfRegion { pa: PhysAddr, region: RegionKind },
    #[error("bad range {va:?} + {len:#x}")]
    BadRange { va: VirtAddr, len: usize },
    #[error("{0:?} is beyond the highest virtual address")]
    VirtAddrOutOfRange(VirtAddr),
    #[error("{0:?} is mapped before mapping")]
    Remap(VirtAddr),
    #[error("{0:?} is not mapped")]
    NotMapped(VirtAddr),
    #[error("{0:?} would be mapped without R, W or X")]
    NoPermission(VirtAddr),
}
