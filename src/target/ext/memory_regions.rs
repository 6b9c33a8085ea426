//! Enumerate the debuggee's address space for `monitor mem`.

use crate::arch::OsError;
use crate::common::Pid;
use crate::target::Target;

/// Allocation state of a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionState {
    /// Backed by memory.
    Commit,
    /// Reserved address space, not backed.
    Reserve,
    /// Unallocated.
    Free,
}

/// What backs a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    /// A mapped executable image.
    Image,
    /// A mapped file.
    Mapped,
    /// Anonymous memory.
    Private,
    /// Unknown backing.
    Unknown,
}

bitflags::bitflags! {
    /// Region protection.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Protection: u8 {
        /// Readable.
        const READ = 1 << 0;
        /// Writable.
        const WRITE = 1 << 1;
        /// Writable, copy-on-write.
        const COPY = 1 << 2;
        /// Executable.
        const EXEC = 1 << 3;
    }
}

/// One contiguous region of the address space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRegion {
    pub start: u64,
    pub size: u64,
    pub state: RegionState,
    pub kind: RegionKind,
    pub protection: Protection,
}

/// Target Extension - Enumerate memory regions.
pub trait MemoryRegions: Target {
    /// Call `region` for every region of `pid`'s address space, in address
    /// order.
    fn memory_regions(
        &mut self,
        pid: Pid,
        region: &mut dyn FnMut(MemoryRegion),
    ) -> Result<(), OsError>;
}

define_ext!(MemoryRegionsOps, MemoryRegions);
