//! Get section relocation offsets from the target (`qOffsets`).

use crate::arch::OsError;
use crate::common::Pid;
use crate::target::Target;

/// Offsets the target loaded the main image's sections at, relative to their
/// link-time addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Offsets {
    /// The offset of the `.text` section.
    pub text: u64,
    /// The offset of the `.data` section.
    pub data: u64,
    /// The offset of the `.bss` section. GDB applies `data` when absent.
    pub bss: Option<u64>,
}

/// Target Extension - Get section relocation offsets from the target.
pub trait SectionOffsets: Target {
    /// Return the current section offsets of `pid`'s main image.
    fn section_offsets(&mut self, pid: Pid) -> Result<Offsets, OsError>;
}

define_ext!(SectionOffsetsOps, SectionOffsets);
