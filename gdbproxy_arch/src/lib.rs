//! CPU backends for `gdbproxy`.
//!
//! Every architecture the proxy can debug is described by a single type
//! implementing [`CpuBackend`]. A backend knows three things:
//!
//! - the layout of its [`RegisterContext`] (an opaque, fixed-size byte image
//!   of the thread's registers, stored in target byte order and in GDB
//!   register order, followed by any private control registers),
//! - how to plant and lift breakpoints and watchpoints, either by patching a
//!   trap instruction into memory or by programming debug registers inside the
//!   context,
//! - how to toggle the single-step trap flag.
//!
//! Backends are stateless, and are selected once per debuggee via
//! [`Machine::backend`]. All backends are always compiled in.
//!
//! Instruction decoding is not performed here. The "is this a call?" questions
//! asked during step-over are forwarded to an [`InsnClassifier`] supplied by
//! the caller.

#![deny(missing_docs)]

#[macro_use]
extern crate log;

#[macro_use]
mod context;

pub mod aarch64;
pub mod alpha;
pub mod arm;
pub mod ppc;
pub mod sparc;
pub mod x86;

mod backend;
mod debug_regs;

pub use backend::{
    ContextAccess, CpuBackend, CpuError, InsnClass, InsnClassifier, Memory, OsError,
    RestoreValue, XpointKind,
};
pub use context::{RegisterContext, RegisterMapEntry};

/// Target machine types understood by the backend registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Machine {
    /// 32-bit x86.
    I386,
    /// x86-64.
    Amd64,
    /// 32-bit ARM (Thumb-2 breakpoints).
    Arm,
    /// AArch64.
    Arm64,
    /// 32-bit big-endian PowerPC.
    PowerPc,
    /// DEC Alpha.
    Alpha,
    /// 32-bit SPARC (V8).
    Sparc,
}

impl Machine {
    /// Every machine known to the registry.
    pub const ALL: [Machine; 7] = [
        Machine::I386,
        Machine::Amd64,
        Machine::Arm,
        Machine::Arm64,
        Machine::PowerPc,
        Machine::Alpha,
        Machine::Sparc,
    ];

    /// Return the backend responsible for this machine.
    pub fn backend(self) -> &'static dyn CpuBackend {
        match self {
            Machine::I386 => &x86::I386,
            Machine::Amd64 => &x86::AMD64,
            Machine::Arm => &arm::Arm,
            Machine::Arm64 => &aarch64::Arm64,
            Machine::PowerPc => &ppc::PowerPc,
            Machine::Alpha => &alpha::Alpha,
            Machine::Sparc => &sparc::Sparc,
        }
    }

    /// Map an ELF `e_machine` value onto a machine type.
    pub fn from_elf(e_machine: u16) -> Option<Machine> {
        let machine = match e_machine {
            2 => Machine::Sparc,
            3 => Machine::I386,
            20 => Machine::PowerPc,
            40 => Machine::Arm,
            62 => Machine::Amd64,
            183 => Machine::Arm64,
            0x9026 => Machine::Alpha,
            _ => return None,
        };
        Some(machine)
    }

    /// The machine this crate was compiled for, if it has a backend.
    pub fn host() -> Option<Machine> {
        if cfg!(target_arch = "x86_64") {
            Some(Machine::Amd64)
        } else if cfg!(target_arch = "x86") {
            Some(Machine::I386)
        } else if cfg!(target_arch = "aarch64") {
            Some(Machine::Arm64)
        } else if cfg!(target_arch = "arm") {
            Some(Machine::Arm)
        } else if cfg!(target_arch = "powerpc") {
            Some(Machine::PowerPc)
        } else if cfg!(target_arch = "sparc") {
            Some(Machine::Sparc)
        } else {
            None
        }
    }

    /// Whether pointers on this machine are 32 bits wide.
    pub fn is_32bit(self) -> bool {
        matches!(
            self,
            Machine::I386 | Machine::Arm | Machine::PowerPc | Machine::Sparc
        )
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use std::collections::BTreeMap;

    use crate::{Memory, OsError};

    /// Sparse in-memory address space. Unmapped bytes fault.
    #[derive(Default)]
    pub struct FlatMemory {
        pub bytes: BTreeMap<u64, u8>,
    }

    impl FlatMemory {
        pub fn with(addr: u64, data: &[u8]) -> FlatMemory {
            let mut mem = FlatMemory::default();
            for (i, b) in data.iter().enumerate() {
                mem.bytes.insert(addr + i as u64, *b);
            }
            mem
        }
    }

    impl Memory for FlatMemory {
        fn read(&mut self, addr: u64, buf: &mut [u8]) -> Result<usize, OsError> {
            for (i, b) in buf.iter_mut().enumerate() {
                match self.bytes.get(&(addr + i as u64)) {
                    Some(v) => *b = *v,
                    None if i == 0 => return Err(OsError::BadAddress(addr)),
                    None => return Ok(i),
                }
            }
            Ok(buf.len())
        }

        fn write(&mut self, addr: u64, data: &[u8]) -> Result<usize, OsError> {
            for (i, b) in data.iter().enumerate() {
                match self.bytes.get_mut(&(addr + i as u64)) {
                    Some(v) => *v = *b,
                    None if i == 0 => return Err(OsError::BadAddress(addr)),
                    None => return Ok(i),
                }
            }
            Ok(data.len())
        }
    }
}
