use thiserror::Error;

use crate::context::{RegisterContext, RegisterMapEntry};
use crate::Machine;

/// A failure reported by the debuggee's operating system.
#[derive(Debug, Error)]
pub enum OsError {
    /// The process or thread no longer exists.
    #[error("no such process or thread")]
    NoSuchProcess,
    /// The OS refused the operation.
    #[error("permission denied")]
    PermissionDenied,
    /// Memory at the given address is not accessible.
    #[error("cannot access memory at {0:#x}")]
    BadAddress(u64),
    /// The OS layer does not implement the operation.
    #[error("operation not supported")]
    Unsupported,
    /// Raw errno reported by the OS.
    #[error("os error {0}")]
    Errno(i32),
    /// I/O error while talking to the OS.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl OsError {
    /// POSIX errno used when reporting this error over the wire.
    pub fn errno(&self) -> u8 {
        match self {
            OsError::NoSuchProcess => 3,     // ESRCH
            OsError::PermissionDenied => 1,  // EPERM
            OsError::BadAddress(_) => 14,    // EFAULT
            OsError::Unsupported => 95,      // EOPNOTSUPP
            OsError::Errno(e) => (*e).clamp(1, 255) as u8,
            OsError::Io(e) => e.raw_os_error().map(|e| e.clamp(1, 255) as u8).unwrap_or(5),
        }
    }
}

/// A failure reported by a [`CpuBackend`].
#[derive(Debug, Error)]
pub enum CpuError {
    /// Every hardware debug slot is already in use.
    #[error("all hardware debug registers are in use")]
    Full,
    /// The architecture cannot perform the request.
    #[error("not supported on this architecture")]
    Unsupported,
    /// The length (or alignment) is unusable for this kind of point.
    #[error("unsupported length {0}")]
    InvalidLength(u64),
    /// The register context is too small for this architecture.
    #[error("register context does not match the architecture")]
    BadContext,
    /// Restore value does not belong to this kind of point.
    #[error("restore value does not match the point kind")]
    BadRestoreValue,
    /// Underlying OS failure.
    #[error(transparent)]
    Os(#[from] OsError),
}

/// Breakpoint and watchpoint kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XpointKind {
    /// Software breakpoint (trap instruction patched into memory).
    Break,
    /// Hardware execution breakpoint.
    HwExec,
    /// Hardware read (access) watchpoint.
    ReadWatch,
    /// Hardware write watchpoint.
    WriteWatch,
}

impl XpointKind {
    /// Whether this kind consumes a debug register slot.
    pub fn is_hardware(self) -> bool {
        !matches!(self, XpointKind::Break)
    }

    /// Whether this kind is a data watchpoint.
    pub fn is_watch(self) -> bool {
        matches!(self, XpointKind::ReadWatch | XpointKind::WriteWatch)
    }
}

/// What must be put back when an xpoint is removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreValue {
    /// Original instruction bytes under a software breakpoint.
    Saved(Vec<u8>),
    /// Debug register slot holding a hardware point.
    Slot(usize),
}

/// Access to the debuggee's address space.
pub trait Memory {
    /// Read into `buf`, returning how many leading bytes were read.
    ///
    /// A read that fails on the very first byte should return an error.
    fn read(&mut self, addr: u64, buf: &mut [u8]) -> Result<usize, OsError>;

    /// Write `data`, returning how many leading bytes were written.
    fn write(&mut self, addr: u64, data: &[u8]) -> Result<usize, OsError>;
}

/// Access to a single thread's register state.
pub trait ContextAccess {
    /// Fill `ctx` from the thread.
    fn read_context(&mut self, ctx: &mut RegisterContext) -> Result<(), OsError>;

    /// Commit `ctx` to the thread.
    fn write_context(&mut self, ctx: &RegisterContext) -> Result<(), OsError>;
}

/// Result of classifying the instruction at some address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsnClass {
    /// A call. `target` is known for direct calls only.
    Call {
        /// Callee address.
        target: Option<u64>,
    },
    /// Not a call, but still stepped over as a unit (software interrupts,
    /// repeated string instructions).
    StepOver,
    /// Anything else.
    Other,
}

/// Instruction classification, provided by a disassembler.
pub trait InsnClassifier {
    /// Classify the instruction encoded at the start of `bytes`, which were
    /// read from `addr`. Returns `None` if the bytes do not decode.
    fn classify(&mut self, machine: Machine, addr: u64, bytes: &[u8]) -> Option<InsnClass>;
}

/// Uniform operations over an architecture's registers and breakpoint
/// mechanics.
///
/// All methods are pure with respect to the backend itself: any state lives
/// either in the passed [`RegisterContext`] or in the debuggee's memory.
pub trait CpuBackend: Sync {
    /// The machine this backend implements.
    fn machine(&self) -> Machine;

    /// Value of the target description's `<architecture>` element.
    fn architecture(&self) -> &'static str;

    /// Registers in GDB order.
    fn register_map(&self) -> &'static [RegisterMapEntry];

    /// Full size of the context, including private control registers.
    fn context_size(&self) -> usize;

    /// Whether multi-byte registers are big-endian.
    fn big_endian(&self) -> bool {
        false
    }

    /// Index of the program counter in the register map.
    fn pc_regnum(&self) -> usize;

    /// Registers sent along with every stop reply.
    fn expedited_registers(&self) -> &'static [usize];

    /// The trap instruction used for software breakpoints.
    fn breakpoint_insn(&self) -> &'static [u8];

    /// Whether a software breakpoint trap leaves the PC after the trap
    /// instruction (and must be rewound before reporting).
    fn trap_advances_pc(&self) -> bool {
        false
    }

    /// Longest instruction encoding, used when classifying instructions.
    fn max_insn_len(&self) -> usize {
        4
    }

    /// Extra type definitions referenced by the register map's type tags.
    fn target_xml_types(&self, _feature: &str) -> &'static str {
        ""
    }

    /// A zeroed context for this architecture.
    fn new_context(&self) -> RegisterContext {
        RegisterContext::new(self.context_size(), self.big_endian())
    }

    /// Fetch a thread's context.
    fn get_context(&self, thread: &mut dyn ContextAccess) -> Result<RegisterContext, OsError> {
        let mut ctx = self.new_context();
        thread.read_context(&mut ctx)?;
        Ok(ctx)
    }

    /// Commit a thread's context.
    fn set_context(
        &self,
        thread: &mut dyn ContextAccess,
        ctx: &RegisterContext,
    ) -> Result<(), OsError> {
        thread.write_context(ctx)
    }

    /// Read the program counter.
    fn pc(&self, ctx: &RegisterContext) -> Result<u64, CpuError> {
        let reg = self
            .register_map()
            .get(self.pc_regnum())
            .ok_or(CpuError::BadContext)?;
        ctx.read_uint(reg.offset, reg.size)
            .ok_or(CpuError::BadContext)
    }

    /// Write the program counter.
    fn set_pc(&self, ctx: &mut RegisterContext, pc: u64) -> Result<(), CpuError> {
        let reg = self
            .register_map()
            .get(self.pc_regnum())
            .ok_or(CpuError::BadContext)?;
        ctx.write_uint(reg.offset, reg.size, pc)
            .ok_or(CpuError::BadContext)
    }

    /// Set or clear the single-step trap flag in `ctx`.
    fn single_step(&self, ctx: &mut RegisterContext, enable: bool) -> Result<(), CpuError>;

    /// Install an xpoint.
    ///
    /// Software breakpoints patch memory immediately. Hardware points only
    /// modify `ctx`, which the caller must commit afterwards.
    fn insert_xpoint(
        &self,
        mem: &mut dyn Memory,
        ctx: &mut RegisterContext,
        kind: XpointKind,
        addr: u64,
        size: u64,
    ) -> Result<RestoreValue, CpuError> {
        let _ = (ctx, size);
        match kind {
            XpointKind::Break => insert_sw_break(mem, addr, self.breakpoint_insn()),
            _ => Err(CpuError::Unsupported),
        }
    }

    /// Remove an xpoint previously installed with
    /// [`insert_xpoint`](CpuBackend::insert_xpoint).
    fn remove_xpoint(
        &self,
        mem: &mut dyn Memory,
        ctx: &mut RegisterContext,
        kind: XpointKind,
        addr: u64,
        size: u64,
        restore: &RestoreValue,
    ) -> Result<(), CpuError> {
        let _ = (ctx, size);
        match (kind, restore) {
            (XpointKind::Break, RestoreValue::Saved(saved)) => {
                remove_sw_break(mem, addr, self.breakpoint_insn(), saved)
            }
            (XpointKind::Break, _) => Err(CpuError::BadRestoreValue),
            _ => Err(CpuError::Unsupported),
        }
    }

    /// Whether the hardware point in `slot` reports having fired.
    fn is_watchpoint_triggered(&self, _ctx: &RegisterContext, _slot: usize) -> bool {
        false
    }

    /// Acknowledge a fired hardware point.
    fn clear_watchpoint(&self, _ctx: &mut RegisterContext, _slot: usize) {}

    /// Move the PC across a software breakpoint: backwards when `rewind` is
    /// set (entering the trap), forwards otherwise. Returns the applied delta.
    fn adjust_pc_for_break(&self, ctx: &mut RegisterContext, rewind: bool) -> Result<i64, CpuError> {
        let width = self.breakpoint_insn().len() as i64;
        let delta = if rewind { -width } else { width };
        let pc = self.pc(ctx)?;
        self.set_pc(ctx, pc.wrapping_add(delta as u64))?;
        Ok(delta)
    }

    /// If the instruction at `addr` is a call, return the callee address
    /// (when known).
    fn is_function_call(
        &self,
        classifier: &mut dyn InsnClassifier,
        mem: &mut dyn Memory,
        addr: u64,
    ) -> Option<u64> {
        match classify_at(self, classifier, mem, addr)? {
            InsnClass::Call { target } => target,
            _ => None,
        }
    }

    /// Whether a "step over" at `addr` should run to the next instruction
    /// instead of single-stepping into it.
    fn is_step_over_insn(
        &self,
        classifier: &mut dyn InsnClassifier,
        mem: &mut dyn Memory,
        addr: u64,
    ) -> bool {
        matches!(
            classify_at(self, classifier, mem, addr),
            Some(InsnClass::Call { .. }) | Some(InsnClass::StepOver)
        )
    }
}

fn classify_at<B: CpuBackend + ?Sized>(
    backend: &B,
    classifier: &mut dyn InsnClassifier,
    mem: &mut dyn Memory,
    addr: u64,
) -> Option<InsnClass> {
    let mut buf = vec![0; backend.max_insn_len()];
    let len = match mem.read(addr, &mut buf) {
        Ok(0) | Err(_) => return None,
        Ok(len) => len,
    };
    classifier.classify(backend.machine(), addr, &buf[..len])
}

/// Save the bytes at `addr` and patch `insn` over them.
pub(crate) fn insert_sw_break(
    mem: &mut dyn Memory,
    addr: u64,
    insn: &[u8],
) -> Result<RestoreValue, CpuError> {
    let mut saved = vec![0; insn.len()];
    if mem.read(addr, &mut saved)? != saved.len() {
        return Err(OsError::BadAddress(addr).into());
    }
    if mem.write(addr, insn)? != insn.len() {
        return Err(OsError::BadAddress(addr).into());
    }
    Ok(RestoreValue::Saved(saved))
}

/// Put the saved bytes back at `addr`.
pub(crate) fn remove_sw_break(
    mem: &mut dyn Memory,
    addr: u64,
    insn: &[u8],
    saved: &[u8],
) -> Result<(), CpuError> {
    let mut current = vec![0; insn.len()];
    match mem.read(addr, &mut current) {
        Ok(n) if n == current.len() && current == insn => {}
        Ok(_) => warn!(
            "breakpoint at {:#x} was overwritten (found {:02x?}), restoring anyway",
            addr, current
        ),
        Err(e) => warn!("cannot re-read breakpoint at {:#x}: {}", addr, e),
    }
    if mem.write(addr, saved)? != saved.len() {
        return Err(OsError::BadAddress(addr).into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::FlatMemory;

    struct Scripted(Option<InsnClass>);

    impl InsnClassifier for Scripted {
        fn classify(&mut self, _: Machine, _: u64, bytes: &[u8]) -> Option<InsnClass> {
            assert!(!bytes.is_empty());
            self.0
        }
    }

    #[test]
    fn sw_break_roundtrip_restores_original_bytes() {
        let backend = Machine::Arm64.backend();
        let mut mem = FlatMemory::with(0x1000, &[0x1f, 0x20, 0x03, 0xd5]);
        let mut ctx = backend.new_context();

        let restore = backend
            .insert_xpoint(&mut mem, &mut ctx, XpointKind::Break, 0x1000, 4)
            .unwrap();
        assert_eq!(restore, RestoreValue::Saved(vec![0x1f, 0x20, 0x03, 0xd5]));
        assert_eq!(mem.bytes[&0x1000], backend.breakpoint_insn()[0]);

        backend
            .remove_xpoint(&mut mem, &mut ctx, XpointKind::Break, 0x1000, 4, &restore)
            .unwrap();
        let restored: Vec<u8> = (0x1000..0x1004).map(|a| mem.bytes[&a]).collect();
        assert_eq!(restored, [0x1f, 0x20, 0x03, 0xd5]);
    }

    #[test]
    fn sw_break_on_unmapped_memory_fails() {
        let backend = Machine::I386.backend();
        let mut mem = FlatMemory::default();
        let mut ctx = backend.new_context();
        let err = backend
            .insert_xpoint(&mut mem, &mut ctx, XpointKind::Break, 0x1000, 1)
            .unwrap_err();
        assert!(matches!(err, CpuError::Os(OsError::BadAddress(0x1000))));
    }

    #[test]
    fn hardware_points_unsupported_by_default() {
        let backend = Machine::PowerPc.backend();
        let mut mem = FlatMemory::default();
        let mut ctx = backend.new_context();
        let err = backend
            .insert_xpoint(&mut mem, &mut ctx, XpointKind::WriteWatch, 0x1000, 4)
            .unwrap_err();
        assert!(matches!(err, CpuError::Unsupported));
    }

    #[test]
    fn pc_adjustment_uses_breakpoint_width() {
        let backend = Machine::Arm.backend();
        let mut ctx = backend.new_context();
        backend.set_pc(&mut ctx, 0x8002).unwrap();
        assert_eq!(backend.adjust_pc_for_break(&mut ctx, true).unwrap(), -2);
        assert_eq!(backend.pc(&ctx).unwrap(), 0x8000);
        assert_eq!(backend.adjust_pc_for_break(&mut ctx, false).unwrap(), 2);
        assert_eq!(backend.pc(&ctx).unwrap(), 0x8002);
    }

    #[test]
    fn classification_is_delegated() {
        let backend = Machine::Amd64.backend();
        let mut mem = FlatMemory::with(0x400000, &[0xe8, 0, 0, 0, 0]);

        let mut call = Scripted(Some(InsnClass::Call {
            target: Some(0x400005),
        }));
        assert_eq!(
            backend.is_function_call(&mut call, &mut mem, 0x400000),
            Some(0x400005)
        );
        assert!(backend.is_step_over_insn(&mut call, &mut mem, 0x400000));

        let mut rep = Scripted(Some(InsnClass::StepOver));
        assert_eq!(backend.is_function_call(&mut rep, &mut mem, 0x400000), None);
        assert!(backend.is_step_over_insn(&mut rep, &mut mem, 0x400000));

        let mut other = Scripted(Some(InsnClass::Other));
        assert!(!backend.is_step_over_insn(&mut other, &mut mem, 0x400000));

        // unreadable memory never reaches the classifier
        assert!(!backend.is_step_over_insn(&mut call, &mut mem, 0x10));
    }
}
