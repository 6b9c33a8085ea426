//! Backends for 32-bit x86 and x86-64.

use crate::backend::{CpuBackend, CpuError, Memory, RestoreValue, XpointKind};
use crate::context::{RegisterContext, RegisterMapEntry};
use crate::debug_regs::{allocate, DebugRegLayout, WatchSlot};
use crate::Machine;

pub mod reg;

use reg::*;

const EFLAGS_TF: u64 = 0x100;
const INT3: [u8; 1] = [0xcc];

/// Backend shared by both x86 flavours.
pub struct X86 {
    amd64: bool,
}

/// 32-bit x86.
pub static I386: X86 = X86 { amd64: false };
/// x86-64.
pub static AMD64: X86 = X86 { amd64: true };

impl X86 {
    fn width(&self) -> usize {
        if self.amd64 {
            8
        } else {
            4
        }
    }

    fn debug_layout(&self) -> DebugRegLayout {
        let base = if self.amd64 {
            AMD64_DEBUG_REGS
        } else {
            I386_DEBUG_REGS
        };
        let w = self.width();
        DebugRegLayout {
            addr: [base, base + w, base + 2 * w, base + 3 * w],
            dr6: base + 4 * w,
            dr7: base + 5 * w,
            width: w,
            allow_len8: self.amd64,
        }
    }

    fn eflags(&self) -> &'static RegisterMapEntry {
        if self.amd64 {
            &AMD64_MAP[AMD64_EFLAGS]
        } else {
            &I386_MAP[I386_EFLAGS]
        }
    }
}

impl CpuBackend for X86 {
    fn machine(&self) -> Machine {
        if self.amd64 {
            Machine::Amd64
        } else {
            Machine::I386
        }
    }

    fn architecture(&self) -> &'static str {
        if self.amd64 {
            "i386:x86-64"
        } else {
            "i386"
        }
    }

    fn register_map(&self) -> &'static [RegisterMapEntry] {
        if self.amd64 {
            &AMD64_MAP
        } else {
            &I386_MAP
        }
    }

    fn context_size(&self) -> usize {
        if self.amd64 {
            AMD64_CONTEXT_SIZE
        } else {
            I386_CONTEXT_SIZE
        }
    }

    fn pc_regnum(&self) -> usize {
        if self.amd64 {
            AMD64_RIP
        } else {
            I386_EIP
        }
    }

    fn expedited_registers(&self) -> &'static [usize] {
        if self.amd64 {
            &AMD64_EXPEDITED
        } else {
            &I386_EXPEDITED
        }
    }

    fn breakpoint_insn(&self) -> &'static [u8] {
        &INT3
    }

    fn trap_advances_pc(&self) -> bool {
        true
    }

    fn max_insn_len(&self) -> usize {
        15
    }

    fn target_xml_types(&self, feature: &str) -> &'static str {
        match feature {
            CORE => EFLAGS_TYPE,
            SSE => MXCSR_TYPE,
            _ => "",
        }
    }

    fn single_step(&self, ctx: &mut RegisterContext, enable: bool) -> Result<(), CpuError> {
        let reg = self.eflags();
        let mut eflags = ctx
            .read_uint(reg.offset, reg.size)
            .ok_or(CpuError::BadContext)?;
        if enable {
            eflags |= EFLAGS_TF;
        } else {
            eflags &= !EFLAGS_TF;
        }
        ctx.write_uint(reg.offset, reg.size, eflags)
            .ok_or(CpuError::BadContext)
    }

    fn insert_xpoint(
        &self,
        mem: &mut dyn Memory,
        ctx: &mut RegisterContext,
        kind: XpointKind,
        addr: u64,
        size: u64,
    ) -> Result<RestoreValue, CpuError> {
        if kind == XpointKind::Break {
            return crate::backend::insert_sw_break(mem, addr, &INT3);
        }

        let layout = self.debug_layout();
        layout.check(kind, addr, size)?;
        let len = if kind == XpointKind::HwExec { 1 } else { size };

        let mut slots = layout.load(ctx)?;
        let slot = allocate(&mut slots, WatchSlot { addr, kind, len }).ok_or(CpuError::Full)?;
        layout.store(ctx, &slots)?;
        Ok(RestoreValue::Slot(slot))
    }

    fn remove_xpoint(
        &self,
        mem: &mut dyn Memory,
        ctx: &mut RegisterContext,
        kind: XpointKind,
        addr: u64,
        _size: u64,
        restore: &RestoreValue,
    ) -> Result<(), CpuError> {
        match (kind, restore) {
            (XpointKind::Break, RestoreValue::Saved(saved)) => {
                crate::backend::remove_sw_break(mem, addr, &INT3, saved)
            }
            (XpointKind::Break, _) => Err(CpuError::BadRestoreValue),
            (_, RestoreValue::Slot(slot)) => {
                let layout = self.debug_layout();
                let mut slots = layout.load(ctx)?;
                match slots.get_mut(*slot) {
                    Some(entry) => {
                        if entry.map(|e| e.addr) != Some(addr) {
                            warn!("debug register {} does not hold {:#x}", slot, addr);
                        }
                        *entry = None;
                    }
                    None => return Err(CpuError::BadRestoreValue),
                }
                layout.store(ctx, &slots)
            }
            (_, RestoreValue::Saved(_)) => Err(CpuError::BadRestoreValue),
        }
    }

    fn is_watchpoint_triggered(&self, ctx: &RegisterContext, slot: usize) -> bool {
        self.debug_layout().is_triggered(ctx, slot)
    }

    fn clear_watchpoint(&self, ctx: &mut RegisterContext, slot: usize) {
        self.debug_layout().clear_triggered(ctx, slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::FlatMemory;

    #[test]
    fn fifth_hardware_point_is_rejected() {
        let mut mem = FlatMemory::default();
        let mut ctx = AMD64.new_context();

        for i in 0..4u64 {
            let restore = AMD64
                .insert_xpoint(&mut mem, &mut ctx, XpointKind::WriteWatch, 0x1000 + 8 * i, 8)
                .unwrap();
            assert_eq!(restore, RestoreValue::Slot(i as usize));
        }
        let before = ctx.clone();

        let err = AMD64
            .insert_xpoint(&mut mem, &mut ctx, XpointKind::ReadWatch, 0x2000, 4)
            .unwrap_err();
        assert!(matches!(err, CpuError::Full));
        assert_eq!(ctx, before);

        let slots = AMD64.debug_layout().load(&ctx).unwrap();
        assert!(slots.iter().all(Option::is_some));
    }

    #[test]
    fn remove_frees_the_slot() {
        let mut mem = FlatMemory::default();
        let mut ctx = I386.new_context();

        let a = I386
            .insert_xpoint(&mut mem, &mut ctx, XpointKind::HwExec, 0x401000, 1)
            .unwrap();
        let b = I386
            .insert_xpoint(&mut mem, &mut ctx, XpointKind::WriteWatch, 0x402000, 4)
            .unwrap();
        assert_eq!(b, RestoreValue::Slot(1));

        I386.remove_xpoint(&mut mem, &mut ctx, XpointKind::HwExec, 0x401000, 1, &a)
            .unwrap();
        let c = I386
            .insert_xpoint(&mut mem, &mut ctx, XpointKind::ReadWatch, 0x403000, 2)
            .unwrap();
        assert_eq!(c, RestoreValue::Slot(0));
    }

    #[test]
    fn eight_byte_watch_is_amd64_only() {
        let mut mem = FlatMemory::default();
        let mut ctx = I386.new_context();
        let err = I386
            .insert_xpoint(&mut mem, &mut ctx, XpointKind::WriteWatch, 0x1000, 8)
            .unwrap_err();
        assert!(matches!(err, CpuError::InvalidLength(8)));
    }

    #[test]
    fn single_step_toggles_trap_flag() {
        let mut ctx = AMD64.new_context();
        let eflags = &AMD64_MAP[AMD64_EFLAGS];
        ctx.write_uint(eflags.offset, 4, 0x246).unwrap();

        AMD64.single_step(&mut ctx, true).unwrap();
        assert_eq!(ctx.read_uint(eflags.offset, 4), Some(0x346));
        AMD64.single_step(&mut ctx, false).unwrap();
        assert_eq!(ctx.read_uint(eflags.offset, 4), Some(0x246));
    }

    #[test]
    fn int3_rewind() {
        let mut ctx = I386.new_context();
        I386.set_pc(&mut ctx, 0x401001).unwrap();
        assert_eq!(I386.adjust_pc_for_break(&mut ctx, true).unwrap(), -1);
        assert_eq!(I386.pc(&ctx).unwrap(), 0x401000);
    }

    #[test]
    fn watch_trigger_reporting() {
        let mut mem = FlatMemory::default();
        let mut ctx = AMD64.new_context();
        AMD64
            .insert_xpoint(&mut mem, &mut ctx, XpointKind::WriteWatch, 0x1000, 4)
            .unwrap();

        let dr6 = AMD64_DEBUG_REGS + 4 * 8;
        ctx.write_uint(dr6, 8, 0x1).unwrap();
        assert!(AMD64.is_watchpoint_triggered(&ctx, 0));
        AMD64.clear_watchpoint(&mut ctx, 0);
        assert!(!AMD64.is_watchpoint_triggered(&ctx, 0));
    }
}
