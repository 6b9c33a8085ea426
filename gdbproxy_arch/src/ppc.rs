//! 32-bit PowerPC backend (big-endian).

use crate::backend::{CpuBackend, CpuError};
use crate::context::{map_size, RegisterContext, RegisterMapEntry};
use crate::Machine;

/// `tw 12, r2, r2`
const TRAP: [u8; 4] = [0x7d, 0x82, 0x10, 0x08];
const MSR_SE: u64 = 1 << 10;
const PC: usize = 64;
const MSR: usize = 65;

/// PowerPC registers, in GDB order.
pub const PPC_MAP: [RegisterMapEntry; 71] = register_map! {
    feature "org.gnu.gdb.power.core" {
        "r0": 4 => "uint32",
        "r1": 4 => "uint32",
        "r2": 4 => "uint32",
        "r3": 4 => "uint32",
        "r4": 4 => "uint32",
        "r5": 4 => "uint32",
        "r6": 4 => "uint32",
        "r7": 4 => "uint32",
        "r8": 4 => "uint32",
        "r9": 4 => "uint32",
        "r10": 4 => "uint32",
        "r11": 4 => "uint32",
        "r12": 4 => "uint32",
        "r13": 4 => "uint32",
        "r14": 4 => "uint32",
        "r15": 4 => "uint32",
        "r16": 4 => "uint32",
        "r17": 4 => "uint32",
        "r18": 4 => "uint32",
        "r19": 4 => "uint32",
        "r20": 4 => "uint32",
        "r21": 4 => "uint32",
        "r22": 4 => "uint32",
        "r23": 4 => "uint32",
        "r24": 4 => "uint32",
        "r25": 4 => "uint32",
        "r26": 4 => "uint32",
        "r27": 4 => "uint32",
        "r28": 4 => "uint32",
        "r29": 4 => "uint32",
        "r30": 4 => "uint32",
        "r31": 4 => "uint32",
    }
    feature "org.gnu.gdb.power.fpu" {
        "f0": 8 => "ieee_double",
        "f1": 8 => "ieee_double",
        "f2": 8 => "ieee_double",
        "f3": 8 => "ieee_double",
        "f4": 8 => "ieee_double",
        "f5": 8 => "ieee_double",
        "f6": 8 => "ieee_double",
        "f7": 8 => "ieee_double",
        "f8": 8 => "ieee_double",
        "f9": 8 => "ieee_double",
        "f10": 8 => "ieee_double",
        "f11": 8 => "ieee_double",
        "f12": 8 => "ieee_double",
        "f13": 8 => "ieee_double",
        "f14": 8 => "ieee_double",
        "f15": 8 => "ieee_double",
        "f16": 8 => "ieee_double",
        "f17": 8 => "ieee_double",
        "f18": 8 => "ieee_double",
        "f19": 8 => "ieee_double",
        "f20": 8 => "ieee_double",
        "f21": 8 => "ieee_double",
        "f22": 8 => "ieee_double",
        "f23": 8 => "ieee_double",
        "f24": 8 => "ieee_double",
        "f25": 8 => "ieee_double",
        "f26": 8 => "ieee_double",
        "f27": 8 => "ieee_double",
        "f28": 8 => "ieee_double",
        "f29": 8 => "ieee_double",
        "f30": 8 => "ieee_double",
        "f31": 8 => "ieee_double",
    }
    feature "org.gnu.gdb.power.core" {
        "pc": 4 => "code_ptr",
        "msr": 4 => "uint32",
        "cr": 4 => "uint32",
        "lr": 4 => "code_ptr",
        "ctr": 4 => "uint32",
        "xer": 4 => "uint32",
    }
    feature "org.gnu.gdb.power.fpu" {
        "fpscr": 4 => "int",
    }
};

/// 32-bit PowerPC.
pub struct PowerPc;

impl CpuBackend for PowerPc {
    fn machine(&self) -> Machine {
        Machine::PowerPc
    }

    fn architecture(&self) -> &'static str {
        "powerpc:common"
    }

    fn register_map(&self) -> &'static [RegisterMapEntry] {
        &PPC_MAP
    }

    fn context_size(&self) -> usize {
        map_size(&PPC_MAP)
    }

    fn big_endian(&self) -> bool {
        true
    }

    fn pc_regnum(&self) -> usize {
        PC
    }

    fn expedited_registers(&self) -> &'static [usize] {
        &[1, PC, 67]
    }

    fn breakpoint_insn(&self) -> &'static [u8] {
        &TRAP
    }

    fn single_step(&self, ctx: &mut RegisterContext, enable: bool) -> Result<(), CpuError> {
        let reg = &PPC_MAP[MSR];
        let mut msr = ctx
            .read_uint(reg.offset, reg.size)
            .ok_or(CpuError::BadContext)?;
        if enable {
            msr |= MSR_SE;
        } else {
            msr &= !MSR_SE;
        }
        ctx.write_uint(reg.offset, reg.size, msr)
            .ok_or(CpuError::BadContext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{RestoreValue, XpointKind};
    use crate::test_util::FlatMemory;

    #[test]
    fn trap_is_written_big_endian() {
        let mut mem = FlatMemory::with(0x100, &[0x60, 0, 0, 0]);
        let mut ctx = PowerPc.new_context();
        let restore = PowerPc
            .insert_xpoint(&mut mem, &mut ctx, XpointKind::Break, 0x100, 4)
            .unwrap();
        assert_eq!(restore, RestoreValue::Saved(vec![0x60, 0, 0, 0]));
        let patched: Vec<u8> = (0x100..0x104).map(|a| mem.bytes[&a]).collect();
        assert_eq!(patched, [0x7d, 0x82, 0x10, 0x08]);
    }

    #[test]
    fn msr_single_step() {
        let mut ctx = PowerPc.new_context();
        PowerPc.single_step(&mut ctx, true).unwrap();
        assert_eq!(&ctx.as_bytes()[PPC_MAP[MSR].offset..][..4], &[0, 0, 0x04, 0]);
    }
}
