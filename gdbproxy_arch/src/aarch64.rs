//! AArch64 backend.

use crate::backend::{CpuBackend, CpuError};
use crate::context::{map_size, RegisterContext, RegisterMapEntry};
use crate::Machine;

/// `brk #0xf000`
const BRK: [u8; 4] = [0x00, 0x00, 0x3e, 0xd4];
const CPSR_SS: u64 = 0x0020_0000;
const CPSR: usize = 33;

/// AArch64 core registers, in GDB order.
pub const ARM64_MAP: [RegisterMapEntry; 34] = register_map! {
    feature "org.gnu.gdb.aarch64.core" {
        "x0": 8 => "int",
        "x1": 8 => "int",
        "x2": 8 => "int",
        "x3": 8 => "int",
        "x4": 8 => "int",
        "x5": 8 => "int",
        "x6": 8 => "int",
        "x7": 8 => "int",
        "x8": 8 => "int",
        "x9": 8 => "int",
        "x10": 8 => "int",
        "x11": 8 => "int",
        "x12": 8 => "int",
        "x13": 8 => "int",
        "x14": 8 => "int",
        "x15": 8 => "int",
        "x16": 8 => "int",
        "x17": 8 => "int",
        "x18": 8 => "int",
        "x19": 8 => "int",
        "x20": 8 => "int",
        "x21": 8 => "int",
        "x22": 8 => "int",
        "x23": 8 => "int",
        "x24": 8 => "int",
        "x25": 8 => "int",
        "x26": 8 => "int",
        "x27": 8 => "int",
        "x28": 8 => "int",
        "x29": 8 => "int",
        "x30": 8 => "int",
        "sp": 8 => "data_ptr",
        "pc": 8 => "code_ptr",
        "cpsr": 4 => "int",
    }
};

/// AArch64.
pub struct Arm64;

impl CpuBackend for Arm64 {
    fn machine(&self) -> Machine {
        Machine::Arm64
    }

    fn architecture(&self) -> &'static str {
        "aarch64"
    }

    fn register_map(&self) -> &'static [RegisterMapEntry] {
        &ARM64_MAP
    }

    fn context_size(&self) -> usize {
        map_size(&ARM64_MAP)
    }

    fn pc_regnum(&self) -> usize {
        32
    }

    fn expedited_registers(&self) -> &'static [usize] {
        &[29, 31, 32]
    }

    fn breakpoint_insn(&self) -> &'static [u8] {
        &BRK
    }

    fn single_step(&self, ctx: &mut RegisterContext, enable: bool) -> Result<(), CpuError> {
        let reg = &ARM64_MAP[CPSR];
        let mut cpsr = ctx
            .read_uint(reg.offset, reg.size)
            .ok_or(CpuError::BadContext)?;
        if enable {
            cpsr |= CPSR_SS;
        } else {
            cpsr &= !CPSR_SS;
        }
        ctx.write_uint(reg.offset, reg.size, cpsr)
            .ok_or(CpuError::BadContext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_step_uses_cpsr_ss() {
        let mut ctx = Arm64.new_context();
        Arm64.single_step(&mut ctx, true).unwrap();
        assert_eq!(ctx.read_uint(ARM64_MAP[CPSR].offset, 4), Some(CPSR_SS));
        Arm64.single_step(&mut ctx, false).unwrap();
        assert_eq!(ctx.read_uint(ARM64_MAP[CPSR].offset, 4), Some(0));
    }
}
