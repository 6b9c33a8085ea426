//! 32-bit ARM backend.
//!
//! Breakpoints use the Thumb `udf #0xfe` encoding. There is no hardware
//! single-step on this architecture.

use crate::backend::{CpuBackend, CpuError};
use crate::context::{map_size, RegisterContext, RegisterMapEntry};
use crate::Machine;

const UDF_THUMB: [u8; 2] = [0xfe, 0xde];

/// ARM core registers, in GDB order.
pub const ARM_MAP: [RegisterMapEntry; 17] = register_map! {
    feature "org.gnu.gdb.arm.core" {
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
        "sp": 4 => "data_ptr",
        "lr": 4,
        "pc": 4 => "code_ptr",
        "cpsr": 4,
    }
};

/// 32-bit ARM.
pub struct Arm;

impl CpuBackend for Arm {
    fn machine(&self) -> Machine {
        Machine::Arm
    }

    fn architecture(&self) -> &'static str {
        "arm"
    }

    fn register_map(&self) -> &'static [RegisterMapEntry] {
        &ARM_MAP
    }

    fn context_size(&self) -> usize {
        map_size(&ARM_MAP)
    }

    fn pc_regnum(&self) -> usize {
        15
    }

    fn expedited_registers(&self) -> &'static [usize] {
        &[11, 13, 15]
    }

    fn breakpoint_insn(&self) -> &'static [u8] {
        &UDF_THUMB
    }

    fn single_step(&self, _ctx: &mut RegisterContext, _enable: bool) -> Result<(), CpuError> {
        Err(CpuError::Unsupported)
    }
}
