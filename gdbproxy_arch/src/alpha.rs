//! DEC Alpha backend.
//!
//! The trap flag does not exist on Alpha, so single-stepping is unsupported.

use crate::backend::{CpuBackend, CpuError};
use crate::context::{map_size, RegisterContext, RegisterMapEntry};
use crate::Machine;

/// `call_pal bpt`
const BPT: [u8; 4] = [0x80, 0x00, 0x00, 0x00];

/// Alpha registers, in GDB order.
pub const ALPHA_MAP: [RegisterMapEntry; 66] = register_map! {
    feature "org.gnu.gdb.alpha.core" {
        "r0": 8 => "int64",
        "r1": 8 => "int64",
        "r2": 8 => "int64",
        "r3": 8 => "int64",
        "r4": 8 => "int64",
        "r5": 8 => "int64",
        "r6": 8 => "int64",
        "r7": 8 => "int64",
        "r8": 8 => "int64",
        "r9": 8 => "int64",
        "r10": 8 => "int64",
        "r11": 8 => "int64",
        "r12": 8 => "int64",
        "r13": 8 => "int64",
        "r14": 8 => "int64",
        "r15": 8 => "int64",
        "r16": 8 => "int64",
        "r17": 8 => "int64",
        "r18": 8 => "int64",
        "r19": 8 => "int64",
        "r20": 8 => "int64",
        "r21": 8 => "int64",
        "r22": 8 => "int64",
        "r23": 8 => "int64",
        "r24": 8 => "int64",
        "r25": 8 => "int64",
        "r26": 8 => "int64",
        "r27": 8 => "int64",
        "r28": 8 => "int64",
        "r29": 8 => "int64",
        "r30": 8 => "int64",
        "r31": 8 => "int64",
    }
    feature "org.gnu.gdb.alpha.fpu" {
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
    feature "org.gnu.gdb.alpha.core" {
        "pc": 8 => "code_ptr",
        "unique": 8 => "int64",
    }
};

/// DEC Alpha.
pub struct Alpha;

impl CpuBackend for Alpha {
    fn machine(&self) -> Machine {
        Machine::Alpha
    }

    fn architecture(&self) -> &'static str {
        "alpha"
    }

    fn register_map(&self) -> &'static [RegisterMapEntry] {
        &ALPHA_MAP
    }

    fn context_size(&self) -> usize {
        map_size(&ALPHA_MAP)
    }

    fn pc_regnum(&self) -> usize {
        64
    }

    fn expedited_registers(&self) -> &'static [usize] {
        &[15, 30, 64]
    }

    fn breakpoint_insn(&self) -> &'static [u8] {
        &BPT
    }

    fn single_step(&self, _ctx: &mut RegisterContext, _enable: bool) -> Result<(), CpuError> {
        Err(CpuError::Unsupported)
    }
}
