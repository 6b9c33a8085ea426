//! 32-bit SPARC (V8) backend (big-endian).

use crate::backend::{CpuBackend, CpuError};
use crate::context::{map_size, RegisterContext, RegisterMapEntry};
use crate::Machine;

/// `ta 1`
const TA1: [u8; 4] = [0x91, 0xd0, 0x20, 0x01];

/// SPARC registers, in GDB order.
pub const SPARC_MAP: [RegisterMapEntry; 72] = register_map! {
    feature "org.gnu.gdb.sparc.cpu" {
        "g0": 4 => "uint32",
        "g1": 4 => "uint32",
        "g2": 4 => "uint32",
        "g3": 4 => "uint32",
        "g4": 4 => "uint32",
        "g5": 4 => "uint32",
        "g6": 4 => "uint32",
        "g7": 4 => "uint32",
        "o0": 4 => "uint32",
        "o1": 4 => "uint32",
        "o2": 4 => "uint32",
        "o3": 4 => "uint32",
        "o4": 4 => "uint32",
        "o5": 4 => "uint32",
        "o6": 4 => "uint32",
        "o7": 4 => "uint32",
        "l0": 4 => "uint32",
        "l1": 4 => "uint32",
        "l2": 4 => "uint32",
        "l3": 4 => "uint32",
        "l4": 4 => "uint32",
        "l5": 4 => "uint32",
        "l6": 4 => "uint32",
        "l7": 4 => "uint32",
        "i0": 4 => "uint32",
        "i1": 4 => "uint32",
        "i2": 4 => "uint32",
        "i3": 4 => "uint32",
        "i4": 4 => "uint32",
        "i5": 4 => "uint32",
        "i6": 4 => "uint32",
        "i7": 4 => "uint32",
    }
    feature "org.gnu.gdb.sparc.fpu" {
        "f0": 4 => "ieee_single",
        "f1": 4 => "ieee_single",
        "f2": 4 => "ieee_single",
        "f3": 4 => "ieee_single",
        "f4": 4 => "ieee_single",
        "f5": 4 => "ieee_single",
        "f6": 4 => "ieee_single",
        "f7": 4 => "ieee_single",
        "f8": 4 => "ieee_single",
        "f9": 4 => "ieee_single",
        "f10": 4 => "ieee_single",
        "f11": 4 => "ieee_single",
        "f12": 4 => "ieee_single",
        "f13": 4 => "ieee_single",
        "f14": 4 => "ieee_single",
        "f15": 4 => "ieee_single",
        "f16": 4 => "ieee_single",
        "f17": 4 => "ieee_single",
        "f18": 4 => "ieee_single",
        "f19": 4 => "ieee_single",
        "f20": 4 => "ieee_single",
        "f21": 4 => "ieee_single",
        "f22": 4 => "ieee_single",
        "f23": 4 => "ieee_single",
        "f24": 4 => "ieee_single",
        "f25": 4 => "ieee_single",
        "f26": 4 => "ieee_single",
        "f27": 4 => "ieee_single",
        "f28": 4 => "ieee_single",
        "f29": 4 => "ieee_single",
        "f30": 4 => "ieee_single",
        "f31": 4 => "ieee_single",
    }
    feature "org.gnu.gdb.sparc.cp0" {
        "y": 4 => "uint32",
        "psr": 4 => "uint32",
        "wim": 4 => "uint32",
        "tbr": 4 => "uint32",
        "pc": 4 => "code_ptr",
        "npc": 4 => "code_ptr",
        "fsr": 4 => "uint32",
        "csr": 4 => "uint32",
    }
};

/// 32-bit SPARC.
pub struct Sparc;

impl CpuBackend for Sparc {
    fn machine(&self) -> Machine {
        Machine::Sparc
    }

    fn architecture(&self) -> &'static str {
        "sparc"
    }

    fn register_map(&self) -> &'static [RegisterMapEntry] {
        &SPARC_MAP
    }

    fn context_size(&self) -> usize {
        map_size(&SPARC_MAP)
    }

    fn big_endian(&self) -> bool {
        true
    }

    fn pc_regnum(&self) -> usize {
        68
    }

    fn expedited_registers(&self) -> &'static [usize] {
        &[14, 30, 68, 69]
    }

    fn breakpoint_insn(&self) -> &'static [u8] {
        &TA1
    }

    fn single_step(&self, _ctx: &mut RegisterContext, _enable: bool) -> Result<(), CpuError> {
        Err(CpuError::Unsupported)
    }

    // `npc` must follow `pc`, or the trap would resume at the old successor
    fn set_pc(&self, ctx: &mut RegisterContext, pc: u64) -> Result<(), CpuError> {
        let pc_reg = &SPARC_MAP[68];
        let npc_reg = &SPARC_MAP[69];
        ctx.write_uint(pc_reg.offset, 4, pc)
            .and_then(|_| ctx.write_uint(npc_reg.offset, 4, pc.wrapping_add(4)))
            .ok_or(CpuError::BadContext)
    }
}
