//! x86 register layouts.
//!
//! Both layouts follow GDB's `org.gnu.gdb.i386.core` / `.sse` register order.
//! The debug registers are appended after the last GDB register; they are
//! never exposed over the wire.

use crate::context::{map_size, RegisterMapEntry};

pub(crate) const CORE: &str = "org.gnu.gdb.i386.core";
pub(crate) const SSE: &str = "org.gnu.gdb.i386.sse";

/// i386 registers, in GDB order.
pub const I386_MAP: [RegisterMapEntry; 41] = register_map! {
    feature "org.gnu.gdb.i386.core" {
        "eax": 4 => "int32",
        "ecx": 4 => "int32",
        "edx": 4 => "int32",
        "ebx": 4 => "int32",
        "esp": 4 => "data_ptr",
        "ebp": 4 => "data_ptr",
        "esi": 4 => "int32",
        "edi": 4 => "int32",
        "eip": 4 => "code_ptr",
        "eflags": 4 => "i386_eflags",
        "cs": 4 => "int32",
        "ss": 4 => "int32",
        "ds": 4 => "int32",
        "es": 4 => "int32",
        "fs": 4 => "int32",
        "gs": 4 => "int32",
        "st0": 10 => "i387_ext",
        "st1": 10 => "i387_ext",
        "st2": 10 => "i387_ext",
        "st3": 10 => "i387_ext",
        "st4": 10 => "i387_ext",
        "st5": 10 => "i387_ext",
        "st6": 10 => "i387_ext",
        "st7": 10 => "i387_ext",
        "fctrl": 4 => "int",
        "fstat": 4 => "int",
        "ftag": 4 => "int",
        "fiseg": 4 => "int",
        "fioff": 4 => "int",
        "foseg": 4 => "int",
        "fooff": 4 => "int",
        "fop": 4 => "int",
    }
    feature "org.gnu.gdb.i386.sse" {
        "xmm0": 16 => "uint128",
        "xmm1": 16 => "uint128",
        "xmm2": 16 => "uint128",
        "xmm3": 16 => "uint128",
        "xmm4": 16 => "uint128",
        "xmm5": 16 => "uint128",
        "xmm6": 16 => "uint128",
        "xmm7": 16 => "uint128",
        "mxcsr": 4 => "i386_mxcsr",
    }
};

/// x86-64 registers, in GDB order.
pub const AMD64_MAP: [RegisterMapEntry; 57] = register_map! {
    feature "org.gnu.gdb.i386.core" {
        "rax": 8 => "int64",
        "rbx": 8 => "int64",
        "rcx": 8 => "int64",
        "rdx": 8 => "int64",
        "rsi": 8 => "int64",
        "rdi": 8 => "int64",
        "rbp": 8 => "data_ptr",
        "rsp": 8 => "data_ptr",
        "r8": 8 => "int64",
        "r9": 8 => "int64",
        "r10": 8 => "int64",
        "r11": 8 => "int64",
        "r12": 8 => "int64",
        "r13": 8 => "int64",
        "r14": 8 => "int64",
        "r15": 8 => "int64",
        "rip": 8 => "code_ptr",
        "eflags": 4 => "i386_eflags",
        "cs": 4 => "int32",
        "ss": 4 => "int32",
        "ds": 4 => "int32",
        "es": 4 => "int32",
        "fs": 4 => "int32",
        "gs": 4 => "int32",
        "st0": 10 => "i387_ext",
        "st1": 10 => "i387_ext",
        "st2": 10 => "i387_ext",
        "st3": 10 => "i387_ext",
        "st4": 10 => "i387_ext",
        "st5": 10 => "i387_ext",
        "st6": 10 => "i387_ext",
        "st7": 10 => "i387_ext",
        "fctrl": 4 => "int",
        "fstat": 4 => "int",
        "ftag": 4 => "int",
        "fiseg": 4 => "int",
        "fioff": 4 => "int",
        "foseg": 4 => "int",
        "fooff": 4 => "int",
        "fop": 4 => "int",
    }
    feature "org.gnu.gdb.i386.sse" {
        "xmm0": 16 => "uint128",
        "xmm1": 16 => "uint128",
        "xmm2": 16 => "uint128",
        "xmm3": 16 => "uint128",
        "xmm4": 16 => "uint128",
        "xmm5": 16 => "uint128",
        "xmm6": 16 => "uint128",
        "xmm7": 16 => "uint128",
        "xmm8": 16 => "uint128",
        "xmm9": 16 => "uint128",
        "xmm10": 16 => "uint128",
        "xmm11": 16 => "uint128",
        "xmm12": 16 => "uint128",
        "xmm13": 16 => "uint128",
        "xmm14": 16 => "uint128",
        "xmm15": 16 => "uint128",
        "mxcsr": 4 => "i386_mxcsr",
    }
};

pub(crate) const I386_EIP: usize = 8;
pub(crate) const I386_EFLAGS: usize = 9;
pub(crate) const AMD64_RIP: usize = 16;
pub(crate) const AMD64_EFLAGS: usize = 17;

pub(crate) const I386_EXPEDITED: [usize; 3] = [5, 4, I386_EIP];
pub(crate) const AMD64_EXPEDITED: [usize; 3] = [6, 7, AMD64_RIP];

/// Offset of `dr0` in an i386 context. `dr0..dr3`, `dr6`, `dr7` follow.
pub const I386_DEBUG_REGS: usize = map_size(&I386_MAP);
/// Offset of `dr0` in an x86-64 context. `dr0..dr3`, `dr6`, `dr7` follow.
pub const AMD64_DEBUG_REGS: usize = map_size(&AMD64_MAP);

pub(crate) const I386_CONTEXT_SIZE: usize = I386_DEBUG_REGS + 6 * 4;
pub(crate) const AMD64_CONTEXT_SIZE: usize = AMD64_DEBUG_REGS + 6 * 8;

pub(crate) const EFLAGS_TYPE: &str = r#"<flags id="i386_eflags" size="4"><field name="CF" start="0" end="0"/><field name="" start="1" end="1"/><field name="PF" start="2" end="2"/><field name="AF" start="4" end="4"/><field name="ZF" start="6" end="6"/><field name="SF" start="7" end="7"/><field name="TF" start="8" end="8"/><field name="IF" start="9" end="9"/><field name="DF" start="10" end="10"/><field name="OF" start="11" end="11"/><field name="NT" start="14" end="14"/><field name="RF" start="16" end="16"/><field name="VM" start="17" end="17"/><field name="AC" start="18" end="18"/><field name="VIF" start="19" end="19"/><field name="VIP" start="20" end="20"/><field name="ID" start="21" end="21"/></flags>"#;

pub(crate) const MXCSR_TYPE: &str = r#"<flags id="i386_mxcsr" size="4"><field name="IE" start="0" end="0"/><field name="DE" start="1" end="1"/><field name="ZE" start="2" end="2"/><field name="OE" start="3" end="3"/><field name="UE" start="4" end="4"/><field name="PE" start="5" end="5"/><field name="DAZ" start="6" end="6"/><field name="IM" start="7" end="7"/><field name="DM" start="8" end="8"/><field name="ZM" start="9" end="9"/><field name="OM" start="10" end="10"/><field name="UM" start="11" end="11"/><field name="PM" start="12" end="12"/><field name="FZ" start="15" end="15"/></flags>"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_matches_gdb_numbering() {
        assert_eq!(I386_MAP[I386_EIP].name, "eip");
        assert_eq!(I386_MAP[I386_EFLAGS].offset, 36);
        assert_eq!(I386_MAP[16].name, "st0");
        assert_eq!(I386_MAP[40].name, "mxcsr");
        assert_eq!(I386_DEBUG_REGS, 308);

        assert_eq!(AMD64_MAP[AMD64_RIP].name, "rip");
        assert_eq!(AMD64_MAP[AMD64_EFLAGS].offset, 136);
        assert_eq!(AMD64_MAP[40].name, "xmm0");
        assert_eq!(AMD64_MAP[56].name, "mxcsr");
        assert_eq!(AMD64_DEBUG_REGS, 536);
    }

    #[test]
    fn features_are_split() {
        assert!(I386_MAP[..32].iter().all(|r| r.feature == Some(CORE)));
        assert!(AMD64_MAP[40..].iter().all(|r| r.feature == Some(SSE)));
    }
}
