//! Instruction classification for range stepping, backed by capstone.

use std::fmt;

use capstone::prelude::*;

use crate::arch::{InsnClass, InsnClassifier, Machine};

/// Classifies x86 and x86-64 instructions.
pub struct CapstoneClassifier {
    x64: Capstone,
    x86: Capstone,
}

impl fmt::Debug for CapstoneClassifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapstoneClassifier").finish_non_exhaustive()
    }
}

impl CapstoneClassifier {
    /// Create a new [`CapstoneClassifier`].
    pub fn new() -> Result<Self, capstone::Error> {
        Ok(Self {
            x64: Capstone::new()
                .x86()
                .mode(arch::x86::ArchMode::Mode64)
                .build()?,
            x86: Capstone::new()
                .x86()
                .mode(arch::x86::ArchMode::Mode32)
                .build()?,
        })
    }
}

/// The absolute target of a direct branch, as capstone prints it.
fn direct_target(op_str: &str) -> Option<u64> {
    let hex = op_str.trim().strip_prefix("0x")?;
    u64::from_str_radix(hex, 16).ok()
}

fn class_of(mnemonic: &str, op_str: &str) -> InsnClass {
    match mnemonic {
        "call" => InsnClass::Call {
            target: direct_target(op_str),
        },
        "int" | "syscall" | "sysenter" => InsnClass::StepOver,
        m if m.starts_with("rep") => InsnClass::StepOver,
        _ => InsnClass::Other,
    }
}

impl InsnClassifier for CapstoneClassifier {
    fn classify(&mut self, machine: Machine, addr: u64, bytes: &[u8]) -> Option<InsnClass> {
        let cs = match machine {
            Machine::Amd64 => &self.x64,
            Machine::I386 => &self.x86,
            _ => return None,
        };

        let insns = cs.disasm_count(bytes, addr, 1).ok()?;
        let insn = insns.iter().next()?;
        let class = class_of(insn.mnemonic()?, insn.op_str().unwrap_or(""));
        trace!("{:#x}: {:?} {:?} -> {:?}", addr, insn.mnemonic(), insn.op_str(), class);
        Some(class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_call_reports_its_target() {
        let mut cs = CapstoneClassifier::new().unwrap();
        let class = cs.classify(Machine::Amd64, 0x1000, &[0xe8, 0, 0, 0, 0]);
        assert_eq!(
            class,
            Some(InsnClass::Call {
                target: Some(0x1005)
            })
        );
    }

    #[test]
    fn indirect_call_has_no_target() {
        let mut cs = CapstoneClassifier::new().unwrap();
        // call rax
        let class = cs.classify(Machine::Amd64, 0x1000, &[0xff, 0xd0]);
        assert_eq!(class, Some(InsnClass::Call { target: None }));
    }

    #[test]
    fn string_and_trap_insns_are_stepped_over() {
        let mut cs = CapstoneClassifier::new().unwrap();
        // rep movsb
        assert_eq!(
            cs.classify(Machine::Amd64, 0, &[0xf3, 0xa4]),
            Some(InsnClass::StepOver)
        );
        // syscall
        assert_eq!(
            cs.classify(Machine::Amd64, 0, &[0x0f, 0x05]),
            Some(InsnClass::StepOver)
        );
        // int 0x80
        assert_eq!(
            cs.classify(Machine::I386, 0, &[0xcd, 0x80]),
            Some(InsnClass::StepOver)
        );
    }

    #[test]
    fn plain_insns() {
        let mut cs = CapstoneClassifier::new().unwrap();
        assert_eq!(cs.classify(Machine::Amd64, 0, &[0x90]), Some(InsnClass::Other));
        assert_eq!(cs.classify(Machine::Amd64, 0, &[]), None);
        assert_eq!(cs.classify(Machine::Arm64, 0, &[0x90]), None);
    }
}
