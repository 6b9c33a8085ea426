//! x86 debug register slot management.
//!
//! Slots are handled as a plain `[Option<WatchSlot>; 4]`; the bit-packing of
//! DR7 only happens in [`DebugRegLayout::store`].

use crate::backend::{CpuError, XpointKind};
use crate::context::RegisterContext;

pub(crate) const NUM_SLOTS: usize = 4;

const DR7_CONTROL_SHIFT: u32 = 16;
const DR7_CONTROL_SIZE: u32 = 4;
const DR7_LOCAL_SLOWDOWN: u64 = 0x100;

const DR7_RW_EXECUTE: u64 = 0x0;
const DR7_RW_WRITE: u64 = 0x1;
const DR7_RW_READ: u64 = 0x3;

/// One programmed debug register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WatchSlot {
    pub addr: u64,
    pub kind: XpointKind,
    pub len: u64,
}

/// Where the debug registers live inside a register context.
pub(crate) struct DebugRegLayout {
    pub addr: [usize; NUM_SLOTS],
    pub dr6: usize,
    pub dr7: usize,
    pub width: usize,
    pub allow_len8: bool,
}

fn len_bits(len: u64, allow_len8: bool) -> Option<u64> {
    match len {
        1 => Some(0b00),
        2 => Some(0b01),
        4 => Some(0b11),
        8 if allow_len8 => Some(0b10),
        _ => None,
    }
}

fn decode_len(bits: u64) -> u64 {
    match bits & 0b11 {
        0b00 => 1,
        0b01 => 2,
        0b10 => 8,
        _ => 4,
    }
}

fn control_shift(slot: usize) -> u32 {
    DR7_CONTROL_SHIFT + DR7_CONTROL_SIZE * slot as u32
}

fn enable_mask(slot: usize) -> u64 {
    1 << (2 * slot)
}

impl DebugRegLayout {
    /// Validate a request before any slot is consumed.
    pub fn check(&self, kind: XpointKind, addr: u64, len: u64) -> Result<(), CpuError> {
        let len = match kind {
            XpointKind::HwExec => 1,
            _ => len,
        };
        if len_bits(len, self.allow_len8).is_none() || addr % len != 0 {
            return Err(CpuError::InvalidLength(len));
        }
        Ok(())
    }

    /// Decode the slot table from DR7 and the address registers.
    pub fn load(&self, ctx: &RegisterContext) -> Result<[Option<WatchSlot>; NUM_SLOTS], CpuError> {
        let dr7 = ctx
            .read_uint(self.dr7, self.width)
            .ok_or(CpuError::BadContext)?;

        let mut slots = [None; NUM_SLOTS];
        for (i, slot) in slots.iter_mut().enumerate() {
            if dr7 & enable_mask(i) == 0 {
                continue;
            }
            let control = (dr7 >> control_shift(i)) & 0xf;
            let kind = match control & 0b11 {
                DR7_RW_EXECUTE => XpointKind::HwExec,
                DR7_RW_WRITE => XpointKind::WriteWatch,
                _ => XpointKind::ReadWatch,
            };
            let addr = ctx
                .read_uint(self.addr[i], self.width)
                .ok_or(CpuError::BadContext)?;
            *slot = Some(WatchSlot {
                addr,
                kind,
                len: decode_len(control >> 2),
            });
        }
        Ok(slots)
    }

    /// Encode the slot table back into DR7 and the address registers.
    pub fn store(
        &self,
        ctx: &mut RegisterContext,
        slots: &[Option<WatchSlot>; NUM_SLOTS],
    ) -> Result<(), CpuError> {
        let mut dr7 = ctx
            .read_uint(self.dr7, self.width)
            .ok_or(CpuError::BadContext)?;

        for (i, slot) in slots.iter().enumerate() {
            dr7 &= !(0b11 << (2 * i));
            dr7 &= !(0xf << control_shift(i));

            let slot = match slot {
                Some(slot) => slot,
                None => continue,
            };
            let rw = match slot.kind {
                XpointKind::HwExec => DR7_RW_EXECUTE,
                XpointKind::WriteWatch => DR7_RW_WRITE,
                XpointKind::ReadWatch => DR7_RW_READ,
                XpointKind::Break => return Err(CpuError::Unsupported),
            };
            let len = len_bits(slot.len, self.allow_len8).ok_or(CpuError::InvalidLength(slot.len))?;

            ctx.write_uint(self.addr[i], self.width, slot.addr)
                .ok_or(CpuError::BadContext)?;
            dr7 |= enable_mask(i);
            dr7 |= (rw | (len << 2)) << control_shift(i);
        }

        if slots.iter().any(Option::is_some) {
            dr7 |= DR7_LOCAL_SLOWDOWN;
        } else {
            dr7 &= !DR7_LOCAL_SLOWDOWN;
        }

        ctx.write_uint(self.dr7, self.width, dr7)
            .ok_or(CpuError::BadContext)
    }

    pub fn is_triggered(&self, ctx: &RegisterContext, slot: usize) -> bool {
        slot < NUM_SLOTS
            && ctx
                .read_uint(self.dr6, self.width)
                .map(|dr6| dr6 & (1 << slot) != 0)
                .unwrap_or(false)
    }

    pub fn clear_triggered(&self, ctx: &mut RegisterContext, slot: usize) {
        if slot >= NUM_SLOTS {
            return;
        }
        if let Some(dr6) = ctx.read_uint(self.dr6, self.width) {
            ctx.write_uint(self.dr6, self.width, dr6 & !(1 << slot));
        }
    }
}

/// First free slot.
pub(crate) fn allocate(slots: &mut [Option<WatchSlot>; NUM_SLOTS], slot: WatchSlot) -> Option<usize> {
    let idx = slots.iter().position(Option::is_none)?;
    slots[idx] = Some(slot);
    Some(idx)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LAYOUT: DebugRegLayout = DebugRegLayout {
        addr: [0, 8, 16, 24],
        dr6: 32,
        dr7: 40,
        width: 8,
        allow_len8: true,
    };

    fn slot(addr: u64, kind: XpointKind, len: u64) -> WatchSlot {
        WatchSlot { addr, kind, len }
    }

    #[test]
    fn dr7_encoding() {
        let mut ctx = RegisterContext::new(48, false);
        let mut slots = [None; NUM_SLOTS];
        slots[0] = Some(slot(0x1000, XpointKind::WriteWatch, 4));
        slots[2] = Some(slot(0x2000, XpointKind::ReadWatch, 8));
        LAYOUT.store(&mut ctx, &slots).unwrap();

        let dr7 = ctx.read_uint(40, 8).unwrap();
        // slot 0: enable bit 0, control nibble 0xd (len 4, write)
        // slot 2: enable bit 4, control nibble 0xb (len 8, read/write)
        assert_eq!(dr7, 0x1 | 0x10 | 0x100 | (0xd << 16) | (0xb << 24));
        assert_eq!(ctx.read_uint(16, 8), Some(0x2000));

        assert_eq!(LAYOUT.load(&ctx).unwrap(), slots);
    }

    #[test]
    fn releasing_clears_the_slot_nibble() {
        let mut ctx = RegisterContext::new(48, false);
        let mut slots = [None; NUM_SLOTS];
        slots[1] = Some(slot(0x10, XpointKind::HwExec, 1));
        LAYOUT.store(&mut ctx, &slots).unwrap();
        assert_eq!(ctx.read_uint(40, 8), Some(0x4 | 0x100));

        slots[1] = None;
        LAYOUT.store(&mut ctx, &slots).unwrap();
        assert_eq!(ctx.read_uint(40, 8), Some(0));
    }

    #[test]
    fn allocation_takes_first_free_slot() {
        let mut slots = [None; NUM_SLOTS];
        for i in 0..NUM_SLOTS {
            let idx = allocate(&mut slots, slot(i as u64 * 4, XpointKind::WriteWatch, 4));
            assert_eq!(idx, Some(i));
        }
        assert_eq!(allocate(&mut slots, slot(0x40, XpointKind::WriteWatch, 4)), None);

        slots[2] = None;
        assert_eq!(allocate(&mut slots, slot(0x40, XpointKind::WriteWatch, 4)), Some(2));
    }

    #[test]
    fn request_validation() {
        assert!(LAYOUT.check(XpointKind::WriteWatch, 0x1001, 2).is_err());
        assert!(LAYOUT.check(XpointKind::WriteWatch, 0x1000, 3).is_err());
        assert!(LAYOUT.check(XpointKind::ReadWatch, 0x1000, 8).is_ok());
        // execute points always use length 1
        assert!(LAYOUT.check(XpointKind::HwExec, 0x1003, 0).is_ok());
    }

    #[test]
    fn dr6_trigger_bits() {
        let mut ctx = RegisterContext::new(48, false);
        ctx.write_uint(32, 8, 0b0100).unwrap();
        assert!(LAYOUT.is_triggered(&ctx, 2));
        assert!(!LAYOUT.is_triggered(&ctx, 0));
        LAYOUT.clear_triggered(&mut ctx, 2);
        assert!(!LAYOUT.is_triggered(&ctx, 2));
    }
}
