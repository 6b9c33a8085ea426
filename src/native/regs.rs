//! Register access: the general purpose registers, the FXSAVE area and the
//! debug registers, mapped onto an x86-64 register context.

use std::mem;
use std::ptr;

use nix::errno::Errno;
use nix::libc::{self, c_void};
use nix::sys::ptrace;
use nix::unistd::Pid as HostPid;

use super::os_error;
use crate::arch::x86::reg::{AMD64_DEBUG_REGS, AMD64_MAP};
use crate::arch::{OsError, RegisterContext, RegisterMapEntry};

/// Offset of `u_debugreg` in `struct user`.
const DEBUGREG_OFFSET: usize = 848;
/// Debug registers mirrored in the context, in context order.
const DEBUG_REGS: [usize; 6] = [0, 1, 2, 3, 6, 7];

const ST0: usize = 24;
const FCTRL: usize = 32;
const XMM0: usize = 40;
const MXCSR: usize = 56;

macro_rules! gp_layout {
    ($($field:ident),* $(,)?) => {
        /// Copy the general purpose registers, which lead the register map.
        fn load_gp(ctx: &mut RegisterContext, regs: &libc::user_regs_struct) -> Option<()> {
            let mut map = AMD64_MAP.iter();
            $(
                let entry = map.next()?;
                ctx.write_uint(entry.offset, entry.size, regs.$field as u64)?;
            )*
            Some(())
        }

        fn store_gp(ctx: &RegisterContext, regs: &mut libc::user_regs_struct) -> Option<()> {
            let mut map = AMD64_MAP.iter();
            $(
                let entry = map.next()?;
                regs.$field = ctx.read_uint(entry.offset, entry.size)?;
            )*
            Some(())
        }
    };
}

gp_layout!(
    rax, rbx, rcx, rdx, rsi, rdi, rbp, rsp, r8, r9, r10, r11, r12, r13, r14, r15, rip, eflags, cs,
    ss, ds, es, fs, gs,
);

fn to_bytes(words: &[u32]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

fn from_bytes(bytes: &[u8], words: &mut [u32]) {
    for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(4)) {
        *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
}

/// Expand the abridged FXSAVE tag byte into a full x87 tag word. Occupied
/// registers are reported as valid.
fn full_tag(abridged: u16) -> u64 {
    (0..8).fold(0, |tag, i| {
        let empty = abridged & (1 << i) == 0;
        tag | if empty { 0b11 << (2 * i) } else { 0 }
    })
}

fn abridged_tag(full: u64) -> u16 {
    (0..8).fold(0, |tag, i| {
        let empty = (full >> (2 * i)) & 0b11 == 0b11;
        tag | if empty { 0 } else { 1 << i }
    })
}

fn copy_into(ctx: &mut RegisterContext, entry: &RegisterMapEntry, src: &[u8]) -> Option<()> {
    ctx.register_mut(entry)?
        .copy_from_slice(src.get(..entry.size)?);
    Some(())
}

fn load_fp(ctx: &mut RegisterContext, fp: &libc::user_fpregs_struct) -> Option<()> {
    let st = to_bytes(&fp.st_space);
    for (i, entry) in AMD64_MAP[ST0..FCTRL].iter().enumerate() {
        copy_into(ctx, entry, st.get(i * 16..)?)?;
    }

    let control = [
        fp.cwd as u64,
        fp.swd as u64,
        full_tag(fp.ftw),
        0,
        fp.rip & 0xffff_ffff,
        0,
        fp.rdp & 0xffff_ffff,
        fp.fop as u64,
    ];
    for (entry, val) in AMD64_MAP[FCTRL..XMM0].iter().zip(control.iter()) {
        ctx.write_uint(entry.offset, entry.size, *val)?;
    }

    let xmm = to_bytes(&fp.xmm_space);
    for (i, entry) in AMD64_MAP[XMM0..MXCSR].iter().enumerate() {
        copy_into(ctx, entry, xmm.get(i * 16..)?)?;
    }

    let mxcsr = &AMD64_MAP[MXCSR];
    ctx.write_uint(mxcsr.offset, mxcsr.size, fp.mxcsr as u64)
}

fn store_fp(ctx: &RegisterContext, fp: &mut libc::user_fpregs_struct) -> Option<()> {
    let mut st = to_bytes(&fp.st_space);
    for (i, entry) in AMD64_MAP[ST0..FCTRL].iter().enumerate() {
        st.get_mut(i * 16..i * 16 + entry.size)?
            .copy_from_slice(ctx.register(entry)?);
    }
    from_bytes(&st, &mut fp.st_space);

    let read = |idx: usize| {
        let entry = &AMD64_MAP[idx];
        ctx.read_uint(entry.offset, entry.size)
    };
    fp.cwd = read(FCTRL)? as u16;
    fp.swd = read(FCTRL + 1)? as u16;
    fp.ftw = abridged_tag(read(FCTRL + 2)?);
    fp.rip = (fp.rip & !0xffff_ffff) | read(FCTRL + 4)?;
    fp.rdp = (fp.rdp & !0xffff_ffff) | read(FCTRL + 6)?;
    fp.fop = read(FCTRL + 7)? as u16;

    let mut xmm = to_bytes(&fp.xmm_space);
    for (i, entry) in AMD64_MAP[XMM0..MXCSR].iter().enumerate() {
        xmm.get_mut(i * 16..(i + 1) * 16)?
            .copy_from_slice(ctx.register(entry)?);
    }
    from_bytes(&xmm, &mut fp.xmm_space);

    fp.mxcsr = read(MXCSR)? as u32;
    Some(())
}

fn get_fpregs(tid: HostPid) -> Result<libc::user_fpregs_struct, OsError> {
    // SAFETY: plain old data, filled in by the kernel
    let mut fp: libc::user_fpregs_struct = unsafe { mem::zeroed() };
    let res = unsafe {
        libc::ptrace(
            libc::PTRACE_GETFPREGS,
            tid.as_raw(),
            ptr::null_mut::<c_void>(),
            &mut fp as *mut libc::user_fpregs_struct as *mut c_void,
        )
    };
    Errno::result(res).map_err(os_error)?;
    Ok(fp)
}

fn set_fpregs(tid: HostPid, fp: &libc::user_fpregs_struct) -> Result<(), OsError> {
    let res = unsafe {
        libc::ptrace(
            libc::PTRACE_SETFPREGS,
            tid.as_raw(),
            ptr::null_mut::<c_void>(),
            fp as *const libc::user_fpregs_struct as *mut c_void,
        )
    };
    Errno::result(res).map(drop).map_err(os_error)
}

fn peek_user(tid: HostPid, offset: usize) -> Result<u64, OsError> {
    let res = unsafe {
        libc::ptrace(
            libc::PTRACE_PEEKUSER,
            tid.as_raw(),
            offset as *mut c_void,
            ptr::null_mut::<c_void>(),
        )
    };
    // no debug register can legitimately hold -1
    Errno::result(res).map(|val| val as u64).map_err(os_error)
}

fn poke_user(tid: HostPid, offset: usize, val: u64) -> Result<(), OsError> {
    let res = unsafe {
        libc::ptrace(
            libc::PTRACE_POKEUSER,
            tid.as_raw(),
            offset as *mut c_void,
            val as *mut c_void,
        )
    };
    Errno::result(res).map(drop).map_err(os_error)
}

fn debug_reg_offset(n: usize) -> usize {
    DEBUGREG_OFFSET + n * 8
}

fn check_size(ctx: &RegisterContext) -> Result<(), OsError> {
    if ctx.len() < AMD64_DEBUG_REGS + DEBUG_REGS.len() * 8 {
        return Err(OsError::Unsupported);
    }
    Ok(())
}

pub(super) fn read_context(tid: HostPid, ctx: &mut RegisterContext) -> Result<(), OsError> {
    check_size(ctx)?;

    let regs = ptrace::getregs(tid).map_err(os_error)?;
    load_gp(ctx, &regs).ok_or(OsError::Unsupported)?;
    let fp = get_fpregs(tid)?;
    load_fp(ctx, &fp).ok_or(OsError::Unsupported)?;

    for (i, n) in DEBUG_REGS.iter().enumerate() {
        let val = peek_user(tid, debug_reg_offset(*n))?;
        ctx.write_uint(AMD64_DEBUG_REGS + i * 8, 8, val)
            .ok_or(OsError::Unsupported)?;
    }
    Ok(())
}

pub(super) fn write_context(tid: HostPid, ctx: &RegisterContext) -> Result<(), OsError> {
    check_size(ctx)?;

    let mut regs = ptrace::getregs(tid).map_err(os_error)?;
    store_gp(ctx, &mut regs).ok_or(OsError::Unsupported)?;
    ptrace::setregs(tid, regs).map_err(os_error)?;

    let mut fp = get_fpregs(tid)?;
    store_fp(ctx, &mut fp).ok_or(OsError::Unsupported)?;
    set_fpregs(tid, &fp)?;

    // addresses before dr7, so that enabling a slot sees its address
    for (i, n) in DEBUG_REGS.iter().enumerate() {
        let val = ctx
            .read_uint(AMD64_DEBUG_REGS + i * 8, 8)
            .ok_or(OsError::Unsupported)?;
        let offset = debug_reg_offset(*n);
        if peek_user(tid, offset)? != val {
            poke_user(tid, offset, val)?;
        }
    }
    Ok(())
}

/// The thread's `fs` base, which holds its thread control block.
pub(super) fn thread_pointer(tid: HostPid) -> Result<u64, OsError> {
    Ok(ptrace::getregs(tid).map_err(os_error)?.fs_base)
}

pub(super) fn program_counter(tid: HostPid) -> Result<u64, OsError> {
    Ok(ptrace::getregs(tid).map_err(os_error)?.rip)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::Machine;

    #[test]
    fn tag_word_round_trips_occupancy() {
        assert_eq!(full_tag(0), 0xffff);
        assert_eq!(full_tag(0x01), 0xfffc);
        assert_eq!(abridged_tag(0xfffc), 0x01);
        assert_eq!(abridged_tag(full_tag(0xa5)), 0xa5);
    }

    #[test]
    fn general_registers_follow_the_register_map() {
        let mut ctx = Machine::Amd64.backend().new_context();
        // SAFETY: plain old data
        let mut regs: libc::user_regs_struct = unsafe { mem::zeroed() };
        regs.rip = 0x401000;
        regs.eflags = 0x246;
        regs.gs = 0x2b;

        load_gp(&mut ctx, &regs).unwrap();
        assert_eq!(Machine::Amd64.backend().pc(&ctx).unwrap(), 0x401000);
        assert_eq!(ctx.read_uint(AMD64_MAP[17].offset, 4), Some(0x246));

        let mut back: libc::user_regs_struct = unsafe { mem::zeroed() };
        store_gp(&ctx, &mut back).unwrap();
        assert_eq!(back.rip, 0x401000);
        assert_eq!(back.gs, 0x2b);
    }

    #[test]
    fn fxsave_area_is_unpacked() {
        let mut ctx = Machine::Amd64.backend().new_context();
        let mut fp: libc::user_fpregs_struct = unsafe { mem::zeroed() };
        fp.cwd = 0x37f;
        fp.mxcsr = 0x1f80;
        fp.xmm_space[4] = 0xdead_beef;
        fp.st_space[0] = 0x1234_5678;

        load_fp(&mut ctx, &fp).unwrap();
        assert_eq!(ctx.read_uint(AMD64_MAP[FCTRL].offset, 4), Some(0x37f));
        assert_eq!(ctx.read_uint(AMD64_MAP[MXCSR].offset, 4), Some(0x1f80));
        assert_eq!(ctx.read_uint(AMD64_MAP[XMM0 + 1].offset, 4), Some(0xdead_beef));
        assert_eq!(ctx.read_uint(AMD64_MAP[ST0].offset, 4), Some(0x1234_5678));

        let mut back: libc::user_fpregs_struct = unsafe { mem::zeroed() };
        store_fp(&ctx, &mut back).unwrap();
        assert_eq!(back.xmm_space[4], 0xdead_beef);
        assert_eq!(back.st_space[0], 0x1234_5678);
        assert_eq!(back.ftw, 0);
    }
}
