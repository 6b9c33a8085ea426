//! Debuggee memory, accessed a word at a time with `PTRACE_PEEKDATA` and
//! `PTRACE_POKEDATA`, which ignore page protections.

use std::path::Path;

use nix::libc::c_void;
use nix::sys::ptrace;
use nix::unistd::Pid as HostPid;

use crate::arch::OsError;

const WORD: u64 = 8;

fn peek(pid: HostPid, addr: u64) -> Option<[u8; 8]> {
    ptrace::read(pid, addr as ptrace::AddressType)
        .ok()
        .map(|word| word.to_le_bytes())
}

fn poke(pid: HostPid, addr: u64, word: [u8; 8]) -> bool {
    let data = i64::from_le_bytes(word);
    // SAFETY: the address lives in the tracee, not in our address space
    unsafe { ptrace::write(pid, addr as ptrace::AddressType, data as *mut c_void) }.is_ok()
}

/// Read `buf.len()` bytes at `addr`, stopping at the first inaccessible
/// word.
pub(super) fn read(pid: HostPid, addr: u64, buf: &mut [u8]) -> Result<usize, OsError> {
    let mut done = 0;
    while done < buf.len() {
        let cur = addr.wrapping_add(done as u64);
        let aligned = cur & !(WORD - 1);
        let skip = (cur - aligned) as usize;

        let word = match peek(pid, aligned) {
            Some(word) => word,
            None if done == 0 => return Err(OsError::BadAddress(cur)),
            None => break,
        };
        let n = (word.len() - skip).min(buf.len() - done);
        buf[done..done + n].copy_from_slice(&word[skip..skip + n]);
        done += n;
    }
    Ok(done)
}

/// Write `data` at `addr`, stopping at the first inaccessible word.
pub(super) fn write(pid: HostPid, addr: u64, data: &[u8]) -> Result<usize, OsError> {
    let mut done = 0;
    while done < data.len() {
        let cur = addr.wrapping_add(done as u64);
        let aligned = cur & !(WORD - 1);
        let skip = (cur - aligned) as usize;
        let n = (WORD as usize - skip).min(data.len() - done);

        // partial words keep the bytes around them
        let mut word = if n == WORD as usize {
            [0; 8]
        } else {
            match peek(pid, aligned) {
                Some(word) => word,
                None if done == 0 => return Err(OsError::BadAddress(cur)),
                None => break,
            }
        };
        word[skip..skip + n].copy_from_slice(&data[done..done + n]);

        if !poke(pid, aligned, word) {
            if done == 0 {
                return Err(OsError::BadAddress(cur));
            }
            break;
        }
        done += n;
    }
    Ok(done)
}

/// Lowest address the main image is mapped at.
pub(super) fn image_base(pid: HostPid, image: Option<&str>) -> Option<u64> {
    let image = Path::new(image?);
    proc_maps::get_process_maps(pid.as_raw())
        .ok()?
        .iter()
        .filter(|map| map.filename() == Some(image))
        .map(|map| map.start() as u64)
        .min()
}
