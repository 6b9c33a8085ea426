//! Breakpoint and watchpoint bookkeeping.
//!
//! The registry records every xpoint the controller asked for, and keeps the
//! debuggee's memory and debug registers in step with it:
//!
//! - Software breakpoints are process-wide. The trap instruction is patched
//!   in once per address; further requests at the same address only add a
//!   record sharing the saved bytes. Memory is restored when the last record
//!   at that address goes away.
//! - Hardware points are per thread. A request is installed on every thread
//!   in scope (one record per thread), and is carried over to threads created
//!   afterwards. An identical request on a thread shares the debug register
//!   slot of the one already there; the slot is released with the last
//!   record.
//!
//! Duplicate requests are not merged: each `Z` adds a record, and each `z`
//! removes exactly one.

use thiserror::Error;

use crate::arch::{CpuError, RegisterContext, RestoreValue, XpointKind};
use crate::common::{Pid, Tid};
use crate::session::{Process, ProcessMemory};
use crate::target::Target;

/// Errors raised by the [`XpointRegistry`].
#[derive(Debug, Error)]
pub enum XpointError {
    #[error(transparent)]
    Backend(#[from] CpuError),
    #[error("no matching breakpoint or watchpoint")]
    NotFound,
    #[error("no such thread")]
    NoSuchThread,
}

impl XpointError {
    /// The errno reported to the controller, or `None` if the request
    /// should be answered as unsupported.
    pub fn errno(&self) -> Option<u8> {
        let errno = match self {
            XpointError::NotFound => 2,      // ENOENT
            XpointError::NoSuchThread => 3,  // ESRCH
            XpointError::Backend(e) => match e {
                CpuError::Unsupported => return None,
                CpuError::Full => 28,             // ENOSPC
                CpuError::InvalidLength(_) => 22, // EINVAL
                CpuError::BadContext | CpuError::BadRestoreValue => 0,
                CpuError::Os(e) => e.errno(),
            },
        };
        Some(errno)
    }
}

/// An installed breakpoint or watchpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Xpoint {
    pub kind: XpointKind,
    pub addr: u64,
    /// Always 0 for software breakpoints.
    pub size: u64,
    pub pid: Pid,
    /// `None` for process-wide software breakpoints.
    pub tid: Option<Tid>,
    restore: RestoreValue,
    /// Watched bytes as of the last stop, for write watchpoints.
    snapshot: Option<Vec<u8>>,
}

impl Xpoint {
    /// Debug register slot used by a hardware point.
    pub fn slot(&self) -> Option<usize> {
        match self.restore {
            RestoreValue::Slot(slot) => Some(slot),
            RestoreValue::Saved(_) => None,
        }
    }

    fn saved(&self) -> Option<&[u8]> {
        match &self.restore {
            RestoreValue::Saved(saved) => Some(saved),
            RestoreValue::Slot(_) => None,
        }
    }

    fn in_scope(&self, pid: Pid, tid: Option<Tid>) -> bool {
        self.pid == pid && (tid.is_none() || self.tid.is_none() || self.tid == tid)
    }

    fn matches(&self, kind: XpointKind, addr: u64, size: u64) -> bool {
        self.kind == kind && self.addr == addr && self.size == size
    }
}

/// A hardware point that fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Triggered {
    pub kind: XpointKind,
    pub addr: u64,
}

fn normalize(kind: XpointKind, size: u64) -> u64 {
    match kind {
        XpointKind::Break => 0,
        _ => size,
    }
}

/// Every xpoint installed in the session's debuggees.
#[derive(Debug, Default)]
pub struct XpointRegistry {
    entries: Vec<Xpoint>,
}

impl XpointRegistry {
    pub fn new() -> XpointRegistry {
        XpointRegistry {
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Xpoint> {
        self.entries.iter()
    }

    /// Exact-match lookup.
    pub fn find(
        &self,
        pid: Pid,
        tid: Option<Tid>,
        kind: XpointKind,
        addr: u64,
        size: u64,
    ) -> Option<&Xpoint> {
        let size = normalize(kind, size);
        self.entries
            .iter()
            .find(|x| x.in_scope(pid, tid) && x.matches(kind, addr, size))
    }

    /// Whether one of our software breakpoints sits at `addr`.
    pub fn is_sw_break(&self, pid: Pid, addr: u64) -> bool {
        self.entries
            .iter()
            .any(|x| x.pid == pid && x.kind == XpointKind::Break && x.addr == addr)
    }

    /// Install an xpoint.
    ///
    /// Hardware points go on `thread` only, or on every thread of the
    /// process when `thread` is `None`. Installation succeeds if at least one
    /// thread accepted the point.
    pub fn insert(
        &mut self,
        target: &mut dyn Target,
        process: &Process,
        thread: Option<Tid>,
        kind: XpointKind,
        addr: u64,
        size: u64,
    ) -> Result<(), XpointError> {
        let size = normalize(kind, size);
        if kind == XpointKind::Break {
            return self.insert_sw(target, process, addr);
        }

        let tids: Vec<Tid> = match thread {
            Some(tid) => {
                process.thread(tid).ok_or(XpointError::NoSuchThread)?;
                vec![tid]
            }
            None => process.thread_ids().collect(),
        };

        let mut last_err = None;
        let mut installed = 0;
        for tid in tids.iter().copied() {
            match self.insert_hw(target, process, tid, kind, addr, size) {
                Ok(()) => installed += 1,
                Err(e) => {
                    warn!(
                        "cannot install {:?} at {:#x} on thread {}: {}",
                        kind, addr, tid, e
                    );
                    last_err = Some(e);
                }
            }
        }

        match last_err {
            Some(e) if installed == 0 => Err(e.into()),
            Some(_) => {
                warn!(
                    "{:?} at {:#x} installed on {} of {} threads",
                    kind,
                    addr,
                    installed,
                    tids.len()
                );
                Ok(())
            }
            None if installed == 0 => Err(XpointError::NoSuchThread),
            None => Ok(()),
        }
    }

    fn insert_sw(
        &mut self,
        target: &mut dyn Target,
        process: &Process,
        addr: u64,
    ) -> Result<(), XpointError> {
        let pid = process.pid();
        let restore = match self
            .entries
            .iter()
            .find(|x| x.pid == pid && x.kind == XpointKind::Break && x.addr == addr)
        {
            Some(existing) => existing.restore.clone(),
            None => {
                let backend = process.backend();
                let mut ctx = backend.new_context();
                let mut mem = ProcessMemory { target, pid };
                backend.insert_xpoint(&mut mem, &mut ctx, XpointKind::Break, addr, 0)?
            }
        };

        self.entries.push(Xpoint {
            kind: XpointKind::Break,
            addr,
            size: 0,
            pid,
            tid: None,
            restore,
            snapshot: None,
        });
        Ok(())
    }

    fn insert_hw(
        &mut self,
        target: &mut dyn Target,
        process: &Process,
        tid: Tid,
        kind: XpointKind,
        addr: u64,
        size: u64,
    ) -> Result<(), CpuError> {
        let pid = process.pid();
        let backend = process.backend();

        if let Some(existing) = self
            .entries
            .iter()
            .find(|x| x.pid == pid && x.tid == Some(tid) && x.matches(kind, addr, size))
        {
            let dup = existing.clone();
            self.entries.push(dup);
            return Ok(());
        }

        let mut ctx = process.read_context(target, tid)?;
        let restore = backend.insert_xpoint(
            &mut ProcessMemory {
                target: &mut *target,
                pid,
            },
            &mut ctx,
            kind,
            addr,
            size,
        )?;
        process.write_context(target, tid, &ctx)?;

        let snapshot = match kind {
            XpointKind::WriteWatch => read_exact(target, pid, addr, size),
            _ => None,
        };

        self.entries.push(Xpoint {
            kind,
            addr,
            size,
            pid,
            tid: Some(tid),
            restore,
            snapshot,
        });
        Ok(())
    }

    /// Remove one xpoint matching `(kind, addr, size)` within the scope.
    ///
    /// For hardware points, one record is removed from each thread in scope,
    /// and the point is lifted from a thread once its last matching record
    /// is gone. Records are discarded even if the backend fails to lift the
    /// point.
    pub fn remove(
        &mut self,
        target: &mut dyn Target,
        process: &Process,
        thread: Option<Tid>,
        kind: XpointKind,
        addr: u64,
        size: u64,
    ) -> Result<(), XpointError> {
        let pid = process.pid();
        let size = normalize(kind, size);

        if kind == XpointKind::Break {
            let idx = self
                .entries
                .iter()
                .position(|x| x.pid == pid && x.matches(kind, addr, size))
                .ok_or(XpointError::NotFound)?;
            let entry = self.entries.remove(idx);
            if !self.is_sw_break(pid, addr) {
                self.lift(target, process, &entry);
            }
            return Ok(());
        }

        let mut seen: Vec<Option<Tid>> = Vec::new();
        let mut removed = Vec::new();
        let mut i = 0;
        while i < self.entries.len() {
            let x = &self.entries[i];
            if x.in_scope(pid, thread) && x.matches(kind, addr, size) && !seen.contains(&x.tid) {
                seen.push(x.tid);
                removed.push(self.entries.remove(i));
            } else {
                i += 1;
            }
        }
        if removed.is_empty() {
            return Err(XpointError::NotFound);
        }
        for entry in &removed {
            let still_used = self
                .entries
                .iter()
                .any(|x| x.pid == pid && x.tid == entry.tid && x.matches(kind, addr, size));
            if !still_used {
                self.lift(target, process, entry);
            }
        }
        Ok(())
    }

    /// Undo an xpoint in the debuggee. Failures are logged.
    fn lift(&self, target: &mut dyn Target, process: &Process, entry: &Xpoint) {
        let pid = process.pid();
        let backend = process.backend();

        let res = match entry.tid {
            None => {
                let mut ctx = backend.new_context();
                backend.remove_xpoint(
                    &mut ProcessMemory { target, pid },
                    &mut ctx,
                    entry.kind,
                    entry.addr,
                    entry.size,
                    &entry.restore,
                )
            }
            Some(tid) => lift_hw(target, process, tid, entry),
        };

        if let Err(e) = res {
            warn!(
                "failed to remove {:?} at {:#x} from process {}: {}",
                entry.kind, entry.addr, pid, e
            );
        }
    }

    /// Remove every xpoint of a process, restoring memory and debug
    /// registers.
    pub fn remove_all(&mut self, target: &mut dyn Target, process: &Process) {
        let pid = process.pid();
        let (mine, rest): (Vec<_>, Vec<_>) = core::mem::take(&mut self.entries)
            .into_iter()
            .partition(|x| x.pid == pid);
        self.entries = rest;

        let mut lifted_breaks: Vec<u64> = Vec::new();
        for entry in &mine {
            if entry.kind == XpointKind::Break {
                if lifted_breaks.contains(&entry.addr) {
                    continue;
                }
                lifted_breaks.push(entry.addr);
            }
            self.lift(target, process, entry);
        }
    }

    /// Drop the records of a thread that no longer exists.
    pub fn sweep_thread(&mut self, pid: Pid, tid: Tid) {
        self.entries
            .retain(|x| !(x.pid == pid && x.tid == Some(tid)));
    }

    /// Drop the records of a process that no longer exists.
    pub fn sweep_process(&mut self, pid: Pid) {
        self.entries.retain(|x| x.pid != pid);
    }

    /// Install the process's hardware points on a newly created thread.
    pub fn propagate_to_thread(&mut self, target: &mut dyn Target, process: &Process, tid: Tid) {
        let pid = process.pid();
        // (key, thread, records of that key on the thread)
        let mut counts: Vec<((XpointKind, u64, u64), Option<Tid>, usize)> = Vec::new();
        for x in self.entries.iter().filter(|x| x.pid == pid && x.tid.is_some()) {
            if x.tid == Some(tid) {
                continue;
            }
            let key = (x.kind, x.addr, x.size);
            match counts.iter_mut().find(|(k, t, _)| *k == key && *t == x.tid) {
                Some((_, _, n)) => *n += 1,
                None => counts.push((key, x.tid, 1)),
            }
        }

        // a duplicated request carries over as often as it was made
        let mut wanted: Vec<((XpointKind, u64, u64), usize)> = Vec::new();
        for (key, _, n) in counts {
            match wanted.iter_mut().find(|(k, _)| *k == key) {
                Some((_, max)) => *max = (*max).max(n),
                None => wanted.push((key, n)),
            }
        }

        for (kind, addr, size) in wanted
            .into_iter()
            .flat_map(|(key, n)| core::iter::repeat(key).take(n))
        {
            if let Err(e) = self.insert_hw(target, process, tid, kind, addr, size) {
                warn!(
                    "cannot carry {:?} at {:#x} over to new thread {}: {}",
                    kind, addr, tid, e
                );
            }
        }
    }

    /// Hardware points that fired on `tid`.
    ///
    /// The debug status flags are checked first. If none is raised, write
    /// watchpoints fall back to comparing the watched bytes against the
    /// snapshot taken at the previous stop. Snapshots are refreshed either
    /// way.
    pub fn status_for_thread(
        &mut self,
        target: &mut dyn Target,
        process: &Process,
        tid: Tid,
    ) -> Vec<Triggered> {
        let pid = process.pid();
        let backend = process.backend();
        let mut triggered = Vec::new();

        if !self
            .entries
            .iter()
            .any(|x| x.pid == pid && x.tid == Some(tid))
        {
            return triggered;
        }

        match process.read_context(target, tid) {
            Ok(mut ctx) => {
                let mut dirty = false;
                for x in self
                    .entries
                    .iter()
                    .filter(|x| x.pid == pid && x.tid == Some(tid))
                {
                    let slot = match x.slot() {
                        Some(slot) => slot,
                        None => continue,
                    };
                    if backend.is_watchpoint_triggered(&ctx, slot) {
                        backend.clear_watchpoint(&mut ctx, slot);
                        dirty = true;
                        triggered.push(Triggered {
                            kind: x.kind,
                            addr: x.addr,
                        });
                    }
                }
                if dirty {
                    if let Err(e) = process.write_context(target, tid, &ctx) {
                        warn!("cannot acknowledge watchpoints on thread {}: {}", tid, e);
                    }
                }
            }
            Err(e) => warn!("cannot read context of thread {}: {}", tid, e),
        }

        let flagged = !triggered.is_empty();
        for x in self
            .entries
            .iter_mut()
            .filter(|x| x.pid == pid && x.tid == Some(tid) && x.kind == XpointKind::WriteWatch)
        {
            let current = read_exact(target, pid, x.addr, x.size);
            if !flagged && current.is_some() && x.snapshot.is_some() && current != x.snapshot {
                debug!("write watch at {:#x} detected by value change", x.addr);
                triggered.push(Triggered {
                    kind: x.kind,
                    addr: x.addr,
                });
            }
            x.snapshot = current;
        }

        triggered
    }

    /// Replace trap instructions in `buf` (read from `addr`) with the bytes
    /// they shadow.
    pub fn unshadow(&self, pid: Pid, addr: u64, buf: &mut [u8]) {
        let end = addr.saturating_add(buf.len() as u64);
        for x in &self.entries {
            if x.pid != pid || x.kind != XpointKind::Break {
                continue;
            }
            let saved = match x.saved() {
                Some(saved) => saved,
                None => continue,
            };
            for (i, b) in saved.iter().enumerate() {
                let a = x.addr.wrapping_add(i as u64);
                if a >= addr && a < end {
                    buf[(a - addr) as usize] = *b;
                }
            }
        }
    }

    /// After `data` was written at `addr`, fold the new bytes into the saved
    /// bytes of any software breakpoint they overlap, and re-plant the trap.
    pub fn reshadow(&mut self, target: &mut dyn Target, process: &Process, addr: u64, data: &[u8]) {
        let pid = process.pid();
        let insn = process.backend().breakpoint_insn();
        let end = addr.saturating_add(data.len() as u64);

        let mut planted: Vec<u64> = Vec::new();
        for x in self
            .entries
            .iter_mut()
            .filter(|x| x.pid == pid && x.kind == XpointKind::Break)
        {
            let saved = match &mut x.restore {
                RestoreValue::Saved(saved) => saved,
                RestoreValue::Slot(_) => continue,
            };
            let mut overlaps = false;
            for (i, b) in saved.iter_mut().enumerate() {
                let a = x.addr.wrapping_add(i as u64);
                if a >= addr && a < end {
                    *b = data[(a - addr) as usize];
                    overlaps = true;
                }
            }
            if overlaps && !planted.contains(&x.addr) {
                planted.push(x.addr);
            }
        }

        for baddr in planted {
            match target.write_memory(pid, baddr, insn) {
                Ok(n) if n == insn.len() => {}
                Ok(_) => warn!("breakpoint at {:#x} only partially re-planted", baddr),
                Err(e) => warn!("cannot re-plant breakpoint at {:#x}: {}", baddr, e),
            }
        }
    }
}

fn lift_hw(
    target: &mut dyn Target,
    process: &Process,
    tid: Tid,
    entry: &Xpoint,
) -> Result<(), CpuError> {
    let pid = process.pid();
    let mut ctx: RegisterContext = process.read_context(target, tid)?;
    process.backend().remove_xpoint(
        &mut ProcessMemory {
            target: &mut *target,
            pid,
        },
        &mut ctx,
        entry.kind,
        entry.addr,
        entry.size,
        &entry.restore,
    )?;
    process.write_context(target, tid, &ctx)?;
    Ok(())
}

fn read_exact(target: &mut dyn Target, pid: Pid, addr: u64, size: u64) -> Option<Vec<u8>> {
    let mut buf = vec![0; size as usize];
    match target.read_memory(pid, addr, &mut buf) {
        Ok(n) if n == buf.len() => Some(buf),
        _ => None,
    }
}
