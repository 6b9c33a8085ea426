//! In-memory doubles for the OS layer and the controller connection.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;

use crate::arch::{CpuBackend, InsnClass, InsnClassifier, Machine, OsError, RegisterContext};
use crate::common::{Pid, Tid};
use crate::conn::{Connection, ConnectionExt};
use crate::session::{DebugEvent, ExceptionCode};
use crate::target::ext::memory_regions::{MemoryRegion, MemoryRegions, MemoryRegionsOps};
use crate::target::ext::monitor_cmd::{ConsoleOutput, MonitorCmd, MonitorCmdOps};
use crate::target::ext::section_offsets::{Offsets, SectionOffsets, SectionOffsetsOps};
use crate::target::ext::thread_extra_info::{
    ThreadExtraInfo, ThreadExtraInfoOps, ThreadInfo, ThreadState,
};
use crate::target::{Disposition, Target};
use crate::outputln;

/// A single-address-space debuggee. Process ids are ignored.
pub struct MockTarget {
    backend: &'static dyn CpuBackend,
    memory: BTreeMap<u64, u8>,
    contexts: HashMap<Tid, RegisterContext>,
    threads: Vec<Tid>,
    /// Each event, with the PC a thread lands on when it is delivered.
    events: VecDeque<(DebugEvent, Option<(Tid, u64)>)>,

    /// Decode `e8` as a call and anything else as an ordinary instruction.
    pub classify_calls: bool,
    pub resumed: Vec<(Tid, Disposition)>,
    pub interrupts: usize,
    pub fail_wait: bool,
    pub detached: bool,
    pub terminated: bool,
    pub regions: Vec<MemoryRegion>,
}

impl MockTarget {
    pub fn new(machine: Machine) -> MockTarget {
        MockTarget {
            backend: machine.backend(),
            memory: BTreeMap::new(),
            contexts: HashMap::new(),
            threads: Vec::new(),
            events: VecDeque::new(),

            classify_calls: false,
            resumed: Vec::new(),
            interrupts: 0,
            fail_wait: false,
            detached: false,
            terminated: false,
            regions: Vec::new(),
        }
    }

    pub fn map_memory(&mut self, addr: u64, data: &[u8]) {
        for (i, b) in data.iter().enumerate() {
            self.memory.insert(addr + i as u64, *b);
        }
    }

    pub fn memory_at(&self, addr: u64, len: usize) -> Vec<u8> {
        (0..len as u64)
            .map(|i| self.memory[&(addr + i)])
            .collect()
    }

    pub fn add_thread(&mut self, tid: Tid) {
        self.threads.push(tid);
        self.contexts.insert(tid, self.backend.new_context());
    }

    pub fn context_mut(&mut self, tid: Tid) -> &mut RegisterContext {
        self.contexts.get_mut(&tid).expect("unknown thread")
    }

    pub fn push_event(&mut self, event: DebugEvent) {
        self.events.push_back((event, None));
    }

    /// Queue a single-step trap of `tid` that leaves it at `pc`.
    pub fn push_step(&mut self, pid: Pid, tid: Tid, pc: u64) {
        let event = DebugEvent::Exception {
            pid,
            tid,
            code: ExceptionCode::SingleStep,
            address: pc,
            first_chance: true,
        };
        self.events.push_back((event, Some((tid, pc))));
    }

    pub fn set_pc(&mut self, tid: Tid, pc: u64) {
        let backend = self.backend;
        backend.set_pc(self.context_mut(tid), pc).unwrap();
    }

    pub fn pc(&self, tid: Tid) -> u64 {
        self.backend.pc(&self.contexts[&tid]).unwrap()
    }

    /// Whether the x86 trap flag is set.
    pub fn trap_flag(&self, tid: Tid) -> bool {
        let eflags = self
            .backend
            .register_map()
            .iter()
            .find(|r| r.name == "eflags")
            .expect("not an x86 backend");
        let value = self.contexts[&tid]
            .read_uint(eflags.offset, eflags.size)
            .unwrap();
        value & 0x100 != 0
    }
}

impl Target for MockTarget {
    fn wait_for_event(&mut self, timeout: Option<Duration>) -> Result<Option<DebugEvent>, OsError> {
        if self.fail_wait {
            return Err(OsError::NoSuchProcess);
        }
        match self.events.pop_front() {
            Some((event, moved)) => {
                if let Some((tid, pc)) = moved {
                    self.set_pc(tid, pc);
                }
                Ok(Some(event))
            }
            None if timeout.is_some() => Ok(None),
            // nothing would ever wake us up
            None => Err(OsError::Unsupported),
        }
    }

    fn resume_thread(&mut self, _pid: Pid, tid: Tid, disposition: Disposition) -> Result<(), OsError> {
        if !self.threads.contains(&tid) {
            return Err(OsError::NoSuchProcess);
        }
        self.resumed.push((tid, disposition));
        Ok(())
    }

    fn read_context(&mut self, _pid: Pid, tid: Tid, ctx: &mut RegisterContext) -> Result<(), OsError> {
        let saved = self.contexts.get(&tid).ok_or(OsError::NoSuchProcess)?;
        ctx.as_bytes_mut().copy_from_slice(saved.as_bytes());
        Ok(())
    }

    fn write_context(&mut self, _pid: Pid, tid: Tid, ctx: &RegisterContext) -> Result<(), OsError> {
        let saved = self.contexts.get_mut(&tid).ok_or(OsError::NoSuchProcess)?;
        saved.as_bytes_mut().copy_from_slice(ctx.as_bytes());
        Ok(())
    }

    fn read_memory(&mut self, _pid: Pid, addr: u64, buf: &mut [u8]) -> Result<usize, OsError> {
        for (i, b) in buf.iter_mut().enumerate() {
            match self.memory.get(&(addr + i as u64)) {
                Some(v) => *b = *v,
                None if i == 0 => return Err(OsError::BadAddress(addr)),
                None => return Ok(i),
            }
        }
        Ok(buf.len())
    }

    fn write_memory(&mut self, _pid: Pid, addr: u64, data: &[u8]) -> Result<usize, OsError> {
        for (i, b) in data.iter().enumerate() {
            match self.memory.get_mut(&(addr + i as u64)) {
                Some(v) => *v = *b,
                None if i == 0 => return Err(OsError::BadAddress(addr)),
                None => return Ok(i),
            }
        }
        Ok(data.len())
    }

    fn break_in(&mut self, pid: Pid) -> Result<(), OsError> {
        let tid = *self.threads.first().ok_or(OsError::NoSuchProcess)?;
        self.interrupts += 1;
        let event = DebugEvent::Exception {
            pid,
            tid,
            code: ExceptionCode::ControlC,
            address: 0,
            first_chance: true,
        };
        self.events.push_back((event, None));
        Ok(())
    }

    fn terminate(&mut self, _pid: Pid) -> Result<(), OsError> {
        self.terminated = true;
        Ok(())
    }

    fn detach(&mut self, _pid: Pid) -> Result<(), OsError> {
        self.detached = true;
        Ok(())
    }

    fn support_monitor_cmd(&mut self) -> Option<MonitorCmdOps<'_>> {
        Some(self)
    }

    fn support_memory_regions(&mut self) -> Option<MemoryRegionsOps<'_>> {
        Some(self)
    }

    fn support_thread_extra_info(&mut self) -> Option<ThreadExtraInfoOps<'_>> {
        Some(self)
    }

    fn support_section_offsets(&mut self) -> Option<SectionOffsetsOps<'_>> {
        Some(self)
    }

    fn support_insn_classifier(&mut self) -> Option<&mut dyn InsnClassifier> {
        if self.classify_calls {
            Some(self)
        } else {
            None
        }
    }
}

impl InsnClassifier for MockTarget {
    fn classify(&mut self, _machine: Machine, _addr: u64, bytes: &[u8]) -> Option<InsnClass> {
        match bytes.first()? {
            0xe8 => Some(InsnClass::Call { target: None }),
            _ => Some(InsnClass::Other),
        }
    }
}

impl MonitorCmd for MockTarget {
    fn window_list(&mut self, out: &mut ConsoleOutput<'_>) -> Result<(), OsError> {
        outputln!(out, "no windows");
        Ok(())
    }

    fn process_list(&mut self, out: &mut ConsoleOutput<'_>) -> Result<(), OsError> {
        outputln!(out, "{:>6} {}", 7, "demo");
        Ok(())
    }
}

impl MemoryRegions for MockTarget {
    fn memory_regions(
        &mut self,
        _pid: Pid,
        region: &mut dyn FnMut(MemoryRegion),
    ) -> Result<(), OsError> {
        for r in &self.regions {
            region(r.clone());
        }
        Ok(())
    }
}

impl ThreadExtraInfo for MockTarget {
    fn thread_info(&mut self, _pid: Pid, tid: Tid) -> Result<ThreadInfo, OsError> {
        if !self.threads.contains(&tid) {
            return Err(OsError::NoSuchProcess);
        }
        Ok(ThreadInfo {
            state: ThreadState::Suspended(1),
            priority: Some(0),
        })
    }
}

impl SectionOffsets for MockTarget {
    fn section_offsets(&mut self, _pid: Pid) -> Result<Offsets, OsError> {
        Ok(Offsets {
            text: 0x1000,
            data: 0x2000,
            bss: None,
        })
    }
}

/// A scripted controller. Reads drain the input; a drained input reads as a
/// closed connection.
pub struct MockConnection {
    input: VecDeque<u8>,
    output: Vec<u8>,
}

impl MockConnection {
    pub fn new(input: &[u8]) -> MockConnection {
        MockConnection {
            input: input.iter().copied().collect(),
            output: Vec::new(),
        }
    }

    pub fn output(&self) -> &[u8] {
        &self.output
    }
}

impl Connection for MockConnection {
    type Error = &'static str;

    fn write(&mut self, byte: u8) -> Result<(), Self::Error> {
        self.output.push(byte);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl ConnectionExt for MockConnection {
    fn read(&mut self) -> Result<u8, Self::Error> {
        self.input.pop_front().ok_or("connection closed")
    }

    fn peek(&mut self) -> Result<Option<u8>, Self::Error> {
        match self.input.front() {
            Some(b) => Ok(Some(*b)),
            None => Err("connection closed"),
        }
    }
}
