use std::collections::HashMap;

use crate::target::{
    AccessKind, BreakpointKind, BreakpointListener, CpuDebug, ListenerId, MemoryAccessError,
};

pub const GENERAL_REGISTERS: usize = 32;
pub const INSTRUCTION_SIZE: u64 = 4;

/// Minimal CPU model behind the debug contract: one contiguous block of RAM,
/// 32 general registers and a program counter. Every instruction is treated
/// as a 4 byte no-op, which is enough to drive breakpoints and stepping.
pub struct FlatTarget {
    registers: [u64; GENERAL_REGISTERS],
    pc: u64,
    base: u64,
    memory: Vec<u8>,
    breakpoints: HashMap<u64, BreakpointKind>,
    listeners: Vec<(ListenerId, BreakpointListener)>,
    next_listener: u64,
}

impl std::fmt::Debug for FlatTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlatTarget")
            .field("pc", &self.pc)
            .field("base", &self.base)
            .field("memory_len", &self.memory.len())
            .field("breakpoints", &self.breakpoints)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl FlatTarget {
    pub fn new(base: u64, size: usize) -> Self {
        Self {
            registers: [0; GENERAL_REGISTERS],
            pc: base,
            base,
            memory: vec![0; size],
            breakpoints: HashMap::new(),
            listeners: Vec::new(),
            next_listener: 0,
        }
    }

    pub fn load_image(&mut self, address: u64, image: &[u8]) -> Result<(), MemoryAccessError> {
        let range = self.range(address, image.len(), AccessKind::Store)?;
        self.memory[range].copy_from_slice(image);
        Ok(())
    }

    pub fn has_breakpoint(&self, address: u64) -> bool {
        self.breakpoints.contains_key(&address)
    }

    /// Runs up to `budget` instructions and returns the address of the first
    /// breakpoint reached.
    pub fn run(&mut self, budget: usize) -> Option<u64> {
        for _ in 0..budget {
            self.step();
            if self.has_breakpoint(self.pc) {
                return Some(self.pc);
            }
        }
        None
    }

    fn range(
        &self,
        address: u64,
        len: usize,
        kind: AccessKind,
    ) -> Result<std::ops::Range<usize>, MemoryAccessError> {
        let fault = || MemoryAccessError::new(address, kind);
        let start = address
            .checked_sub(self.base)
            .and_then(|offset| usize::try_from(offset).ok())
            .ok_or_else(fault)?;
        let end = start.checked_add(len).ok_or_else(fault)?;
        if end > self.memory.len() {
            let first_bad = self.base.wrapping_add(self.memory.len().max(start) as u64);
            return Err(MemoryAccessError::new(first_bad, kind));
        }
        Ok(start..end)
    }
}

impl CpuDebug for FlatTarget {
    fn program_counter(&self) -> u64 {
        self.pc
    }

    fn set_program_counter(&mut self, value: u64) {
        self.pc = value;
    }

    // every instruction is checked, single steps included
    fn step(&mut self) {
        self.pc = self.pc.wrapping_add(INSTRUCTION_SIZE);
        if self.has_breakpoint(self.pc) {
            let address = self.pc;
            log::trace!("breakpoint hit at {:#x}", address);
            for (_, listener) in self.listeners.iter_mut() {
                listener(address);
            }
        }
    }

    fn general_registers(&mut self) -> &mut [u64] {
        &mut self.registers
    }

    fn load(&mut self, address: u64, len: usize) -> Result<Vec<u8>, MemoryAccessError> {
        let range = self.range(address, len, AccessKind::Load)?;
        Ok(self.memory[range].to_vec())
    }

    fn store(&mut self, address: u64, data: &[u8]) -> Result<usize, MemoryAccessError> {
        // a store running off the end of RAM is partial, not a fault
        let start = self.range(address, 0, AccessKind::Store)?.start;
        if start >= self.memory.len() && !data.is_empty() {
            return Err(MemoryAccessError::new(address, AccessKind::Store));
        }
        let written = data.len().min(self.memory.len() - start);
        self.memory[start..start + written].copy_from_slice(&data[..written]);
        Ok(written)
    }

    fn add_breakpoint_listener(&mut self, listener: BreakpointListener) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, listener));
        id
    }

    fn remove_breakpoint_listener(&mut self, id: ListenerId) {
        self.listeners.retain(|(listener, _)| *listener != id);
    }

    fn add_breakpoint(&mut self, address: u64, kind: BreakpointKind) {
        self.breakpoints.insert(address, kind);
    }

    fn remove_breakpoint(&mut self, address: u64, _kind: BreakpointKind) {
        self.breakpoints.remove(&address);
    }
}
