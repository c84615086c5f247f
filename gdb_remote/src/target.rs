use thiserror::Error;

pub type BreakpointListener = Box<dyn FnMut(u64) + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BreakpointKind {
    Software,
    Hardware,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessKind {
    Load,
    Store,
    Fetch,
}

/// A memory access the CPU refused. The stub reports every fault as `E14`
/// but keeps the details for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{kind:?} fault at {address:#x}")]
pub struct MemoryAccessError {
    pub address: u64,
    pub kind: AccessKind,
}

impl MemoryAccessError {
    pub fn new(address: u64, kind: AccessKind) -> Self {
        Self { address, kind }
    }
}

/// The debugging surface a CPU exposes to the stub.
pub trait CpuDebug {
    fn program_counter(&self) -> u64;
    fn set_program_counter(&mut self, value: u64);

    fn step(&mut self);

    fn general_registers(&mut self) -> &mut [u64];

    fn load(&mut self, address: u64, len: usize) -> Result<Vec<u8>, MemoryAccessError>;
    /// Returns how many bytes were actually stored.
    fn store(&mut self, address: u64, data: &[u8]) -> Result<usize, MemoryAccessError>;

    fn add_breakpoint_listener(&mut self, listener: BreakpointListener) -> ListenerId;
    fn remove_breakpoint_listener(&mut self, id: ListenerId);

    fn add_breakpoint(&mut self, address: u64, kind: BreakpointKind);
    fn remove_breakpoint(&mut self, address: u64, kind: BreakpointKind);
}
