//! GDB remote serial protocol stub for an emulated CPU.
//!
//! [`GdbStub`] speaks the protocol over a [`Listener`] and forwards register,
//! memory, breakpoint and execution requests to anything implementing
//! [`CpuDebug`]. The CPU keeps running on the caller's schedule; the stub only
//! takes over while the debugger holds it stopped.

pub mod bridge;
pub mod config;
pub mod connection;
pub mod error;
pub mod flat_target;
pub mod hex;
pub mod packets;
pub mod stub;
pub mod target;

pub use bridge::BreakpointNotifier;
pub use config::StubConfig;
pub use connection::{Connection, Listener, TcpConnection};
pub use error::{CommandParseError, PacketError, StubError};
pub use flat_target::FlatTarget;
pub use stub::{GdbStub, SessionState};
pub use target::{
    AccessKind, BreakpointKind, BreakpointListener, CpuDebug, ListenerId, MemoryAccessError,
};
