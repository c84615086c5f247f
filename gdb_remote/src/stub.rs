use std::fmt::Display;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, TcpListener};
use std::ops::ControlFlow;

use crate::{
    bridge::{BreakpointBridge, BreakpointNotifier},
    config::{StubConfig, MAX_PACKET_SIZE},
    connection::{Connection, Listener},
    error::StubError,
    packets::{incoming::Command, psm::PacketStateMachine, response::ResponseWriter},
    target::CpuDebug,
};

const SIGTRAP: u8 = 5;

/// Memory fault, or a read/write that could not be fully satisfied.
const ERR_FAULT: u8 = 0x14;
/// Malformed arguments or a write whose declared length disagrees with its data.
const ERR_INVALID: u8 = 0x22;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    WaitingForCommand,
    StopReply,
}

enum Session<C: Connection> {
    Disconnected,
    WaitingForCommand(C),
    StopReply(C),
}

impl<C: Connection> Session<C> {
    fn state(&self) -> SessionState {
        match self {
            Session::Disconnected => SessionState::Disconnected,
            Session::WaitingForCommand(_) => SessionState::WaitingForCommand,
            Session::StopReply(_) => SessionState::StopReply,
        }
    }

    fn transition(self, to: SessionState) -> Self {
        let mut conn = match self {
            Session::Disconnected => return Session::Disconnected,
            Session::WaitingForCommand(conn) | Session::StopReply(conn) => conn,
        };
        match to {
            SessionState::WaitingForCommand => Session::WaitingForCommand(conn),
            SessionState::StopReply => Session::StopReply(conn),
            SessionState::Disconnected => {
                if let Err(err) = conn.on_session_end() {
                    log::debug!("error closing connection: {}", err);
                }
                Session::Disconnected
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum StopReason {
    Message,
    Breakpoint(u64),
}

enum Transition {
    Stay,
    Stop,
    Resume,
    Detach,
}

/// GDB remote protocol engine for a single debugger at a time.
///
/// The stub never runs the CPU itself. A driver alternates between executing
/// instructions and calling [`GdbStub::run`]; while a `continue` is
/// outstanding `run` returns straight away unless the debugger sent something
/// or the CPU reported a breakpoint through the [`BreakpointNotifier`].
pub struct GdbStub<L: Listener, T: CpuDebug> {
    listener: L,
    target: T,
    session: Session<L::Connection>,
    ptm: PacketStateMachine,
    bridge: BreakpointBridge,
    cfg: StubConfig,
}

impl<T: CpuDebug> GdbStub<TcpListener, T> {
    /// Listens on the loopback interface at `cfg.port`.
    pub fn bind(target: T, cfg: StubConfig) -> Result<Self, StubError> {
        let listener =
            TcpListener::bind((Ipv4Addr::LOCALHOST, cfg.port)).map_err(StubError::Bind)?;
        Ok(Self::new(listener, target, cfg))
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

impl<L: Listener, T: CpuDebug> GdbStub<L, T> {
    pub fn new(listener: L, mut target: T, cfg: StubConfig) -> Self {
        let bridge = BreakpointBridge::attach(&mut target);
        Self {
            listener,
            target,
            session: Session::Disconnected,
            ptm: PacketStateMachine::new(),
            bridge,
            cfg,
        }
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn target_mut(&mut self) -> &mut T {
        &mut self.target
    }

    /// Another handle to the listener registered with the target.
    pub fn notifier(&self) -> BreakpointNotifier {
        self.bridge.notifier()
    }

    /// Replays pending breakpoint hits, then serves commands if there is
    /// anything to serve. With `wait_for_message` the call blocks until a
    /// debugger connects and keeps serving until it resumes or detaches.
    pub fn run(&mut self, wait_for_message: bool) -> Result<(), StubError> {
        while let Some(addr) = self.bridge.next_hit() {
            self.on_breakpoint(addr)?;
        }
        if wait_for_message || self.is_message_available()? {
            self.run_loop(StopReason::Message)?;
        }
        Ok(())
    }

    /// Reports a breakpoint hit to the debugger and serves commands until it
    /// resumes or detaches. Only a CPU resumed by `c` can stop; hits in any
    /// other state are dropped.
    pub fn on_breakpoint(&mut self, addr: u64) -> Result<(), StubError> {
        if self.state() != SessionState::StopReply {
            log::debug!("no continue outstanding, dropping breakpoint hit at {:#x}", addr);
            return Ok(());
        }
        self.run_loop(StopReason::Breakpoint(addr))
    }

    fn run_loop(&mut self, reason: StopReason) -> Result<(), StubError> {
        log::trace!("serving commands: {:?}", reason);
        loop {
            match self.state() {
                // a stopped CPU stays stopped until a debugger shows up again
                SessionState::Disconnected => {
                    self.try_connect(true)?;
                }
                SessionState::StopReply => self.send_stop_reply(),
                SessionState::WaitingForCommand => {
                    if self.process_command().is_break() {
                        return Ok(());
                    }
                }
            }
        }
    }

    fn is_message_available(&mut self) -> Result<bool, StubError> {
        if self.state() == SessionState::Disconnected {
            return self.try_connect(false);
        }
        let (Session::WaitingForCommand(conn) | Session::StopReply(conn)) = &mut self.session else {
            return Ok(false);
        };
        match conn.has_data_to_read() {
            Ok(available) => Ok(available),
            Err(err) => {
                self.disconnect(err);
                Ok(false)
            }
        }
    }

    fn try_connect(&mut self, blocking: bool) -> Result<bool, StubError> {
        let Some(mut conn) = self.listener.accept(blocking).map_err(StubError::Listener)? else {
            return Ok(false);
        };
        if let Err(err) = conn.on_session_start() {
            log::warn!("failed to set up debugger connection: {}", err);
            _ = conn.on_session_end();
            return Ok(false);
        }
        if let Some(repr) = conn.string_repr() {
            log::info!("debugger session started {}", repr);
        }
        self.ptm.reset();
        self.session = Session::WaitingForCommand(conn);
        Ok(true)
    }

    fn transition(&mut self, to: SessionState) {
        let session = std::mem::replace(&mut self.session, Session::Disconnected);
        self.session = session.transition(to);
    }

    fn disconnect(&mut self, reason: impl Display) {
        log::info!("debugger disconnected: {}", reason);
        self.transition(SessionState::Disconnected);
        self.ptm.reset();
    }

    fn send_stop_reply(&mut self) {
        let Session::StopReply(conn) = &mut self.session else {
            return;
        };
        let mut res = ResponseWriter::new(conn);
        res.write(b'S');
        res.write_hex(SIGTRAP);
        match res.finish() {
            Ok(()) => self.transition(SessionState::WaitingForCommand),
            Err(err) => self.disconnect(err),
        }
    }

    fn process_command(&mut self) -> ControlFlow<()> {
        let Session::WaitingForCommand(conn) = &mut self.session else {
            return ControlFlow::Continue(());
        };
        let packet = match self.ptm.receive(conn, self.cfg.max_checksum_retries) {
            Ok(packet) => packet,
            Err(err) => {
                self.disconnect(err);
                return ControlFlow::Continue(());
            }
        };
        if packet.is_empty() {
            return ControlFlow::Continue(());
        }

        let transition = match Command::from_buf(&packet) {
            Ok(command) => {
                if command == Command::Unsupported {
                    log::debug!("unsupported command: {}", packet.escape_ascii());
                } else {
                    log::debug!("packet: {}", packet.escape_ascii());
                }
                self.handle_command(command)
            }
            Err(err) => {
                log::debug!("rejecting {}: {}", packet.escape_ascii(), err);
                self.reply_error(ERR_INVALID).map(|_| Transition::Stay)
            }
        };

        match transition {
            Ok(Transition::Stay) => ControlFlow::Continue(()),
            Ok(Transition::Stop) => {
                self.transition(SessionState::StopReply);
                ControlFlow::Continue(())
            }
            Ok(Transition::Resume) => {
                self.transition(SessionState::StopReply);
                ControlFlow::Break(())
            }
            Ok(Transition::Detach) => {
                self.disconnect("detached");
                ControlFlow::Break(())
            }
            Err(err) => {
                self.disconnect(err);
                ControlFlow::Continue(())
            }
        }
    }

    fn reply_error(&mut self, code: u8) -> io::Result<()> {
        let Session::WaitingForCommand(conn) = &mut self.session else {
            return Ok(());
        };
        let mut res = ResponseWriter::new(conn);
        res.write_error(code);
        res.finish()
    }

    fn handle_command(&mut self, command: Command) -> io::Result<Transition> {
        let Session::WaitingForCommand(conn) = &mut self.session else {
            return Ok(Transition::Stay);
        };
        let target = &mut self.target;

        // resuming commands answer later with a stop reply
        let mut res = match command {
            Command::Continue => {
                // hits reported while the debugger held the CPU are stale
                while let Some(addr) = self.bridge.next_hit() {
                    log::debug!("discarding breakpoint hit at {:#x}", addr);
                }
                return Ok(Transition::Resume);
            }
            Command::Step => {
                target.step();
                return Ok(Transition::Stop);
            }
            _ => ResponseWriter::new(conn),
        };

        let mut transition = Transition::Stay;
        match command {
            Command::ExceptionReason => {
                res.write(b'S');
                res.write_hex(SIGTRAP);
            }
            Command::QuerySupported => res.write_str(&format!("PacketSize={:x}", MAX_PACKET_SIZE)),
            Command::QueryAttached => res.write(b'1'),

            Command::ReadRegisters => {
                for &reg in target.general_registers().iter() {
                    res.write_u64_le(reg);
                }
                res.write_u64_le(target.program_counter());
            }
            Command::WriteRegisters(words) => {
                let regs = target.general_registers();
                let count = regs.len();
                if words.len() == count + 1 {
                    regs.copy_from_slice(&words[..count]);
                    target.set_program_counter(words[count]);
                    res.write_str("OK");
                } else {
                    log::debug!("expected {} register values, got {}", count + 1, words.len());
                    res.write_error(ERR_INVALID);
                }
            }

            Command::ReadMemory { addr, len } if len.saturating_mul(2) > MAX_PACKET_SIZE => {
                log::debug!("read of {} bytes at {:#x} does not fit a packet", len, addr);
                res.write_error(ERR_FAULT);
            }
            Command::ReadMemory { addr, len } => match target.load(addr, len) {
                Ok(data) => res.write_hex_buff(&data),
                Err(fault) => {
                    log::debug!("reading {} bytes at {:#x}: {}", len, addr, fault);
                    res.write_error(ERR_FAULT);
                }
            },
            Command::WriteMemory { addr, data } => match target.store(addr, &data) {
                Ok(written) if written >= data.len() => res.write_str("OK"),
                Ok(written) => {
                    log::debug!(
                        "short write at {:#x}: {} of {} bytes",
                        addr,
                        written,
                        data.len()
                    );
                    res.write_error(ERR_FAULT);
                }
                Err(fault) => {
                    log::debug!("writing {} bytes at {:#x}: {}", data.len(), addr, fault);
                    res.write_error(ERR_FAULT);
                }
            },

            Command::InsertBreakpoint { kind, addr } => {
                target.add_breakpoint(addr, kind);
                res.write_str("OK");
            }
            Command::RemoveBreakpoint { kind, addr } => {
                target.remove_breakpoint(addr, kind);
                res.write_str("OK");
            }

            Command::Detach => {
                res.write_str("OK");
                transition = Transition::Detach;
            }
            _ => {}
        }
        res.finish()?;
        Ok(transition)
    }
}

impl<L: Listener, T: CpuDebug> Drop for GdbStub<L, T> {
    fn drop(&mut self) {
        self.bridge.detach(&mut self.target);
    }
}
