use crate::{config::MAX_PACKET_SIZE, connection::Connection, error::PacketError, hex};

/// Outcome of feeding one byte into the state machine.
#[derive(Debug, PartialEq, Eq)]
pub enum Frame {
    Incomplete,
    Valid,
    Corrupt { expected: u8, actual: u8 },
}

enum PacketStateMachineStates {
    Ready,
    CommandBody,
    CheckSum1,
    CheckSum2(u8),
}

/// Byte driven receiver for `$payload#xx` frames.
pub struct PacketStateMachine {
    buf: Vec<u8>,
    check_sum: u8,
    state: PacketStateMachineStates,
}

impl Default for PacketStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketStateMachine {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            check_sum: 0,
            state: PacketStateMachineStates::Ready,
        }
    }

    pub fn reset(&mut self) {
        self.buf.clear();
        self.check_sum = 0;
        self.state = PacketStateMachineStates::Ready;
    }

    pub fn incomming_data(&mut self, data: u8) -> Result<Frame, PacketError> {
        use PacketStateMachineStates as State;
        match self.state {
            // acks, interrupts and line noise before a frame are dropped
            State::Ready => {
                if data == b'$' {
                    self.buf.clear();
                    self.check_sum = 0;
                    self.state = State::CommandBody;
                }
            }
            State::CommandBody if data == b'#' => self.state = State::CheckSum1,
            State::CommandBody => {
                if self.buf.len() >= MAX_PACKET_SIZE {
                    self.reset();
                    return Err(PacketError::TooLarge(MAX_PACKET_SIZE));
                }
                self.buf.push(data);
                self.check_sum = self.check_sum.wrapping_add(data);
            }
            State::CheckSum1 => {
                let high =
                    hex::hex_digit_value(data).ok_or(PacketError::InvalidChecksumDigit(data))?;
                self.state = State::CheckSum2(high << 4);
            }
            State::CheckSum2(high) => {
                let low =
                    hex::hex_digit_value(data).ok_or(PacketError::InvalidChecksumDigit(data))?;
                self.state = State::Ready;
                let expected = high | low;
                return Ok(if expected == self.check_sum {
                    Frame::Valid
                } else {
                    Frame::Corrupt {
                        expected,
                        actual: self.check_sum,
                    }
                });
            }
        }
        Ok(Frame::Incomplete)
    }

    /// Reads until one frame with a matching checksum arrived, answering every
    /// frame with `+` or `-`. Returns the payload of the accepted frame.
    pub fn receive<C: Connection>(
        &mut self,
        conn: &mut C,
        max_retries: Option<usize>,
    ) -> Result<Vec<u8>, PacketError> {
        self.reset();
        let mut retries = 0;
        loop {
            let byte = conn.read()?;
            match self.incomming_data(byte)? {
                Frame::Incomplete => {}
                Frame::Valid => {
                    log::trace!("<-- ${}", self.buf.escape_ascii());
                    conn.write(b'+')?;
                    conn.flush()?;
                    log::trace!("--> +");
                    return Ok(std::mem::take(&mut self.buf));
                }
                Frame::Corrupt { expected, actual } => {
                    log::warn!(
                        "checksum mismatch on \"{}\": sent {:02x}, computed {:02x}",
                        self.buf.escape_ascii(),
                        expected,
                        actual
                    );
                    conn.write(b'-')?;
                    conn.flush()?;
                    log::trace!("--> -");
                    retries += 1;
                    if max_retries.is_some_and(|max| retries >= max) {
                        return Err(PacketError::RetriesExhausted(retries));
                    }
                }
            }
        }
    }
}
