use std::{io, num::ParseIntError, str::Utf8Error};

use thiserror::Error;

/// Failure while pulling a framed packet off the connection. Every variant
/// ends the session.
#[derive(Debug, Error)]
pub enum PacketError {
    #[error("connection error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid checksum digit {0:#04x}")]
    InvalidChecksumDigit(u8),

    #[error("packet exceeds {0} bytes")]
    TooLarge(usize),

    #[error("gave up after {0} consecutive checksum mismatches")]
    RetriesExhausted(usize),
}

/// Malformed command arguments. Reported to the peer as `E22`, the session
/// stays up.
#[derive(Debug, Error)]
pub enum CommandParseError {
    #[error("command is not valid utf8: {0}")]
    InvalidUtf8(#[from] Utf8Error),

    #[error("invalid number: {0}")]
    InvalidNumber(#[from] ParseIntError),

    #[error("malformed {0} command")]
    MalformedCommand(&'static str),

    #[error("invalid hex data")]
    InvalidHex,

    #[error("declared length {declared} does not match {supplied} supplied bytes")]
    LengthMismatch { declared: usize, supplied: usize },
}

#[derive(Debug, Error)]
pub enum StubError {
    #[error("failed to bind debug listener: {0}")]
    Bind(#[source] io::Error),

    #[error("failed to accept debugger connection: {0}")]
    Listener(#[source] io::Error),
}
