use crate::{
    error::CommandParseError,
    hex::{decode_hex, le_words, parse_hex},
    target::BreakpointKind,
};

/// A checksum-verified request from the debugger.
#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    /// `?`
    ExceptionReason,
    /// `qSupported:...`, the debugger's own feature list is ignored.
    QuerySupported,
    /// `qAttached`
    QueryAttached,

    /// `g`
    ReadRegisters,
    /// `G...`, raw register values in protocol order.
    WriteRegisters(Vec<u64>),

    /// `m addr,len`
    ReadMemory { addr: u64, len: usize },
    /// `M addr,len:data`
    WriteMemory { addr: u64, data: Vec<u8> },

    /// `Z0`/`Z1`
    InsertBreakpoint { kind: BreakpointKind, addr: u64 },
    /// `z0`/`z1`
    RemoveBreakpoint { kind: BreakpointKind, addr: u64 },

    /// `c`
    Continue,
    /// `s`
    Step,
    /// `D`
    Detach,

    /// Anything this stub does not implement. Answered with an empty packet.
    Unsupported,
}

impl Command {
    pub fn from_buf(buf: &[u8]) -> Result<Self, CommandParseError> {
        let Some((&head, args)) = buf.split_first() else {
            return Ok(Command::Unsupported);
        };

        Ok(match head {
            b'?' => Command::ExceptionReason,
            b'q' => {
                if args.starts_with(b"Supported:") {
                    Command::QuerySupported
                } else if args.starts_with(b"Attached") {
                    Command::QueryAttached
                } else {
                    Command::Unsupported
                }
            }
            b'g' => Command::ReadRegisters,
            b'G' => Command::WriteRegisters(le_words(&decode_hex(args)?)?),
            b'm' => {
                let (addr, len) = std::str::from_utf8(args)?
                    .split_once(',')
                    .ok_or(CommandParseError::MalformedCommand("m"))?;
                Command::ReadMemory {
                    addr: parse_hex(addr)?,
                    len: parse_hex(len)?,
                }
            }
            b'M' => {
                let colon = args
                    .iter()
                    .position(|&b| b == b':')
                    .ok_or(CommandParseError::MalformedCommand("M"))?;
                let (addr, len) = std::str::from_utf8(&args[..colon])?
                    .split_once(',')
                    .ok_or(CommandParseError::MalformedCommand("M"))?;
                let addr = parse_hex(addr)?;
                let declared: usize = parse_hex(len)?;
                let data_arg = &args[colon + 1..];
                // checked before decoding so a bad length never reaches memory
                if declared.checked_mul(2) != Some(data_arg.len()) {
                    return Err(CommandParseError::LengthMismatch {
                        declared,
                        supplied: data_arg.len() / 2,
                    });
                }
                Command::WriteMemory {
                    addr,
                    data: decode_hex(data_arg)?,
                }
            }
            b'Z' | b'z' => match breakpoint_args(args)? {
                Some((kind, addr)) if head == b'Z' => Command::InsertBreakpoint { kind, addr },
                Some((kind, addr)) => Command::RemoveBreakpoint { kind, addr },
                None => Command::Unsupported,
            },
            b'c' => Command::Continue,
            // the optional resume address form is not supported
            b's' if args.is_empty() => Command::Step,
            b'D' => Command::Detach,
            _ => Command::Unsupported,
        })
    }
}

/// Parses `type,addr,kind` of a `Z`/`z` packet. Only types 0 and 1 are
/// supported; the trailing kind (instruction length) is ignored.
fn breakpoint_args(args: &[u8]) -> Result<Option<(BreakpointKind, u64)>, CommandParseError> {
    let kind = match args.first() {
        Some(b'0') => BreakpointKind::Software,
        Some(b'1') => BreakpointKind::Hardware,
        _ => return Ok(None),
    };
    let rest = std::str::from_utf8(&args[1..])?
        .strip_prefix(',')
        .ok_or(CommandParseError::MalformedCommand("breakpoint"))?;
    let addr = rest.split([',', ';']).next().unwrap_or_default();
    Ok(Some((kind, parse_hex(addr)?)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(buf: &str) -> Command {
        Command::from_buf(buf.as_bytes()).unwrap()
    }

    #[test]
    fn simple_commands() {
        assert_eq!(parse("?"), Command::ExceptionReason);
        assert_eq!(parse("g"), Command::ReadRegisters);
        assert_eq!(parse("c"), Command::Continue);
        assert_eq!(parse("s"), Command::Step);
        assert_eq!(parse("D"), Command::Detach);
        assert_eq!(parse(""), Command::Unsupported);
    }

    #[test]
    fn queries() {
        assert_eq!(
            parse("qSupported:multiprocess+;swbreak+"),
            Command::QuerySupported
        );
        assert_eq!(parse("qAttached"), Command::QueryAttached);
        assert_eq!(parse("qAttached:1"), Command::QueryAttached);
        assert_eq!(parse("qSupported"), Command::Unsupported);
        assert_eq!(parse("qC"), Command::Unsupported);
    }

    #[test]
    fn unsupported_commands() {
        assert_eq!(parse("s1000"), Command::Unsupported);
        assert_eq!(parse("vCont?"), Command::Unsupported);
        assert_eq!(parse("Z2,2000,4"), Command::Unsupported);
        assert_eq!(parse("z"), Command::Unsupported);
        assert_eq!(parse("k"), Command::Unsupported);
    }

    #[test]
    fn memory_commands() {
        assert_eq!(
            parse("m1000,4"),
            Command::ReadMemory {
                addr: 0x1000,
                len: 4
            }
        );
        assert_eq!(
            parse("M1000,2:aabb"),
            Command::WriteMemory {
                addr: 0x1000,
                data: vec![0xaa, 0xbb]
            }
        );
        assert_eq!(
            parse("M20,0:"),
            Command::WriteMemory {
                addr: 0x20,
                data: vec![]
            }
        );
    }

    #[test]
    fn write_length_mismatch() {
        assert!(matches!(
            Command::from_buf(b"M1000,2:aa"),
            Err(CommandParseError::LengthMismatch {
                declared: 2,
                supplied: 1
            })
        ));
        assert!(matches!(
            Command::from_buf(b"M1000,1:aab"),
            Err(CommandParseError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn malformed_arguments() {
        for bad in ["mzz,4", "m1000", "m,", "M1000:aa", "M1000,zz:aa", "Z0", "Z0,xyz,4", "Gabc"] {
            assert!(Command::from_buf(bad.as_bytes()).is_err(), "{}", bad);
        }
        assert!(Command::from_buf(b"M1000,1:zz").is_err());
        assert!(Command::from_buf(b"m\xff,1").is_err());
    }

    #[test]
    fn breakpoints() {
        assert_eq!(
            parse("Z0,2000,4"),
            Command::InsertBreakpoint {
                kind: BreakpointKind::Software,
                addr: 0x2000
            }
        );
        assert_eq!(
            parse("z1,80000000,2"),
            Command::RemoveBreakpoint {
                kind: BreakpointKind::Hardware,
                addr: 0x8000_0000
            }
        );
        assert_eq!(
            parse("Z0,10,4;X1,aa"),
            Command::InsertBreakpoint {
                kind: BreakpointKind::Software,
                addr: 0x10
            }
        );
    }

    #[test]
    fn register_words() {
        let mut text = "00".repeat(8);
        text.push_str("0010000000000000");
        assert_eq!(
            parse(&format!("G{}", text)),
            Command::WriteRegisters(vec![0, 0x1000])
        );
    }
}
