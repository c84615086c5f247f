//! Hex helpers for the textual parts of the protocol: numeric arguments,
//! memory dumps and the register file.

use std::num::ParseIntError;

use num_traits::Num;

use crate::error::CommandParseError;

/// Parses an unsigned hex number without prefix (`1f`, `2000`).
pub fn parse_hex<N>(text: &str) -> Result<N, CommandParseError>
where
    N: Num<FromStrRadixErr = ParseIntError>,
{
    // from_str_radix tolerates a leading '+', the protocol does not
    if !text.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(CommandParseError::MalformedCommand("hex number"));
    }
    N::from_str_radix(text, 16).map_err(CommandParseError::InvalidNumber)
}

pub fn hex_digit_value(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        _ => None,
    }
}

pub fn hex_digit(nibble: u8) -> u8 {
    match nibble & 0x0f {
        digit @ 0..=9 => b'0' + digit,
        digit => b'a' + digit - 10,
    }
}

/// Decodes pairs of hex digits, high nibble first.
pub fn decode_hex(text: &[u8]) -> Result<Vec<u8>, CommandParseError> {
    if text.len() % 2 != 0 {
        return Err(CommandParseError::InvalidHex);
    }
    text.chunks_exact(2)
        .map(|pair| {
            let high = hex_digit_value(pair[0]).ok_or(CommandParseError::InvalidHex)?;
            let low = hex_digit_value(pair[1]).ok_or(CommandParseError::InvalidHex)?;
            Ok(high << 4 | low)
        })
        .collect()
}

/// Splits raw register bytes into 64-bit little endian words.
pub fn le_words(bytes: &[u8]) -> Result<Vec<u64>, CommandParseError> {
    if bytes.len() % 8 != 0 {
        return Err(CommandParseError::MalformedCommand("register"));
    }
    Ok(bytes
        .chunks_exact(8)
        .map(|chunk| {
            let mut word = [0u8; 8];
            word.copy_from_slice(chunk);
            u64::from_le_bytes(word)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_plain_hex() {
        assert_eq!(parse_hex::<u64>("2000").unwrap(), 0x2000);
        assert_eq!(parse_hex::<u64>("DeadBeef").unwrap(), 0xdead_beef);
        assert_eq!(parse_hex::<usize>("4").unwrap(), 4);
    }

    #[test]
    fn rejects_malformed_numbers() {
        assert!(parse_hex::<u64>("").is_err());
        assert!(parse_hex::<u64>("0x10").is_err());
        assert!(parse_hex::<u64>("+10").is_err());
        assert!(parse_hex::<u64>("-1").is_err());
        assert!(parse_hex::<u64>("1_000").is_err());
        assert!(parse_hex::<u64>("10000000000000000").is_err());
    }

    #[test]
    fn decodes_memory_bytes() {
        assert_eq!(decode_hex(b"deADbeef").unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(decode_hex(b"").unwrap(), Vec::<u8>::new());
        assert!(matches!(decode_hex(b"abc"), Err(CommandParseError::InvalidHex)));
        assert!(matches!(decode_hex(b"zz"), Err(CommandParseError::InvalidHex)));
    }

    #[test]
    fn words_are_little_endian() {
        let bytes = [0x00, 0x10, 0, 0, 0, 0, 0, 0, 0xff, 0, 0, 0, 0, 0, 0, 0x80];
        assert_eq!(le_words(&bytes).unwrap(), vec![0x1000, 0x8000_0000_0000_00ff]);
        assert!(le_words(&bytes[..7]).is_err());
    }

    proptest! {
        #[test]
        fn hex_digits_round_trip(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
            let text: Vec<u8> = bytes
                .iter()
                .flat_map(|b| [hex_digit(b >> 4), hex_digit(*b)])
                .collect();
            prop_assert_eq!(decode_hex(&text).unwrap(), bytes);
        }

        #[test]
        fn numbers_round_trip(value in any::<u64>()) {
            prop_assert_eq!(parse_hex::<u64>(&format!("{:x}", value)).unwrap(), value);
        }
    }
}
