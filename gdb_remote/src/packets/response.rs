use std::io;

use crate::{connection::Connection, hex};

/// Builds one reply packet. The frame is closed, checksummed and flushed by
/// [`ResponseWriter::finish`], or by `Drop` if the writer goes out of scope
/// first, so every path out of a handler puts exactly one packet on the wire.
pub struct ResponseWriter<'a, C: Connection> {
    conn: &'a mut C,

    check_sum: u8,
    msg: Vec<u8>,
    finished: bool,
}

impl<'a, C: Connection> ResponseWriter<'a, C> {
    pub fn new(conn: &'a mut C) -> Self {
        Self {
            conn,
            check_sum: 0,
            msg: vec![b'$'],
            finished: false,
        }
    }

    pub fn write(&mut self, byte: u8) {
        self.msg.push(byte);
        self.check_sum = self.check_sum.wrapping_add(byte);
    }

    pub fn write_bytes(&mut self, data: &[u8]) {
        for &b in data {
            self.write(b);
        }
    }

    pub fn write_str(&mut self, str: &str) {
        self.write_bytes(str.as_bytes())
    }

    pub fn write_hex(&mut self, byte: u8) {
        self.write(hex::hex_digit(byte >> 4));
        self.write(hex::hex_digit(byte));
    }

    pub fn write_hex_buff(&mut self, data: &[u8]) {
        for &b in data {
            self.write_hex(b);
        }
    }

    /// Writes a 64-bit value as 16 hex digits in little endian byte order.
    pub fn write_u64_le(&mut self, value: u64) {
        self.write_hex_buff(&value.to_le_bytes());
    }

    pub fn write_error(&mut self, code: u8) {
        self.write(b'E');
        self.write_hex(code);
    }

    pub fn finish(mut self) -> io::Result<()> {
        self.send()
    }

    fn send(&mut self) -> io::Result<()> {
        self.finished = true;
        let check_sum = self.check_sum;
        self.msg.push(b'#');
        self.msg.push(hex::hex_digit(check_sum >> 4));
        self.msg.push(hex::hex_digit(check_sum));
        log::trace!("--> {}", self.msg.escape_ascii());
        self.conn.write_all(&self.msg)?;
        self.conn.flush()
    }
}

impl<'a, C: Connection> Drop for ResponseWriter<'a, C> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(err) = self.send() {
                log::debug!("failed to send reply: {}", err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::testing::MemoryConnection;

    fn reply(build: impl FnOnce(&mut ResponseWriter<MemoryConnection>)) -> String {
        let mut conn = MemoryConnection::new(b"");
        let output = conn.output.clone();
        let mut res = ResponseWriter::new(&mut conn);
        build(&mut res);
        res.finish().unwrap();
        MemoryConnection::output_string(&output)
    }

    #[test]
    fn frames_with_checksum() {
        assert_eq!(reply(|res| res.write_str("S05")), "$S05#b8");
        assert_eq!(reply(|res| res.write_str("OK")), "$OK#9a");
        assert_eq!(reply(|_| {}), "$#00");
    }

    #[test]
    fn hex_encodings() {
        assert_eq!(
            reply(|res| res.write_hex_buff(&[0xde, 0xad, 0xbe, 0xef])),
            "$deadbeef#20"
        );
        assert_eq!(
            reply(|res| res.write_u64_le(0x1000)),
            "$0010000000000000#01"
        );
        assert_eq!(reply(|res| res.write_error(0x14)), "$E14#aa");
        assert_eq!(reply(|res| res.write_error(0x22)), "$E22#a9");
    }

    #[test]
    fn dropping_unfinished_writer_still_sends() {
        let mut conn = MemoryConnection::new(b"");
        let output = conn.output.clone();
        {
            let mut res = ResponseWriter::new(&mut conn);
            res.write_str("OK");
        }
        assert_eq!(MemoryConnection::output_string(&output), "$OK#9a");
    }
}
