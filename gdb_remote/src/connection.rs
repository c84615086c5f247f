use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::net::{TcpListener, TcpStream};

pub trait Connection {
    fn read(&mut self) -> io::Result<u8>;
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;
    fn write(&mut self, byte: u8) -> io::Result<()> {
        self.write_all(&[byte])
    }
    fn flush(&mut self) -> io::Result<()>;

    // a closed peer counts as readable so the next read surfaces the EOF
    fn has_data_to_read(&mut self) -> io::Result<bool>;

    fn on_session_start(&mut self) -> io::Result<()> {
        Ok(())
    }
    fn on_session_end(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn string_repr(&self) -> Option<String> {
        None
    }
}

pub trait Listener {
    type Connection: Connection;

    fn accept(&mut self, blocking: bool) -> io::Result<Option<Self::Connection>>;
}

pub struct TcpConnection {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
}

impl TcpConnection {
    pub fn new(stream: TcpStream) -> io::Result<Self> {
        let writer = BufWriter::new(stream.try_clone()?);
        Ok(Self {
            reader: BufReader::new(stream),
            writer,
        })
    }
}

impl Connection for TcpConnection {
    fn read(&mut self) -> io::Result<u8> {
        let mut buf = [0u8];
        self.reader.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.writer.write_all(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    fn has_data_to_read(&mut self) -> io::Result<bool> {
        if !self.reader.buffer().is_empty() {
            return Ok(true);
        }

        let stream = self.reader.get_ref();
        stream.set_nonblocking(true)?;
        let mut buf = [0u8];
        let res = stream.peek(&mut buf);
        stream.set_nonblocking(false)?;
        match res {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn on_session_start(&mut self) -> io::Result<()> {
        self.reader.get_ref().set_nodelay(true)
    }

    fn on_session_end(&mut self) -> io::Result<()> {
        // whatever is still buffered belongs to the session being torn down
        let pending = self.reader.buffer().len();
        self.reader.consume(pending);
        self.writer.flush()?;
        self.reader.get_ref().shutdown(std::net::Shutdown::Both)
    }

    fn string_repr(&self) -> Option<String> {
        let stream = self.reader.get_ref();
        let local = stream.local_addr().ok()?;
        let peer = stream.peer_addr().ok()?;
        Some(format!("{{ local: {}, peer: {} }}", local, peer))
    }
}

impl Listener for TcpListener {
    type Connection = TcpConnection;

    fn accept(&mut self, blocking: bool) -> io::Result<Option<Self::Connection>> {
        self.set_nonblocking(!blocking)?;
        match TcpListener::accept(self) {
            Ok((stream, addr)) => {
                stream.set_nonblocking(false)?;
                log::info!("debugger connected from {}", addr);
                Ok(Some(TcpConnection::new(stream)?))
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::io;
    use std::rc::Rc;

    use super::{Connection, Listener};

    /// Scripted in-memory connection. Output is shared so tests can inspect
    /// it after the stub dropped the connection.
    pub struct MemoryConnection {
        pub input: VecDeque<u8>,
        pub output: Rc<RefCell<Vec<u8>>>,
        pub closed: Rc<RefCell<bool>>,
    }

    impl MemoryConnection {
        pub fn new(input: &[u8]) -> Self {
            Self {
                input: input.iter().copied().collect(),
                output: Default::default(),
                closed: Default::default(),
            }
        }

        pub fn output_string(output: &Rc<RefCell<Vec<u8>>>) -> String {
            String::from_utf8_lossy(&output.borrow()).into_owned()
        }
    }

    impl Connection for MemoryConnection {
        fn read(&mut self) -> io::Result<u8> {
            self.input
                .pop_front()
                .ok_or_else(|| io::Error::from(io::ErrorKind::UnexpectedEof))
        }

        fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
            self.output.borrow_mut().extend_from_slice(buf);
            Ok(())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }

        fn has_data_to_read(&mut self) -> io::Result<bool> {
            Ok(!self.input.is_empty())
        }

        fn on_session_end(&mut self) -> io::Result<()> {
            *self.closed.borrow_mut() = true;
            Ok(())
        }
    }

    /// Hands out queued connections. A blocking accept with nothing queued
    /// fails instead of hanging the test.
    #[derive(Default)]
    pub struct MemoryListener {
        pub pending: VecDeque<MemoryConnection>,
    }

    impl Listener for MemoryListener {
        type Connection = MemoryConnection;

        fn accept(&mut self, blocking: bool) -> io::Result<Option<MemoryConnection>> {
            match self.pending.pop_front() {
                Some(conn) => Ok(Some(conn)),
                None if blocking => Err(io::Error::from(io::ErrorKind::NotConnected)),
                None => Ok(None),
            }
        }
    }
}
