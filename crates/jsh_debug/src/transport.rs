use std::io::{self, BufWriter, Read, Write};
use std::net::{SocketAddr, TcpStream};

/// Byte-stream primitives the debug protocol runs on.
///
/// `read` blocks until at least one byte is available and returns 0 when the
/// peer closed the stream. `peek` never blocks: it returns how many bytes can
/// be read right now, and reports a closed peer as `UnexpectedEof`.
pub trait DebugTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    fn peek(&mut self) -> io::Result<usize>;

    /// Discards any read-side buffering. Messages are framed by the caller,
    /// so there is nothing to push through on plain sockets.
    fn read_flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// Pushes buffered output onto the wire.
    fn write_flush(&mut self) -> io::Result<()>;
}

const PEEK_WINDOW: usize = 4096;

/// TCP implementation over one accepted connection.
///
/// Output is buffered until `write_flush`, so a protocol message built from
/// several writes leaves as one segment.
#[derive(Debug)]
pub struct SocketTransport {
    reader: TcpStream,
    writer: BufWriter<TcpStream>,
    peer: SocketAddr,
}

impl SocketTransport {
    pub fn new(stream: TcpStream) -> io::Result<Self> {
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        let writer = BufWriter::new(stream.try_clone()?);
        Ok(Self {
            reader: stream,
            writer,
            peer,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

impl DebugTransport for SocketTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.reader.read(buf) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => return other,
            }
        }
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn peek(&mut self) -> io::Result<usize> {
        let mut window = [0u8; PEEK_WINDOW];
        self.reader.set_nonblocking(true)?;
        let res = self.reader.peek(&mut window);
        self.reader.set_nonblocking(false)?;
        match res {
            Ok(0) => Err(io::ErrorKind::UnexpectedEof.into()),
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn write_flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}
