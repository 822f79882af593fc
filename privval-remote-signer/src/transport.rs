//! Frame transport boundary.
//!
//! The protocol core only needs whole frames in and out of an already
//! authenticated, ordered byte stream. [`StreamTransport`] provides that over
//! any `Read + Write` stream using the protobuf varint length delimiter;
//! [`UnixConnector`] and [`TcpConnector`] open such streams.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::time::Duration;

use tracing::debug;

/// Frames above this size are treated as a broken channel.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Longest varint length delimiter.
const MAX_DELIMITER_LEN: usize = 10;

/// A channel carrying whole frames.
pub trait FrameTransport: Send {
    fn send(&mut self, frame: &[u8]) -> io::Result<()>;

    /// Blocks until a full frame arrives or the receive timeout elapses.
    fn recv(&mut self) -> io::Result<Vec<u8>>;

    /// Bounds every following `recv`. `None` waits forever.
    fn set_recv_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()>;
}

/// Builds fresh channels to the responder.
pub trait Connector: Send + Sync {
    fn connect(&self) -> io::Result<Box<dyn FrameTransport>>;

    /// Human readable peer description for logs.
    fn peer(&self) -> String;
}

/// Streams whose read timeout can be adjusted between frames.
pub trait TimeoutStream: Read + Write + Send {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()>;
}

impl TimeoutStream for UnixStream {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        UnixStream::set_read_timeout(self, timeout)
    }
}

impl TimeoutStream for TcpStream {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        TcpStream::set_read_timeout(self, timeout)
    }
}

/// Length-delimited frames over a byte stream.
pub struct StreamTransport<S> {
    stream: S,
}

impl<S: TimeoutStream> StreamTransport<S> {
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    fn read_delimiter(&mut self) -> io::Result<usize> {
        let mut delimiter = Vec::with_capacity(MAX_DELIMITER_LEN);
        loop {
            let mut byte = [0u8; 1];
            self.stream.read_exact(&mut byte)?;
            delimiter.push(byte[0]);
            if byte[0] & 0x80 == 0 {
                break;
            }
            if delimiter.len() == MAX_DELIMITER_LEN {
                return Err(invalid_data("frame length delimiter too long"));
            }
        }
        prost::decode_length_delimiter(delimiter.as_slice())
            .map_err(|e| invalid_data(format!("bad frame length: {e}")))
    }
}

impl<S: TimeoutStream> FrameTransport for StreamTransport<S> {
    fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        if frame.len() > MAX_FRAME_LEN {
            return Err(invalid_data("outgoing frame too large"));
        }
        let mut buf = Vec::with_capacity(frame.len() + MAX_DELIMITER_LEN);
        prost::encode_length_delimiter(frame.len(), &mut buf)
            .map_err(|e| invalid_data(e.to_string()))?;
        buf.extend_from_slice(frame);
        self.stream.write_all(&buf)?;
        self.stream.flush()
    }

    fn recv(&mut self) -> io::Result<Vec<u8>> {
        let len = self.read_delimiter()?;
        if len > MAX_FRAME_LEN {
            return Err(invalid_data("incoming frame too large"));
        }
        let mut frame = vec![0u8; len];
        self.stream.read_exact(&mut frame)?;
        Ok(frame)
    }

    fn set_recv_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.stream.set_read_timeout(timeout)
    }
}

fn invalid_data(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

/// Connects to a responder listening on a Unix socket.
pub struct UnixConnector {
    socket_path: PathBuf,
    write_timeout: Option<Duration>,
}

impl UnixConnector {
    pub fn new(socket_path: impl Into<PathBuf>, write_timeout: Option<Duration>) -> Self {
        Self {
            socket_path: socket_path.into(),
            write_timeout,
        }
    }
}

impl Connector for UnixConnector {
    fn connect(&self) -> io::Result<Box<dyn FrameTransport>> {
        let stream = UnixStream::connect(&self.socket_path)?;
        stream.set_write_timeout(self.write_timeout)?;
        debug!("Connected to signer at {:?}", self.socket_path);
        Ok(Box::new(StreamTransport::new(stream)))
    }

    fn peer(&self) -> String {
        format!("unix://{}", self.socket_path.display())
    }
}

/// Connects to a responder over TCP.
pub struct TcpConnector {
    addr: SocketAddr,
    connect_timeout: Duration,
    write_timeout: Option<Duration>,
}

impl TcpConnector {
    pub fn new(addr: SocketAddr, connect_timeout: Duration, write_timeout: Option<Duration>) -> Self {
        Self {
            addr,
            connect_timeout,
            write_timeout,
        }
    }
}

impl Connector for TcpConnector {
    fn connect(&self) -> io::Result<Box<dyn FrameTransport>> {
        let stream = TcpStream::connect_timeout(&self.addr, self.connect_timeout)?;
        stream.set_nodelay(true)?;
        stream.set_write_timeout(self.write_timeout)?;
        debug!("Connected to signer at tcp://{}", self.addr);
        Ok(Box::new(StreamTransport::new(stream)))
    }

    fn peer(&self) -> String {
        format!("tcp://{}", self.addr)
    }
}
